//! Container retrieval with sequential endpoint fallback.
//!
//! Each endpoint template is tried in order. A response is accepted only if
//! it has a success status, is not an HTML page, starts with container or
//! ZIP magic, and is larger than the configured minimum. Every rejection is
//! reported and the next template is tried.

use std::io;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tempfile::TempDir;
use thiserror::Error;

use crxkit_schema::{CRX_MAGIC, ExtensionId, ZIP_MAGIC};

use crate::Reporter;
use crate::config::{ConfigError, EndpointTemplate, FetchConfig};
use crate::container::reader::{DecodeError, decode};
use crate::io::store::{self, CollisionPolicy, StoreError};
use crate::naming::{display_name, stored_stem};

/// Why a single endpoint was rejected.
#[derive(Error, Debug)]
pub enum EndpointFailure {
    /// Connection, TLS, timeout or body read error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {0}")]
    Status(StatusCode),

    /// The endpoint answered with a web page.
    #[error("HTML response ({0})")]
    Html(String),

    /// The body is too small to be a container.
    #[error("response too small ({0} bytes)")]
    TooSmall(usize),

    /// The body starts with neither container nor ZIP magic.
    #[error("unrecognised content (no container or ZIP magic)")]
    BadMagic,
}

/// Errors returned by [`Fetcher::fetch`].
#[derive(Error, Debug)]
pub enum FetchError {
    /// Every endpoint was tried and rejected.
    #[error("All {attempts} endpoints failed; last error: {last}")]
    AllEndpointsFailed {
        /// Number of endpoints tried.
        attempts: usize,
        /// Rejection reason of the final endpoint.
        #[source]
        last: EndpointFailure,
    },

    /// The endpoint list is empty.
    #[error("No endpoints configured")]
    NoEndpoints,
}

/// Errors returned by [`Fetcher::download`].
#[derive(Error, Debug)]
pub enum DownloadError {
    /// No endpoint produced a container.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The container could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The container was stored but could not be unpacked.
    #[error("Extraction failed: {0}")]
    Extract(#[from] DecodeError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A successfully fetched container.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Response body.
    pub bytes: Vec<u8>,
    /// Rendered URL that served it.
    pub endpoint: String,
}

/// Storage options for [`Fetcher::download`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Overwrite an existing file instead of adding a numeric suffix.
    pub force: bool,
    /// Also unpack the archive next to the stored file.
    pub extract: bool,
}

/// Outcome of [`Fetcher::download`].
#[derive(Debug, Clone)]
pub struct DownloadReport {
    /// Requested identifier.
    pub id: ExtensionId,
    /// Stored container.
    pub path: PathBuf,
    /// Directory the archive was unpacked into, if requested.
    pub extracted: Option<PathBuf>,
    /// Resolved display name, if the manifest was readable.
    pub name: Option<String>,
    /// Manifest version, if present.
    pub version: Option<String>,
    /// Endpoint that served the container.
    pub endpoint: String,
    /// Container size in bytes.
    pub size: u64,
}

fn has_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&CRX_MAGIC) || bytes.starts_with(&ZIP_MAGIC)
}

/// Fetches containers from an ordered list of endpoints.
#[derive(Debug)]
pub struct Fetcher<R: Reporter> {
    client: Client,
    endpoints: Vec<EndpointTemplate>,
    min_size: usize,
    locale: String,
    reporter: R,
}

impl<R: Reporter> Fetcher<R> {
    /// Use an existing client with the endpoints and limits from `config`.
    pub fn new(client: Client, config: &FetchConfig, reporter: R) -> Self {
        Self {
            client,
            endpoints: config.endpoints.clone(),
            min_size: config.min_size,
            locale: config.locale.clone(),
            reporter,
        }
    }

    /// Build the client from `config` as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. bad proxy).
    pub fn from_config(config: &FetchConfig, reporter: R) -> Result<Self, ConfigError> {
        Ok(Self::new(config.build_client()?, config, reporter))
    }

    /// Try each endpoint in order and return the first acceptable body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::AllEndpointsFailed`] once every endpoint has
    /// been rejected, or [`FetchError::NoEndpoints`] if there are none.
    pub async fn fetch(&self, id: &ExtensionId) -> Result<Fetched, FetchError> {
        let total = self.endpoints.len();
        let mut last = None;

        for (i, template) in self.endpoints.iter().enumerate() {
            let url = template.render(id);
            self.reporter.attempt(id, &url, i + 1, total);

            match self.try_endpoint(id, &url).await {
                Ok(bytes) => {
                    tracing::debug!(%id, endpoint = %url, size = bytes.len(), "endpoint accepted");
                    return Ok(Fetched { bytes, endpoint: url });
                }
                Err(failure) => {
                    self.reporter.rejected(id, &url, &failure.to_string());
                    last = Some(failure);
                }
            }
        }

        match last {
            Some(last) => Err(FetchError::AllEndpointsFailed {
                attempts: total,
                last,
            }),
            None => Err(FetchError::NoEndpoints),
        }
    }

    async fn try_endpoint(&self, id: &ExtensionId, url: &str) -> Result<Vec<u8>, EndpointFailure> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointFailure::Status(status));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if content_type.to_ascii_lowercase().contains("text/html") {
                return Err(EndpointFailure::Html(content_type.to_string()));
            }
        }

        let total_size = response.content_length();
        let mut stream = response.bytes_stream();
        let mut body = Vec::new();
        let mut magic_checked = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            if !magic_checked && body.len() >= CRX_MAGIC.len() {
                if !has_magic(&body) {
                    return Err(EndpointFailure::BadMagic);
                }
                magic_checked = true;
            }
            self.reporter.downloading(id, body.len() as u64, total_size);
        }

        if body.len() <= self.min_size {
            return Err(EndpointFailure::TooSmall(body.len()));
        }
        if !has_magic(&body) {
            return Err(EndpointFailure::BadMagic);
        }
        Ok(body)
    }

    /// Fetch `id`, name it from its manifest and store it in `output_dir`.
    ///
    /// The file is called `{name}-{version}.crx`, or `{id}.crx` when the
    /// manifest gives no usable name.
    ///
    /// # Errors
    ///
    /// Returns an error if every endpoint fails, or if the container cannot
    /// be written or (with `extract`) unpacked.
    pub async fn download(
        &self,
        id: &ExtensionId,
        output_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadReport, DownloadError> {
        self.reporter.section("Fetching");
        let Fetched { bytes, endpoint } = match self.fetch(id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.reporter.failed(id, &e.to_string());
                return Err(e.into());
            }
        };

        let (name, version) = self.describe(id, &bytes);
        let stem = stored_stem(name.as_deref(), version.as_deref().unwrap_or_default(), id);
        let policy = CollisionPolicy::from_force(options.force);
        let extract = options.extract;
        let dir = output_dir.to_path_buf();
        let size = bytes.len() as u64;

        let (path, extracted) = tokio::task::spawn_blocking(move || {
            store_container(&bytes, &dir, &stem, policy, extract)
        })
        .await??;

        self.reporter.done(id, &format!("Saved {}", path.display()), Some(size));

        Ok(DownloadReport {
            id: id.clone(),
            path,
            extracted,
            name,
            version,
            endpoint,
            size,
        })
    }

    /// Display name and version from the container's manifest, if readable.
    fn describe(&self, id: &ExtensionId, bytes: &[u8]) -> (Option<String>, Option<String>) {
        let decoded = decode(bytes);
        let manifest = match decoded.manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                self.reporter
                    .warning(&format!("Could not read manifest of {id} ({e}); naming it by id"));
                return (None, None);
            }
        };
        let catalogs = decoded.messages().unwrap_or_default();
        let name = display_name(&manifest, &catalogs, &self.locale);
        if name.is_none() {
            self.reporter
                .warning(&format!("Could not resolve the name of {id}; naming it by id"));
        }
        let version = Some(manifest.version).filter(|v| !v.is_empty());
        (name, version)
    }
}

fn store_container(
    bytes: &[u8],
    dir: &Path,
    stem: &str,
    policy: CollisionPolicy,
    extract: bool,
) -> Result<(PathBuf, Option<PathBuf>), DownloadError> {
    let path = store::persist(bytes, dir, stem, "crx", policy)?;
    if !extract {
        return Ok((path, None));
    }

    let staging = TempDir::new_in(dir)?;
    decode(bytes).extract_to(staging.path())?;
    let dir_name = path
        .file_stem()
        .map_or_else(|| stem.to_string(), |s| s.to_string_lossy().into_owned());
    let extracted = store::place_dir(staging, dir, &dir_name, policy)?;
    Ok((path, Some(extracted)))
}
