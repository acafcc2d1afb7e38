//! Core library for crxkit.
//!
//! - [`identity`] turns a URL, file name or bare token into an [`ExtensionId`].
//! - [`container`] decodes and encodes signed `Cr24` containers.
//! - [`naming`] resolves display names from manifests and locale catalogs.
//! - [`io::download`] fetches containers with sequential endpoint fallback.
//! - [`inspect`] summarizes containers and unpacked sources.
//!
//! Components report progress through an injected [`Reporter`] instead of
//! configuring a global logger.

pub mod config;
pub mod container;
pub mod identity;
pub mod inspect;
pub mod io;
pub mod naming;
pub mod reporter;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, EndpointTemplate, FetchConfig};
pub use container::reader::{DecodeError, Decoded, PayloadSource, decode};
pub use container::writer::{
    KeyEncoding, PackError, PackReport, PackRequest, SignOptions, SignatureDigest, encode,
};
pub use crxkit_schema::{ContainerHeader, CrxVersion, ExtensionId, Manifest};
pub use identity::{ResolveError, resolve};
pub use inspect::{ContainerInfo, inspect};
pub use io::download::{DownloadError, DownloadOptions, DownloadReport, FetchError, Fetcher};
pub use io::keys::{KeyError, generate_key, load_signing_key};
pub use naming::{resolve_name, sanitize_filename};
pub use reporter::{NullReporter, Reporter, TracingReporter};
