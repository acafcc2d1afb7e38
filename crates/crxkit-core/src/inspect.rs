//! Container and source-tree inspection.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crxkit_schema::{ContainerHeader, MANIFEST_FILE, Manifest};

use crate::container::reader::{DecodeError, PayloadSource, decode};

static API_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"chrome\.[a-zA-Z]+\.[a-zA-Z]+").expect("static pattern compiles")
});

/// One archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Archive path.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

/// Everything `crxkit parse` reports about a container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Recognised header, if any.
    pub header: Option<ContainerHeader>,
    /// Offset of the archive inside the container.
    pub payload_offset: usize,
    /// How the archive was located.
    pub payload_source: PayloadSource,
    /// Parsed manifest.
    pub manifest: Manifest,
    /// File entries in archive order (directories omitted).
    pub files: Vec<FileEntry>,
    /// Sum of uncompressed entry sizes.
    pub uncompressed_size: u64,
    /// `permissions` followed by `optional_permissions`.
    pub declared_permissions: Vec<String>,
    /// Distinct `chrome.<namespace>.<member>` references in scripts.
    pub used_apis: BTreeSet<String>,
}

/// Collect `chrome.<namespace>.<member>` references from script text.
pub fn api_calls(source: &str) -> impl Iterator<Item = &str> {
    API_CALL.find_iter(source).map(|m| m.as_str())
}

/// Decode and summarize a container.
///
/// # Errors
///
/// Returns an error if the payload is not an archive or has no valid manifest.
pub fn inspect(bytes: &[u8]) -> Result<ContainerInfo, DecodeError> {
    let decoded = decode(bytes);
    let manifest = decoded.manifest()?;
    let mut archive = decoded.archive()?;

    let mut files = Vec::new();
    let mut used_apis = BTreeSet::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        if name.ends_with(".js") {
            let mut raw = Vec::new();
            file.read_to_end(&mut raw)?;
            used_apis.extend(api_calls(&String::from_utf8_lossy(&raw)).map(str::to_string));
        }
        files.push(FileEntry {
            name,
            size: file.size(),
        });
    }

    Ok(ContainerInfo {
        header: decoded.header,
        payload_offset: decoded.offset,
        payload_source: decoded.source,
        declared_permissions: manifest.permission_names(),
        manifest,
        uncompressed_size: files.iter().map(|f| f.size).sum(),
        files,
        used_apis,
    })
}

/// Permission and API usage of an unpacked extension.
#[derive(Debug, Clone, Default)]
pub struct ApiReport {
    /// `permissions` followed by `optional_permissions`; empty if the manifest is unreadable.
    pub declared_permissions: Vec<String>,
    /// Distinct API references across all `.js` files.
    pub used_apis: BTreeSet<String>,
}

/// Scan an unpacked extension directory.
///
/// Unreadable files and a missing or malformed manifest are logged and skipped.
///
/// # Errors
///
/// Returns an error if `dir` cannot be walked.
pub fn analyze_dir(dir: &Path) -> Result<ApiReport, walkdir::Error> {
    let declared_permissions = match fs::read(dir.join(MANIFEST_FILE)) {
        Ok(raw) => match Manifest::from_slice(&raw) {
            Ok(manifest) => manifest.permission_names(),
            Err(e) => {
                tracing::warn!("malformed {MANIFEST_FILE}: {e}");
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "cannot read {MANIFEST_FILE}: {e}");
            Vec::new()
        }
    };

    let mut used_apis = BTreeSet::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.path().extension().is_none_or(|e| e != "js") {
            continue;
        }
        match fs::read(entry.path()) {
            Ok(raw) => {
                used_apis.extend(api_calls(&String::from_utf8_lossy(&raw)).map(str::to_string));
            }
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), "skipping unreadable script: {e}");
            }
        }
    }

    Ok(ApiReport {
        declared_permissions,
        used_apis,
    })
}
