//! Tolerant container decoding.
//!
//! Endpoints and mirrors serve proper v3 containers, legacy v2 containers,
//! bare ZIP archives, and archives with junk prepended. [`decode`] never
//! fails: it locates the archive as best it can and leaves the verdict to
//! the ZIP reader, so errors only surface once the payload is used.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use crxkit_schema::{ContainerHeader, LOCALES_DIR, MANIFEST_FILE, Manifest, ZIP_MAGIC};

use super::find_zip_signature;

/// Errors raised when the decoded payload is read as an archive.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not a readable ZIP archive.
    #[error("Payload is not a ZIP archive: {0}")]
    NotAnArchive(ZipError),

    /// An entry could not be read.
    #[error("Archive error: {0}")]
    Zip(#[from] ZipError),

    /// The archive has no `manifest.json` at its root.
    #[error("Archive has no manifest.json")]
    MissingManifest,

    /// `manifest.json` is not valid JSON of the expected shape.
    #[error("Invalid manifest.json: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    /// An entry path would escape the extraction directory.
    #[error("Refusing to extract unsafe path: {0}")]
    UnsafePath(String),

    /// Filesystem error while extracting.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Which strategy located the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    /// A ZIP signature found by scanning.
    Scanned,
    /// The offset declared by a recognised header.
    HeaderOffset,
    /// Nothing matched; the input is passed through unchanged.
    Raw,
}

impl std::fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scanned => "signature scan",
            Self::HeaderOffset => "header offset",
            Self::Raw => "raw input",
        };
        f.write_str(s)
    }
}

/// Result of [`decode`]: the located payload plus whatever header was recognised.
#[derive(Debug, Clone, Copy)]
pub struct Decoded<'a> {
    /// Header parsed from the start of the input, if recognised.
    pub header: Option<ContainerHeader>,
    /// Archive bytes.
    pub payload: &'a [u8],
    /// Offset of `payload` within the input.
    pub offset: usize,
    /// How `offset` was found.
    pub source: PayloadSource,
}

/// Locate the archive inside `bytes`.
///
/// A recognised header is trusted only when its declared offset lands on a
/// ZIP signature. Otherwise the first signature anywhere in the input wins,
/// which also recovers containers whose length fields were corrupted.
pub fn decode(bytes: &[u8]) -> Decoded<'_> {
    let header = ContainerHeader::parse(bytes);
    let declared = header
        .map(|h| h.payload_offset())
        .filter(|&offset| bytes[offset..].starts_with(&ZIP_MAGIC));

    let (offset, source) = match declared {
        Some(declared) => (declared, PayloadSource::HeaderOffset),
        None => find_zip_signature(bytes, 0)
            .map_or((0, PayloadSource::Raw), |found| (found, PayloadSource::Scanned)),
    };

    tracing::debug!(
        offset,
        %source,
        header = ?header.map(|h| h.version),
        "located container payload"
    );

    Decoded {
        header,
        payload: &bytes[offset..],
        offset,
        source,
    }
}

impl<'a> Decoded<'a> {
    /// Open the payload as a ZIP archive.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotAnArchive`] if the payload is not a ZIP.
    pub fn archive(&self) -> Result<ZipArchive<Cursor<&'a [u8]>>, DecodeError> {
        ZipArchive::new(Cursor::new(self.payload)).map_err(DecodeError::NotAnArchive)
    }

    /// Names of all entries, in archive order.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a ZIP archive.
    pub fn entries(&self) -> Result<Vec<String>, DecodeError> {
        let archive = self.archive()?;
        Ok(archive.file_names().map(str::to_string).collect())
    }

    /// Parse the root `manifest.json`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingManifest`] if there is none, or
    /// [`DecodeError::InvalidManifest`] if it does not parse.
    pub fn manifest(&self) -> Result<Manifest, DecodeError> {
        let mut archive = self.archive()?;
        let mut file = match archive.by_name(MANIFEST_FILE) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(DecodeError::MissingManifest),
            Err(e) => return Err(e.into()),
        };
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        Ok(Manifest::from_slice(&raw)?)
    }

    /// Locale catalogs (`_locales/<locale>/messages.json`), keyed by locale.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a ZIP archive or an entry is unreadable.
    pub fn messages(&self) -> Result<HashMap<String, Vec<u8>>, DecodeError> {
        let mut archive = self.archive()?;
        let mut catalogs = HashMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let Some(locale) = catalog_locale(file.name()) else {
                continue;
            };
            let locale = locale.to_string();
            let mut raw = Vec::new();
            file.read_to_end(&mut raw)?;
            catalogs.insert(locale, raw);
        }

        Ok(catalogs)
    }

    /// Unpack every entry below `dest_dir`, returning the relative paths written.
    ///
    /// # Errors
    ///
    /// Fails on the first entry whose path is absolute or climbs out of
    /// `dest_dir`, or on any read/write error.
    pub fn extract_to(&self, dest_dir: &Path) -> Result<Vec<PathBuf>, DecodeError> {
        let mut archive = self.archive()?;
        fs::create_dir_all(dest_dir)?;
        let mut written = Vec::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let Some(relative_path) = file.enclosed_name() else {
                return Err(DecodeError::UnsafePath(file.name().to_string()));
            };

            if file.is_dir() {
                fs::create_dir_all(dest_dir.join(&relative_path))?;
                continue;
            }

            let absolute_path = dest_dir.join(&relative_path);
            if let Some(p) = absolute_path.parent() {
                fs::create_dir_all(p)?;
            }

            let mut outfile = fs::File::create(&absolute_path)?;
            io::copy(&mut file, &mut outfile)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }

            written.push(relative_path);
        }

        Ok(written)
    }
}

/// Locale segment of a `_locales/<locale>/messages.json` entry name.
fn catalog_locale(name: &str) -> Option<&str> {
    let mut parts = name.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(LOCALES_DIR), Some(locale), Some("messages.json"), None) if !locale.is_empty() => {
            Some(locale)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        extension_archive, with_header_block, with_key_signature_header, zip_archive,
    };
    use crxkit_schema::CrxVersion;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"{"name": "Test Ext", "version": "1.0", "manifest_version": 3}"#;

    #[test]
    fn bare_archive_is_scanned_at_zero() {
        let archive = extension_archive(MANIFEST);
        let decoded = decode(&archive);
        assert_eq!(decoded.offset, 0);
        assert_eq!(decoded.source, PayloadSource::Scanned);
        assert!(decoded.header.is_none());
        assert_eq!(decoded.manifest().unwrap().name.raw(), "Test Ext");
    }

    #[test]
    fn v2_container() {
        let archive = extension_archive(MANIFEST);
        let bytes = with_key_signature_header(2, &[7u8; 162], &[9u8; 128], &archive);
        let decoded = decode(&bytes);
        assert_eq!(decoded.header.unwrap().version, CrxVersion::V2);
        assert_eq!(decoded.offset, 16 + 162 + 128);
        assert_eq!(decoded.source, PayloadSource::HeaderOffset);
        assert_eq!(decoded.payload, &archive[..]);
        assert_eq!(decoded.manifest().unwrap().version, "1.0");
    }

    #[test]
    fn v3_header_block_container() {
        let archive = extension_archive(MANIFEST);
        let bytes = with_header_block(&[1u8; 600], &archive);
        let decoded = decode(&bytes);
        assert_eq!(decoded.header.unwrap().version, CrxVersion::V3);
        assert_eq!(decoded.offset, 12 + 600);
        assert_eq!(decoded.entries().unwrap(), vec!["manifest.json", "background.js"]);
    }

    #[test]
    fn signature_inside_signing_material_is_skipped() {
        let archive = extension_archive(MANIFEST);
        let mut pk = vec![3u8; 64];
        pk[10..14].copy_from_slice(&ZIP_MAGIC);
        let bytes = with_key_signature_header(3, &pk, &[5u8; 32], &archive);

        let decoded = decode(&bytes);
        assert_eq!(decoded.offset, 16 + 64 + 32);
        assert_eq!(decoded.source, PayloadSource::HeaderOffset);
        assert!(decoded.manifest().is_ok());
    }

    #[test]
    fn corrupted_length_field_falls_back_to_scan() {
        let archive = zip_archive(
            &[
                ("manifest.json", MANIFEST.as_bytes()),
                ("background.js", b"chrome.runtime.id;"),
                ("popup.html", b"<html></html>"),
            ],
            false,
        );
        let mut bytes = with_key_signature_header(2, &[7u8; 162], &[9u8; 128], &archive);
        bytes[8..12].copy_from_slice(&202u32.to_le_bytes());

        let decoded = decode(&bytes);
        assert_eq!(decoded.header.unwrap().payload_offset(), 16 + 202 + 128);
        assert_eq!(decoded.offset, 16 + 162 + 128);
        assert_eq!(decoded.source, PayloadSource::Scanned);
        assert_eq!(decoded.entries().unwrap().len(), 3);
        assert_eq!(decoded.manifest().unwrap().name.raw(), "Test Ext");
    }

    #[test]
    fn garbage_prefix_is_tolerated() {
        let archive = extension_archive(MANIFEST);
        let prefixes: [&[u8]; 4] = [b"", b"x", b"<html>mirror banner</html>", &[0u8; 4096]];
        for garbage in prefixes {
            let mut bytes = garbage.to_vec();
            bytes.extend_from_slice(&archive);

            let decoded = decode(&bytes);
            assert_eq!(decoded.payload, &archive[..]);
            assert_eq!(decoded.manifest().unwrap().name.raw(), "Test Ext");
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn archive_survives_any_garbage_prefix(
                garbage in proptest::collection::vec(any::<u8>(), 0..4096)
            ) {
                prop_assume!(!garbage.windows(ZIP_MAGIC.len()).any(|w| w == ZIP_MAGIC));
                prop_assume!(!garbage.starts_with(&crxkit_schema::CRX_MAGIC));

                let archive = extension_archive(MANIFEST);
                let mut bytes = garbage.clone();
                bytes.extend_from_slice(&archive);

                let decoded = decode(&bytes);
                prop_assert_eq!(decoded.offset, garbage.len());
                prop_assert_eq!(decoded.payload, &archive[..]);
                prop_assert!(decoded.manifest().is_ok());
            }

            #[test]
            fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
                let decoded = decode(&bytes);
                prop_assert!(decoded.offset <= bytes.len());
            }
        }
    }

    #[test]
    fn overrunning_header_falls_back_to_scan() {
        let archive = extension_archive(MANIFEST);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"Cr24");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&9_000u32.to_le_bytes());
        bytes.extend_from_slice(&9_000u32.to_le_bytes());
        bytes.extend_from_slice(&archive);

        let decoded = decode(&bytes);
        assert!(decoded.header.is_none());
        assert_eq!(decoded.offset, 16);
        assert!(decoded.manifest().is_ok());
    }

    #[test]
    fn unrecognised_input_is_passed_through() {
        let bytes = b"definitely not a container";
        let decoded = decode(bytes);
        assert_eq!(decoded.source, PayloadSource::Raw);
        assert_eq!(decoded.payload, &bytes[..]);
        assert!(matches!(decoded.manifest(), Err(DecodeError::NotAnArchive(_))));
    }

    #[test]
    fn decode_never_panics_on_truncated_headers() {
        for len in 0..20 {
            let mut bytes = b"Cr24\x03\x00\x00\x00\xff\xff\xff\xff\x10\x00\x00\x00".to_vec();
            bytes.truncate(len);
            let decoded = decode(&bytes);
            assert_eq!(decoded.source, PayloadSource::Raw);
        }
    }

    #[test]
    fn missing_and_invalid_manifest() {
        let no_manifest = zip_archive(&[("background.js", b"1")], false);
        assert!(matches!(decode(&no_manifest).manifest(), Err(DecodeError::MissingManifest)));

        let broken = zip_archive(&[("manifest.json", b"{not json")], false);
        assert!(matches!(decode(&broken).manifest(), Err(DecodeError::InvalidManifest(_))));
    }

    #[test]
    fn collects_locale_catalogs() {
        let archive = zip_archive(
            &[
                ("manifest.json", MANIFEST.as_bytes()),
                ("_locales/en/messages.json", br#"{"a": {"message": "A"}}"#),
                ("_locales/zh_CN/messages.json", br#"{"a": {"message": "B"}}"#),
                ("_locales/en/other.json", b"{}"),
                ("nested/_locales/fr/messages.json", b"{}"),
            ],
            false,
        );
        let catalogs = decode(&archive).messages().unwrap();
        let mut locales: Vec<_> = catalogs.keys().cloned().collect();
        locales.sort();
        assert_eq!(locales, vec!["en", "zh_CN"]);
    }

    #[test]
    fn extracts_entries_preserving_paths() {
        let archive = zip_archive(
            &[
                ("manifest.json", MANIFEST.as_bytes()),
                ("js/app.js", b"run();"),
            ],
            false,
        );
        let dir = tempdir().unwrap();
        let written = decode(&archive).extract_to(dir.path()).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read(dir.path().join("js/app.js")).unwrap(), b"run();");
    }

    #[test]
    fn refuses_path_traversal() {
        let archive = zip_archive(&[("../escape.txt", b"x")], false);
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");

        let err = decode(&archive).extract_to(&dest).unwrap_err();
        assert!(matches!(err, DecodeError::UnsafePath(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
