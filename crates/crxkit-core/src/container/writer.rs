//! Container encoding and signing.
//!
//! Output layout (always the key-and-signature shape, version 3):
//! magic, version, public key length, signature length, public key,
//! signature, archive. The signature covers the archive bytes only.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crxkit_schema::{ContainerHeader, CrxVersion, ExtensionId, MANIFEST_FILE};

use crate::Reporter;
use crate::io::keys::{KeyError, load_signing_key};
use crate::io::minify::Minifier;
use crate::io::store::{self, CollisionPolicy, StoreError};
use crate::naming::sanitize_filename;

/// Directory names never packed.
const EXCLUDED_DIRS: [&str; 4] = [".git", ".svn", ".hg", "__pycache__"];

/// File extensions never packed.
const EXCLUDED_EXTENSIONS: [&str; 2] = ["pyc", "pyo"];

/// Stem used when the source directory has no usable name.
const FALLBACK_NAME: &str = "extension";

/// Errors raised while packing.
#[derive(Error, Debug)]
pub enum PackError {
    /// The source directory does not exist.
    #[error("Source directory not found: {0}")]
    MissingSource(PathBuf),

    /// The source directory has no `manifest.json`.
    #[error("No manifest.json in {0}")]
    MissingManifest(PathBuf),

    /// The signing key could not be loaded.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Walking the source tree failed.
    #[error("Failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Building the archive failed.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// RSA signing failed.
    #[error("Signing failed: {0}")]
    Signing(#[from] rsa::Error),

    /// The public key could not be serialized, or a length overflowed the header.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The container could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Digest used for the archive signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureDigest {
    /// PKCS#1 v1.5 over SHA-256.
    #[default]
    Sha256,
    /// PKCS#1 v1.5 over SHA-1, as older packers produced.
    Sha1Legacy,
}

/// DER encoding of the embedded public key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyEncoding {
    /// X.509 `SubjectPublicKeyInfo`, which browsers derive ids from.
    #[default]
    SubjectPublicKeyInfo,
    /// Bare `RSAPublicKey`.
    Pkcs1,
}

/// Knobs for [`encode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Signature digest.
    pub digest: SignatureDigest,
    /// Public key encoding.
    pub key_encoding: KeyEncoding,
    /// Run `.js` files through the external minifier.
    pub minify: bool,
}

impl SignOptions {
    /// SHA-1 signature with a PKCS#1 public key.
    pub fn legacy() -> Self {
        Self {
            digest: SignatureDigest::Sha1Legacy,
            key_encoding: KeyEncoding::Pkcs1,
            minify: false,
        }
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return EXCLUDED_DIRS.contains(&name.as_ref());
    }
    Path::new(name.as_ref())
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXCLUDED_EXTENSIONS.contains(&ext))
}

/// Archive-relative name with `/` separators.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Zip the files under `source_dir` in file-name order with fixed timestamps.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn build_archive(
    source_dir: &Path,
    minifier: Option<&Minifier>,
) -> Result<Vec<u8>, PackError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let walker = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry_name(source_dir, entry.path()) else {
            continue;
        };

        let mut data = fs::read(entry.path())?;
        if let Some(minifier) = minifier.filter(|_| name.ends_with(".js")) {
            data = minifier.minify(entry.path(), &data);
        }

        zip.start_file(name.as_str(), options)?;
        zip.write_all(&data)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn public_key_der(key: &RsaPrivateKey, encoding: KeyEncoding) -> Result<Vec<u8>, PackError> {
    let public = key.to_public_key();
    match encoding {
        KeyEncoding::SubjectPublicKeyInfo => public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| PackError::Encoding(e.to_string())),
        KeyEncoding::Pkcs1 => public
            .to_pkcs1_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| PackError::Encoding(e.to_string())),
    }
}

/// Identifier browsers will assign to containers signed with `key`.
///
/// # Errors
///
/// Returns [`PackError::Encoding`] if the public key cannot be serialized.
pub fn extension_id(key: &RsaPrivateKey) -> Result<ExtensionId, PackError> {
    let der = public_key_der(key, KeyEncoding::SubjectPublicKeyInfo)?;
    Ok(ExtensionId::from_public_key(&der))
}

fn sign(key: &RsaPrivateKey, data: &[u8], digest: SignatureDigest) -> Result<Vec<u8>, PackError> {
    let signature = match digest {
        SignatureDigest::Sha256 => key.sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(data))?,
        SignatureDigest::Sha1Legacy => key.sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(data))?,
    };
    Ok(signature)
}

fn length_field(len: usize, what: &str) -> Result<u32, PackError> {
    u32::try_from(len).map_err(|_| PackError::Encoding(format!("{what} too long: {len} bytes")))
}

/// Build a signed container from `source_dir`.
///
/// # Errors
///
/// Returns an error if the archive cannot be built, signing fails, or the
/// public key cannot be encoded.
pub fn encode(
    source_dir: &Path,
    key: &RsaPrivateKey,
    options: &SignOptions,
) -> Result<Vec<u8>, PackError> {
    let minifier = if options.minify { Minifier::locate() } else { None };
    let archive = build_archive(source_dir, minifier.as_ref())?;
    let public_key = public_key_der(key, options.key_encoding)?;
    let signature = sign(key, &archive, options.digest)?;

    let header = ContainerHeader::signed(
        CrxVersion::V3,
        length_field(public_key.len(), "public key")?,
        length_field(signature.len(), "signature")?,
    );

    let mut out = header.to_bytes();
    out.reserve(public_key.len() + signature.len() + archive.len());
    out.extend_from_slice(&public_key);
    out.extend_from_slice(&signature);
    out.extend_from_slice(&archive);

    tracing::debug!(
        archive = archive.len(),
        public_key = public_key.len(),
        signature = signature.len(),
        "encoded container"
    );
    Ok(out)
}

/// Outcome of [`PackRequest::execute`].
#[derive(Debug, Clone)]
pub struct PackReport {
    /// Path of the written container.
    pub path: PathBuf,
    /// Identifier browsers will assign to the signing key.
    pub id: ExtensionId,
    /// Container size in bytes.
    pub size: u64,
}

/// Request to pack a directory into a container file.
#[derive(Debug)]
pub struct PackRequest<'a, R: Reporter> {
    source_dir: &'a Path,
    key_path: &'a Path,
    output_dir: &'a Path,
    name: Option<&'a str>,
    options: SignOptions,
    reporter: &'a R,
}

impl<'a, R: Reporter> PackRequest<'a, R> {
    /// Pack `source_dir` with the key at `key_path` into `output_dir`.
    pub fn new(
        source_dir: &'a Path,
        key_path: &'a Path,
        output_dir: &'a Path,
        reporter: &'a R,
    ) -> Self {
        Self {
            source_dir,
            key_path,
            output_dir,
            name: None,
            options: SignOptions::default(),
            reporter,
        }
    }

    /// Output file stem; defaults to the source directory's name.
    #[must_use]
    pub fn with_name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Signing options.
    #[must_use]
    pub fn with_options(mut self, options: SignOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate inputs, sign, and write `{name}.crx` (replacing any existing file).
    ///
    /// # Errors
    ///
    /// Returns [`PackError::MissingSource`] or [`PackError::MissingManifest`]
    /// for bad input, or any encoding or storage error.
    pub fn execute(self) -> Result<PackReport, PackError> {
        if !self.source_dir.is_dir() {
            return Err(PackError::MissingSource(self.source_dir.to_path_buf()));
        }
        if !self.source_dir.join(MANIFEST_FILE).is_file() {
            return Err(PackError::MissingManifest(self.source_dir.to_path_buf()));
        }

        let stem = match self.name {
            Some(name) => sanitize_filename(name),
            None => fs::canonicalize(self.source_dir)?
                .file_name()
                .and_then(|n| sanitize_filename(&n.to_string_lossy())),
        }
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

        self.reporter.section("Packing");
        self.reporter.info(&format!("Packing {}", self.source_dir.display()));

        let (bytes, id) = {
            let key = load_signing_key(self.key_path)?;
            let bytes = encode(self.source_dir, &key, &self.options)?;
            (bytes, extension_id(&key)?)
        };

        let path =
            store::persist(&bytes, self.output_dir, &stem, "crx", CollisionPolicy::Overwrite)?;
        let size = bytes.len() as u64;
        self.reporter.done(&id, &format!("Wrote {}", path.display()), Some(size));

        Ok(PackReport { path, id, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::container::reader::decode;
    use crate::test_support::KEY;
    use crxkit_schema::Manifest;
    use crxkit_schema::header::HeaderFields;
    use rsa::RsaPublicKey;
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, LineEnding};
    use tempfile::{TempDir, tempdir};

    const MANIFEST: &str = r#"{"name": "Test Ext", "version": "1.0", "manifest_version": 3}"#;

    fn source_tree() -> TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("manifest.json"), MANIFEST).unwrap();
        fs::write(dir.path().join("background.js"), "chrome.tabs.query({}, () => {});").unwrap();
        dir
    }

    /// Split an encoded container into (public key, signature, archive).
    fn split(bytes: &[u8]) -> (&[u8], &[u8], &[u8]) {
        let header = ContainerHeader::parse(bytes).unwrap();
        let HeaderFields::KeyAndSignature {
            public_key_len,
            signature_len,
        } = header.fields
        else {
            panic!("expected key-and-signature header");
        };
        let pk_end = 16 + public_key_len as usize;
        let sig_end = pk_end + signature_len as usize;
        (&bytes[16..pk_end], &bytes[pk_end..sig_end], &bytes[sig_end..])
    }

    #[test]
    fn encodes_v3_container_with_expected_entries() {
        let src = source_tree();
        let bytes = encode(src.path(), &KEY, &SignOptions::default()).unwrap();

        assert_eq!(&bytes[..4], b"Cr24");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 3);

        let decoded = decode(&bytes);
        assert_eq!(decoded.offset, ContainerHeader::parse(&bytes).unwrap().payload_offset());
        let mut entries = decoded.entries().unwrap();
        entries.sort();
        assert_eq!(entries, vec!["background.js", "manifest.json"]);
    }

    #[test]
    fn decode_recovers_original_manifest() {
        let src = source_tree();
        let bytes = encode(src.path(), &KEY, &SignOptions::default()).unwrap();

        let expected = Manifest::from_slice(MANIFEST.as_bytes()).unwrap();
        assert_eq!(decode(&bytes).manifest().unwrap(), expected);
    }

    #[test]
    fn signature_verifies_with_embedded_key() {
        let src = source_tree();
        let bytes = encode(src.path(), &KEY, &SignOptions::default()).unwrap();
        let (pk, sig, archive) = split(&bytes);

        let public = RsaPublicKey::from_public_key_der(pk).unwrap();
        public
            .verify(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(archive), sig)
            .unwrap();
    }

    #[test]
    fn legacy_options_use_sha1_and_pkcs1() {
        let src = source_tree();
        let bytes = encode(src.path(), &KEY, &SignOptions::legacy()).unwrap();
        let (pk, sig, archive) = split(&bytes);

        let public = RsaPublicKey::from_pkcs1_der(pk).unwrap();
        public
            .verify(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(archive), sig)
            .unwrap();
        assert!(
            public
                .verify(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(archive), sig)
                .is_err()
        );
    }

    #[test]
    fn excludes_vcs_and_bytecode() {
        let src = source_tree();
        fs::create_dir_all(src.path().join(".git/objects")).unwrap();
        fs::write(src.path().join(".git/HEAD"), "ref").unwrap();
        fs::create_dir_all(src.path().join("__pycache__")).unwrap();
        fs::write(src.path().join("__pycache__/x.pyc"), "x").unwrap();
        fs::write(src.path().join("tool.pyo"), "x").unwrap();
        fs::create_dir_all(src.path().join("js/lib")).unwrap();
        fs::write(src.path().join("js/lib/util.js"), "1").unwrap();

        let archive = build_archive(src.path(), None).unwrap();
        let mut entries = decode(&archive).entries().unwrap();
        entries.sort();
        assert_eq!(entries, vec!["background.js", "js/lib/util.js", "manifest.json"]);
    }

    #[test]
    fn archive_is_deterministic() {
        let src = source_tree();
        assert_eq!(
            build_archive(src.path(), None).unwrap(),
            build_archive(src.path(), None).unwrap()
        );
    }

    #[test]
    fn pack_writes_named_container() {
        let src = source_tree();
        let out = tempdir().unwrap();
        let key_path = out.path().join("key.pem");
        fs::write(&key_path, KEY.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();

        let report = PackRequest::new(src.path(), &key_path, out.path(), &NullReporter)
            .with_name("My Ext")
            .execute()
            .unwrap();

        assert_eq!(report.path, out.path().join("My Ext.crx"));
        assert_eq!(fs::metadata(&report.path).unwrap().len(), report.size);

        let spki = KEY.to_public_key().to_public_key_der().unwrap();
        assert_eq!(report.id, ExtensionId::from_public_key(spki.as_bytes()));
    }

    #[test]
    fn pack_rejects_bad_input() {
        let out = tempdir().unwrap();
        let key_path = out.path().join("key.pem");

        let missing = out.path().join("nope");
        let err = PackRequest::new(&missing, &key_path, out.path(), &NullReporter)
            .execute()
            .unwrap_err();
        assert!(matches!(err, PackError::MissingSource(_)));

        let empty = tempdir().unwrap();
        let err = PackRequest::new(empty.path(), &key_path, out.path(), &NullReporter)
            .execute()
            .unwrap_err();
        assert!(matches!(err, PackError::MissingManifest(_)));

        let src = source_tree();
        let err = PackRequest::new(src.path(), &key_path, out.path(), &NullReporter)
            .execute()
            .unwrap_err();
        assert!(matches!(err, PackError::Key(KeyError::Read { .. })));
    }
}
