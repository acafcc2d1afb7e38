//! Signing key generation and loading.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use thiserror::Error;

/// Modulus size used by `crxkit keygen`.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Errors raised while handling key files.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Refusing to replace an existing key.
    #[error("Key file already exists: {0}")]
    Exists(PathBuf),

    /// The key file could not be read.
    #[error("Failed to read key {path}: {source}")]
    Read {
        /// Key path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The file is neither PKCS#8 nor PKCS#1 PEM.
    #[error("Unsupported key format in {0}: expected PKCS#8 or PKCS#1 PEM")]
    Format(PathBuf),

    /// Key generation failed.
    #[error("Key generation failed: {0}")]
    Generate(#[from] rsa::Error),

    /// The key could not be serialized.
    #[error("Key encoding failed: {0}")]
    Encode(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Load an RSA private key from a PKCS#8 or PKCS#1 PEM file.
///
/// # Errors
///
/// Returns [`KeyError::Read`] if the file is unreadable, or
/// [`KeyError::Format`] if it holds no supported key.
pub fn load_signing_key(path: &Path) -> Result<RsaPrivateKey, KeyError> {
    let pem = fs::read_to_string(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|_| KeyError::Format(path.to_path_buf()))
}

/// Generate a key of `bits` and write it to `path` as PKCS#8 PEM.
///
/// The file is created exclusively (owner-only on Unix).
///
/// # Errors
///
/// Returns [`KeyError::Exists`] if `path` is taken, or an error if
/// generation, encoding or writing fails.
pub fn generate_key(path: &Path, bits: usize) -> Result<RsaPrivateKey, KeyError> {
    if path.exists() {
        return Err(KeyError::Exists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::Encode(e.to_string()))?;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => KeyError::Exists(path.to_path_buf()),
        _ => KeyError::Io(e),
    })?;
    file.write_all(pem.as_bytes())?;
    file.sync_all()?;

    tracing::debug!(path = %path.display(), bits, "wrote signing key");
    Ok(key)
}
