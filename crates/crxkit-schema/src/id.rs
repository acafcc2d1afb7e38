//! Canonical extension identifiers.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Length of a canonical extension identifier.
pub const ID_LEN: usize = 32;

/// Errors produced when validating an [`ExtensionId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The candidate does not have exactly 32 characters.
    #[error("Invalid extension id length: expected 32 chars, got {0}")]
    Length(usize),

    /// The candidate contains something other than ASCII letters.
    #[error("Invalid extension id '{0}': only letters a-z are allowed")]
    Charset(String),
}

/// Canonical 32-letter identifier of a distributable extension.
///
/// Always stored lowercase. Construction accepts mixed case and normalizes,
/// so `ABC...` and `abc...` name the same extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    /// Create a validated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Length`] if `s` is not 32 characters long, or
    /// [`IdError::Charset`] if it contains anything but ASCII letters.
    pub fn new(s: &str) -> Result<Self, IdError> {
        if s.len() != ID_LEN {
            return Err(IdError::Length(s.chars().count()));
        }
        if !s.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(IdError::Charset(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Derive the identifier a browser assigns to a signing key.
    ///
    /// The first 16 bytes of the SHA-256 of the DER public key are written
    /// out nibble by nibble using the alphabet `a..=p`.
    pub fn from_public_key(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        let id = digest[..ID_LEN / 2]
            .iter()
            .flat_map(|b| [b >> 4, b & 0x0f])
            .map(|nibble| char::from(b'a' + nibble))
            .collect();
        Self(id)
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ExtensionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for ExtensionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExtensionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
