//! Shared types and wire constants for crxkit.
//!
//! Everything here is plain data: no IO, no network. The core crate builds
//! its readers, writers and fetchers on top of these types.

pub mod header;
pub mod id;
pub mod manifest;

// Re-exports
pub use header::{ContainerHeader, CrxVersion};
pub use id::{ExtensionId, IdError};
pub use manifest::{Manifest, ManifestName};

/// Magic bytes opening every signed container ("Cr24").
pub const CRX_MAGIC: [u8; 4] = *b"Cr24";

/// ZIP local-file header signature (`PK\x03\x04`).
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Name of the manifest entry at the root of every extension archive.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Directory holding per-locale `messages.json` catalogs.
pub const LOCALES_DIR: &str = "_locales";
