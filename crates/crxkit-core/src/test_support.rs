//! Fixtures shared by unit tests.

use std::io::{Cursor, Write};
use std::sync::LazyLock;

use rsa::RsaPrivateKey;
use zip::write::SimpleFileOptions;

pub(crate) const ID: &str = "hniebljpgcogalllopnjokppmgbhaden";

/// One 2048-bit key for the whole test run; generation is slow in debug builds.
pub(crate) static KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap());

/// Build a ZIP archive; `stored` skips compression so sizes are predictable.
pub(crate) fn zip_archive(entries: &[(&str, &[u8])], stored: bool) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let method = if stored {
        zip::CompressionMethod::Stored
    } else {
        zip::CompressionMethod::Deflated
    };
    let options = SimpleFileOptions::default().compression_method(method);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A minimal extension archive with the given manifest.
pub(crate) fn extension_archive(manifest: &str) -> Vec<u8> {
    zip_archive(
        &[
            ("manifest.json", manifest.as_bytes()),
            ("background.js", b"console.log('hi');"),
        ],
        false,
    )
}

/// Prefix `archive` with a key-and-signature header.
pub(crate) fn with_key_signature_header(
    version: u32,
    pk: &[u8],
    sig: &[u8],
    archive: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"Cr24");
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&u32::try_from(pk.len()).unwrap().to_le_bytes());
    out.extend_from_slice(&u32::try_from(sig.len()).unwrap().to_le_bytes());
    out.extend_from_slice(pk);
    out.extend_from_slice(sig);
    out.extend_from_slice(archive);
    out
}

/// Prefix `archive` with a header-block header.
pub(crate) fn with_header_block(block: &[u8], archive: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"Cr24");
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&u32::try_from(block.len()).unwrap().to_le_bytes());
    out.extend_from_slice(block);
    out.extend_from_slice(archive);
    out
}
