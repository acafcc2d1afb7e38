//! Keygen command

use std::path::Path;

use anyhow::{Context, Result};
use crxkit_core::container::writer::extension_id;
use crxkit_core::generate_key;

/// Write a fresh key and print the id it will sign for.
pub fn keygen(path: &Path, bits: usize) -> Result<()> {
    let key = generate_key(path, bits)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    eprintln!("Wrote {} ({bits}-bit RSA, PKCS#8)", path.display());
    println!("{}", extension_id(&key)?);
    Ok(())
}
