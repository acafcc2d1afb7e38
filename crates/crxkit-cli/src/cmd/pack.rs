//! Pack command

use std::path::Path;

use anyhow::{Context, Result};
use crxkit_core::io::keys::DEFAULT_KEY_BITS;
use crxkit_core::{PackRequest, SignOptions, generate_key};

use crate::ui::Progress;

/// Options collected from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackFlags {
    pub generate_key: bool,
    pub minify: bool,
    pub legacy: bool,
}

/// Sign `source` with `key` and write the container into `output`.
pub fn pack(
    source: &Path,
    key: &Path,
    output: &Path,
    name: Option<&str>,
    flags: PackFlags,
    ui: &Progress,
) -> Result<()> {
    if flags.generate_key && !key.exists() {
        generate_key(key, DEFAULT_KEY_BITS)
            .with_context(|| format!("Failed to create key {}", key.display()))?;
        eprintln!("Generated signing key {}", key.display());
    }

    let mut options = if flags.legacy { SignOptions::legacy() } else { SignOptions::default() };
    options.minify = flags.minify;

    let mut request = PackRequest::new(source, key, output, ui).with_options(options);
    if let Some(name) = name {
        request = request.with_name(name);
    }
    let report = request
        .execute()
        .with_context(|| format!("Failed to pack {}", source.display()))?;

    println!("{}", report.path.display());
    println!("{}", report.id);
    Ok(())
}
