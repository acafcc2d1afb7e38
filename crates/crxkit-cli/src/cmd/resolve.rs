//! Resolve command

use anyhow::{Result, bail};
use crxkit_core::resolve;

/// Print one id per reference; fails if any reference has none.
pub fn resolve_all(references: &[String]) -> Result<()> {
    let mut failures = 0;
    for reference in references {
        match resolve(reference) {
            Ok(id) => println!("{id}"),
            Err(e) => {
                eprintln!("{e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} references could not be resolved", references.len());
    }
    Ok(())
}
