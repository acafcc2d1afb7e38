//! Apis command

use std::path::Path;

use anyhow::{Result, bail};
use crxkit_core::inspect::analyze_dir;

/// Print declared permissions and referenced `chrome.*` APIs.
pub fn apis(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("Directory not found: {} (download with --extract first)", dir.display());
    }
    let report = analyze_dir(dir)?;

    if !report.declared_permissions.is_empty() {
        println!("Declared permissions:");
        let mut permissions = report.declared_permissions.clone();
        permissions.sort();
        permissions.dedup();
        for permission in permissions {
            println!("- {permission}");
        }
    }

    if !report.used_apis.is_empty() {
        if !report.declared_permissions.is_empty() {
            println!();
        }
        println!("Chrome APIs used in scripts:");
        for api in &report.used_apis {
            println!("- {api}");
        }
    }
    Ok(())
}
