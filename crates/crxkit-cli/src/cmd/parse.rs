//! Parse command

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use crxkit_core::config::DEFAULT_LOCALE;
use crxkit_core::inspect::ContainerInfo;
use crxkit_core::{FetchConfig, decode, inspect, resolve_name};
use crxkit_schema::header::HeaderFields;
use serde_json::json;

use crate::ui::theme::format_size;

/// Describe the container at `file`, optionally unpacking it.
pub fn parse(
    file: &Path,
    as_json: bool,
    extract: Option<&Path>,
    locale: Option<&str>,
) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let info = inspect(&bytes).with_context(|| format!("Failed to parse {}", file.display()))?;

    let decoded = decode(&bytes);
    let catalogs = decoded.messages().unwrap_or_default();
    let name = resolve_name(&info.manifest, &catalogs, &preferred_locale(locale));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(&info, &name))?);
    } else {
        print_text(&info, &name);
    }

    if let Some(dir) = extract {
        let written = decoded
            .extract_to(dir)
            .with_context(|| format!("Failed to extract into {}", dir.display()))?;
        eprintln!("Extracted {} files to {}", written.len(), dir.display());
    }
    Ok(())
}

/// `--locale`, else `CRXKIT_LOCALE`, else the default.
fn preferred_locale(flag: Option<&str>) -> String {
    if let Some(locale) = flag {
        return locale.to_string();
    }
    match FetchConfig::from_env() {
        Ok(config) => config.locale,
        Err(e) => {
            tracing::warn!("ignoring environment: {e}");
            DEFAULT_LOCALE.to_string()
        }
    }
}

fn header_kind(info: &ContainerInfo) -> &'static str {
    match info.header.map(|h| h.fields) {
        Some(HeaderFields::KeyAndSignature { .. }) => "key-and-signature",
        Some(HeaderFields::HeaderBlock { .. }) => "header-block",
        None => "none",
    }
}

fn to_json(info: &ContainerInfo, name: &str) -> serde_json::Value {
    let files: Vec<_> = info
        .files
        .iter()
        .map(|f| json!({"name": f.name, "size": f.size}))
        .collect();
    json!({
        "format_version": info.header.map(|h| h.version.as_u32()),
        "header": header_kind(info),
        "payload_offset": info.payload_offset,
        "payload_source": info.payload_source.to_string(),
        "name": name,
        "manifest": info.manifest,
        "files": files,
        "size": info.uncompressed_size,
        "declared_permissions": info.declared_permissions,
        "used_apis": info.used_apis,
    })
}

fn print_text(info: &ContainerInfo, name: &str) {
    let lw = 14;
    let format = info
        .header
        .map_or_else(
            || "none (bare archive)".to_string(),
            |h| format!("{} ({})", h.version, header_kind(info)),
        );

    println!();
    println!("  {} {}", name.white().bold(), info.manifest.version.as_str().dark_grey());
    if let Some(description) = &info.manifest.description {
        println!("  {description}");
    }
    println!();
    println!("  {:<lw$}{format}", "format");
    println!("  {:<lw$}{} ({})", "payload", info.payload_offset, info.payload_source);
    if let Some(mv) = info.manifest.manifest_version {
        println!("  {:<lw$}{mv}", "manifest");
    }
    println!(
        "  {:<lw$}{} ({})",
        "files",
        info.files.len(),
        format_size(info.uncompressed_size)
    );
    if !info.declared_permissions.is_empty() {
        println!("  {:<lw$}{}", "permissions", info.declared_permissions.join(", "));
    }
    if !info.used_apis.is_empty() {
        let apis: Vec<&str> = info.used_apis.iter().map(String::as_str).collect();
        println!("  {:<lw$}{}", "apis", apis.join(", "));
    }

    println!();
    for file in &info.files {
        println!("  {} {}", format!("{:>10}", format_size(file.size)).dark_grey(), file.name);
    }
    println!();
}
