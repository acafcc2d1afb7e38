//! Download command

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use crxkit_core::{DownloadOptions, FetchConfig, Fetcher, resolve};

use crate::NetArgs;
use crate::ui::Progress;

/// Fetch configuration from the environment with command-line flags applied.
pub fn fetch_config(net: &NetArgs) -> Result<FetchConfig> {
    let base = FetchConfig::from_env().context("Invalid CRXKIT_* environment")?;
    apply_flags(net, base)
}

fn apply_flags(net: &NetArgs, mut config: FetchConfig) -> Result<FetchConfig> {
    if let Some(proxy) = net.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        config.proxy = Some(proxy.to_string());
    }
    if let Some(secs) = net.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    config.insecure |= net.insecure;
    if let Some(locale) = &net.locale {
        config.locale.clone_from(locale);
    }
    config
        .with_mirrors(net.mirrors.iter().map(|m| m.trim()).filter(|m| !m.is_empty()))
        .context("Invalid mirror template")
}

/// Resolve `reference`, fetch the container and store it under `output`.
pub async fn download(
    reference: &str,
    output: &Path,
    options: DownloadOptions,
    net: &NetArgs,
    ui: Progress,
) -> Result<()> {
    let id = resolve(reference)?;
    let config = fetch_config(net)?;
    let fetcher = Fetcher::from_config(&config, ui)?;

    let report = fetcher
        .download(&id, output, &options)
        .await
        .with_context(|| format!("Failed to download {id}"))?;

    tracing::debug!(endpoint = %report.endpoint, "download complete");
    println!("{}", report.path.display());
    if let Some(dir) = &report.extracted {
        println!("{}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(mirrors: &[&str]) -> NetArgs {
        NetArgs {
            proxy: Some("  ".into()),
            timeout: Some(5),
            insecure: false,
            locale: Some("en".into()),
            mirrors: mirrors.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_mirrors_follow_builtin_endpoints() {
        let config =
            apply_flags(&net(&["https://mirror.test/{id}.crx", " "]), FetchConfig::default())
                .unwrap();
        assert_eq!(config.endpoints.len(), crxkit_core::config::DEFAULT_ENDPOINTS.len() + 1);
        assert_eq!(config.endpoints.last().unwrap().as_str(), "https://mirror.test/{id}.crx");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.locale, "en");
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_flags_override_environment() {
        let base = FetchConfig {
            proxy: Some("http://env-proxy.test".into()),
            locale: "fr".into(),
            ..FetchConfig::default()
        };
        let flags = NetArgs {
            proxy: Some("http://flag-proxy.test".into()),
            ..NetArgs::default()
        };
        let config = apply_flags(&flags, base).unwrap();
        assert_eq!(config.proxy.as_deref(), Some("http://flag-proxy.test"));
        assert_eq!(config.locale, "fr");
        assert_eq!(config.timeout, crxkit_core::config::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_bad_mirror_is_rejected() {
        let flags = net(&["https://mirror.test/static.crx"]);
        assert!(apply_flags(&flags, FetchConfig::default()).is_err());
    }
}
