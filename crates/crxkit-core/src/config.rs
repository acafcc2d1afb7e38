//! Fetch configuration: endpoint templates, proxy, timeout, locale.
//!
//! Values come from [`FetchConfig::default`], optionally overlaid with
//! `CRXKIT_*` environment variables by [`FetchConfig::from_env`]. The CLI
//! applies its own flags on top.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use thiserror::Error;

use crxkit_schema::ExtensionId;

/// Substitution slot for the identifier inside an endpoint template.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Built-in update endpoints, most current API shape first.
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "https://clients2.google.com/service/update2/crx?response=redirect&acceptformat=crx2,crx3&prodversion=89.0.4389.90&x=id%3D{id}%26installsource%3Dondemand%26uc",
    "https://clients2.google.com/service/update2/crx?response=redirect&prodversion=49.0&x=id%3D{id}%26installsource%3Dondemand%26uc",
    "https://clients2.google.com/service/update2/crx?response=redirect&x=id%3D{id}%26uc",
];

/// Endpoints answer with a browser check page unless the request looks like a browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Responses at or below this size are never a real container.
pub const MIN_CONTAINER_SIZE: usize = 1000;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default UI locale consulted first when resolving localized names.
pub const DEFAULT_LOCALE: &str = "zh_CN";

/// Errors raised while building configuration or the HTTP client.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An endpoint template lacks exactly one `{id}` slot.
    #[error("Invalid endpoint template '{0}': expected exactly one {{id}} slot")]
    InvalidTemplate(String),

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// The proxy URL was rejected.
    #[error("Invalid proxy '{url}': {source}")]
    Proxy {
        /// Proxy URL as given.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A retrieval URL with one `{id}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate(String);

impl EndpointTemplate {
    /// Validate and wrap a template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTemplate`] unless `template` contains
    /// exactly one `{id}` placeholder.
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if template.matches(ID_PLACEHOLDER).count() != 1 {
            return Err(ConfigError::InvalidTemplate(template));
        }
        Ok(Self(template))
    }

    /// Substitute the identifier.
    pub fn render(&self, id: &ExtensionId) -> String {
        self.0.replacen(ID_PLACEHOLDER, id.as_str(), 1)
    }

    /// Return the raw template.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings for [`crate::Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Ordered endpoint templates; tried front to back.
    pub endpoints: Vec<EndpointTemplate>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Optional proxy applied to every scheme.
    pub proxy: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Minimum accepted body size in bytes (exclusive).
    pub min_size: usize,
    /// Preferred UI locale for name resolution.
    pub locale: String,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS
                .iter()
                .map(|t| EndpointTemplate((*t).to_string()))
                .collect(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            insecure: false,
            min_size: MIN_CONTAINER_SIZE,
            locale: DEFAULT_LOCALE.to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Defaults overlaid with `CRXKIT_PROXY`, `CRXKIT_TIMEOUT` (seconds),
    /// `CRXKIT_INSECURE`, `CRXKIT_LOCALE` and `CRXKIT_MIRRORS`
    /// (comma-separated templates appended after the built-in endpoints).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`FetchConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(proxy) = var("CRXKIT_PROXY") {
            config.proxy = Some(proxy);
        }

        if let Some(timeout) = var("CRXKIT_TIMEOUT") {
            let secs = timeout
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "CRXKIT_TIMEOUT",
                    value: timeout.clone(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        config.insecure =
            var("CRXKIT_INSECURE").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        if let Some(locale) = var("CRXKIT_LOCALE") {
            config.locale = locale;
        }

        if let Some(mirrors) = var("CRXKIT_MIRRORS") {
            config = config
                .with_mirrors(mirrors.split(',').map(str::trim).filter(|m| !m.is_empty()))?;
        }

        Ok(config)
    }

    /// Append mirror templates after the existing endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTemplate`] for a template without a single `{id}` slot.
    pub fn with_mirrors<I, S>(mut self, mirrors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for mirror in mirrors {
            self.endpoints.push(EndpointTemplate::new(mirror)?);
        }
        Ok(self)
    }

    /// Build the HTTP client used for every endpoint attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the TLS backend
    /// cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/x-chrome-extension,application/octet-stream,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(headers)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.insecure);

        if let Some(url) = &self.proxy {
            let proxy = reqwest::Proxy::all(url).map_err(|source| ConfigError::Proxy {
                url: url.clone(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn id() -> ExtensionId {
        ExtensionId::new("hniebljpgcogalllopnjokppmgbhaden").unwrap()
    }

    #[test]
    fn template_requires_single_slot() {
        assert!(EndpointTemplate::new("https://example.com/{id}.crx").is_ok());
        assert!(EndpointTemplate::new("https://example.com/static.crx").is_err());
        assert!(EndpointTemplate::new("https://example.com/{id}/{id}").is_err());
    }

    #[test]
    fn template_renders_id() {
        let t = EndpointTemplate::new("https://mirror.test/crx/{id}?v=1").unwrap();
        assert_eq!(
            t.render(&id()),
            "https://mirror.test/crx/hniebljpgcogalllopnjokppmgbhaden?v=1"
        );
    }

    #[test]
    fn default_endpoints_are_valid_templates() {
        let config = FetchConfig::default();
        assert_eq!(config.endpoints.len(), DEFAULT_ENDPOINTS.len());
        for endpoint in &config.endpoints {
            assert!(EndpointTemplate::new(endpoint.as_str()).is_ok());
            assert!(endpoint.render(&id()).contains("id%3Dhniebljpgcogalllopnjokppmgbhaden"));
        }
    }

    #[test]
    fn mirrors_are_appended_last() {
        let config = FetchConfig::default()
            .with_mirrors(["https://mirror.test/{id}"])
            .unwrap();
        assert_eq!(config.endpoints.last().unwrap().as_str(), "https://mirror.test/{id}");
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn environment_overlays_defaults() {
        let config = FetchConfig::from_lookup(lookup(&[
            ("CRXKIT_PROXY", " http://proxy.test:8080 "),
            ("CRXKIT_TIMEOUT", "5"),
            ("CRXKIT_INSECURE", "TRUE"),
            ("CRXKIT_LOCALE", "en"),
            ("CRXKIT_MIRRORS", "https://a.test/{id}, ,https://b.test/{id}.crx"),
        ]))
        .unwrap();

        assert_eq!(config.proxy.as_deref(), Some("http://proxy.test:8080"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.insecure);
        assert_eq!(config.locale, "en");
        let tail: Vec<_> = config.endpoints[DEFAULT_ENDPOINTS.len()..]
            .iter()
            .map(EndpointTemplate::as_str)
            .collect();
        assert_eq!(tail, vec!["https://a.test/{id}", "https://b.test/{id}.crx"]);
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let config = FetchConfig::from_lookup(lookup(&[("CRXKIT_PROXY", "  ")])).unwrap();
        assert!(config.proxy.is_none());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.locale, DEFAULT_LOCALE);
        assert_eq!(config.endpoints.len(), DEFAULT_ENDPOINTS.len());
    }

    #[test]
    fn invalid_environment_values_are_rejected() {
        let err = FetchConfig::from_lookup(lookup(&[("CRXKIT_TIMEOUT", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "CRXKIT_TIMEOUT", .. }));

        let err = FetchConfig::from_lookup(lookup(&[("CRXKIT_MIRRORS", "https://no-slot.test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate(_)));
    }

    #[test]
    fn client_rejects_bad_proxy() {
        let config = FetchConfig {
            proxy: Some("http://[::1".into()),
            ..FetchConfig::default()
        };
        assert!(matches!(config.build_client(), Err(ConfigError::Proxy { .. })));
    }

    #[test]
    fn client_builds_with_defaults() {
        assert!(FetchConfig::default().build_client().is_ok());
    }
}
