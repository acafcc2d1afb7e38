//! Extension id resolution from free-form references.
//!
//! Accepts bare ids, store detail URLs (legacy and current), update-service
//! download URLs with the id buried in an encoded query parameter, and file
//! names ending in the id. Matchers run in a fixed order and the first hit
//! wins; the catch-all token scan runs last so it cannot shadow a more
//! specific match.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;
use url::form_urlencoded;

use crxkit_schema::ExtensionId;

/// Nesting depth followed when an id hides inside an encoded parameter value.
const MAX_QUERY_DEPTH: usize = 3;

/// Errors returned by [`resolve`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No matcher produced a valid identifier.
    #[error("No extension id found in '{0}'")]
    NotFound(String),
}

type Matcher = fn(&str) -> Option<String>;

/// Matchers in priority order.
const CHAIN: &[(&str, Matcher)] = &[
    ("exact", exact),
    ("store-name-id", store_name_then_id),
    ("store-id", store_id_only),
    ("detail-path", detail_path),
    ("query", query_param),
    ("filename", filename_suffix),
    ("scan", token_scan),
];

static EXACT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)^[a-z]{32}$"));

static STORE_NAME_ID: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)(?:chromewebstore\.google\.com|chrome\.google\.com/webstore)/detail/[^/?#]+/([a-z]{32})(?:[/?#]|$)",
    )
});

static STORE_ID: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)(?:chromewebstore\.google\.com|chrome\.google\.com/webstore)/detail/([a-z]{32})(?:[/?#]|$)",
    )
});

static DETAIL_PATH: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)/detail/(?:[^/?#]+/)?([a-z]{32})(?:[/?#]|$)"));

static FILENAME: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)(?:^|[^a-z])([a-z]{32})(?:\.(?:crx|zip))?$"));

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)(?:^|[^a-z])([a-z]{32})(?:[^a-z]|$)"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

/// Resolve a reference to its canonical identifier.
///
/// Surrounding whitespace and quote characters are ignored; matching is
/// case-insensitive and the result is lowercase.
///
/// # Errors
///
/// Returns [`ResolveError::NotFound`] if no matcher yields a valid id.
pub fn resolve(reference: &str) -> Result<ExtensionId, ResolveError> {
    let cleaned =
        reference.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`'));

    for (name, matcher) in CHAIN {
        if let Some(candidate) = matcher(cleaned) {
            if let Ok(id) = ExtensionId::new(&candidate) {
                tracing::debug!(matcher = name, %id, "resolved extension id");
                return Ok(id);
            }
        }
    }

    Err(ResolveError::NotFound(reference.to_string()))
}

fn first_group(re: &Regex, input: &str) -> Option<String> {
    re.captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn exact(input: &str) -> Option<String> {
    EXACT.is_match(input).then(|| input.to_string())
}

fn store_name_then_id(input: &str) -> Option<String> {
    first_group(&STORE_NAME_ID, input)
}

fn store_id_only(input: &str) -> Option<String> {
    first_group(&STORE_ID, input)
}

fn detail_path(input: &str) -> Option<String> {
    first_group(&DETAIL_PATH, input)
}

fn filename_suffix(input: &str) -> Option<String> {
    first_group(&FILENAME, input)
}

fn token_scan(input: &str) -> Option<String> {
    first_group(&TOKEN, input)
}

fn query_param(input: &str) -> Option<String> {
    let query = match Url::parse(input) {
        Ok(url) => url.query()?.to_string(),
        Err(_) => input.split_once('?')?.1.to_string(),
    };
    find_id_param(&query, MAX_QUERY_DEPTH)
}

/// Look for `id=<token>` in a query string, descending into keys and values
/// that are themselves (possibly percent-encoded) query strings.
fn find_id_param(query: &str, depth: usize) -> Option<String> {
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key.eq_ignore_ascii_case("id") && ExtensionId::new(&value).is_ok() {
            return Some(value.into_owned());
        }
        if depth == 0 {
            continue;
        }
        for nested in [&key, &value] {
            if looks_like_query(nested) {
                if let Some(id) = find_id_param(nested, depth - 1) {
                    return Some(id);
                }
            }
        }
    }
    None
}

fn looks_like_query(s: &str) -> bool {
    s.contains('=') || s.to_ascii_lowercase().contains("%3d")
}
