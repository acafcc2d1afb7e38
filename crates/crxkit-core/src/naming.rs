//! Display-name resolution and filename sanitizing.
//!
//! Naming never fails: every problem (unreadable catalog, missing key,
//! odd `name` shape) degrades to the raw manifest value, and the caller
//! falls back to the extension id when even that is unusable.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use crxkit_schema::{ExtensionId, Manifest, ManifestName};

/// Locales tried after the preferred UI locale and before `default_locale`.
const ENGLISH_LOCALES: [&str; 3] = ["en", "en_US", "en_GB"];

/// Keys preferred when `name` is a mapping.
const MAPPING_PREFERENCE: [&str; 3] = ["default", "en", "zh_CN"];

/// Characters that cannot appear in a file name on at least one platform.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Source of per-locale `messages.json` documents.
pub trait MessageSource {
    /// Raw `messages.json` bytes for `locale`, if present.
    fn messages(&self, locale: &str) -> Option<Vec<u8>>;
}

/// An unpacked `_locales` directory.
#[derive(Debug, Clone, Copy)]
pub struct LocalesDir<'a>(pub &'a Path);

impl MessageSource for LocalesDir<'_> {
    fn messages(&self, locale: &str) -> Option<Vec<u8>> {
        std::fs::read(self.0.join(locale).join("messages.json")).ok()
    }
}

/// Catalogs read out of an archive, keyed by locale.
impl MessageSource for HashMap<String, Vec<u8>> {
    fn messages(&self, locale: &str) -> Option<Vec<u8>> {
        self.get(locale).cloned()
    }
}

/// Ordered, de-duplicated locale search list.
pub fn locale_order(preferred: &str, default_locale: Option<&str>) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let candidates = std::iter::once(preferred)
        .chain(ENGLISH_LOCALES)
        .chain(default_locale);
    for locale in candidates {
        if !locale.is_empty() && !order.iter().any(|l| l == locale) {
            order.push(locale.to_string());
        }
    }
    order
}

/// Resolve the display name of `manifest`.
///
/// Literal names are returned unchanged, `__MSG_key__` references are looked
/// up in `source` following [`locale_order`], and mapping-valued names pick
/// `default`, `en`, `zh_CN` or else the first string value.
pub fn resolve_name(
    manifest: &Manifest,
    source: &dyn MessageSource,
    preferred_locale: &str,
) -> String {
    match &manifest.name {
        ManifestName::Map(map) => name_from_mapping(map).unwrap_or_else(|| manifest.name.raw()),
        ManifestName::Text(text) => {
            let Some(key) = manifest.name.message_key() else {
                return text.clone();
            };
            let locales = locale_order(preferred_locale, manifest.default_locale.as_deref());
            locales
                .iter()
                .find_map(|locale| lookup_message(source, locale, key))
                .unwrap_or_else(|| {
                    tracing::debug!(key, "message not found in any locale, keeping reference");
                    text.clone()
                })
        }
    }
}

/// Like [`resolve_name`], but `None` when a `__MSG_key__` reference or a
/// mapping could not be resolved to real text.
pub fn display_name(
    manifest: &Manifest,
    source: &dyn MessageSource,
    preferred_locale: &str,
) -> Option<String> {
    let resolved = resolve_name(manifest, source, preferred_locale);
    let unresolved = match &manifest.name {
        ManifestName::Map(_) => resolved == manifest.name.raw(),
        ManifestName::Text(text) => manifest.name.message_key().is_some() && resolved == *text,
    };
    (!unresolved).then_some(resolved)
}

fn name_from_mapping(map: &Map<String, Value>) -> Option<String> {
    MAPPING_PREFERENCE
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .or_else(|| map.values().find_map(Value::as_str))
        .map(str::to_string)
}

fn lookup_message(source: &dyn MessageSource, locale: &str, key: &str) -> Option<String> {
    let raw = source.messages(locale)?;
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&raw);
    let catalog: Map<String, Value> = match serde_json::from_slice(raw) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::debug!(locale, "unreadable messages.json: {e}");
            return None;
        }
    };
    catalog
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, entry)| entry.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

/// Make `name` safe as a file name.
///
/// Illegal and control characters become `-`; leading and trailing `-`,
/// `.` and whitespace are trimmed. Returns `None` if nothing is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let replaced: String = name
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_control() {
                '-'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace());
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// File stem for a stored container: `{name}-{version}`, or the id when the
/// name is unusable.
pub fn stored_stem(name: Option<&str>, version: &str, id: &ExtensionId) -> String {
    let Some(name) = name.and_then(sanitize_filename) else {
        return id.to_string();
    };
    match sanitize_filename(version) {
        Some(version) => format!("{name}-{version}"),
        None => name,
    }
}
