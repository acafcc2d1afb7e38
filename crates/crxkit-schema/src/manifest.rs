//! Extension `manifest.json` model.
//!
//! Only the keys the toolkit reads are typed; everything else is kept in
//! [`Manifest::extra`] so a parsed manifest compares equal to its source.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Prefix of a localized message reference (`__MSG_key__`).
pub const MESSAGE_PREFIX: &str = "__MSG_";
/// Suffix of a localized message reference.
pub const MESSAGE_SUFFIX: &str = "__";

/// The `name` field: literal text, a message reference, or (non-standard)
/// a mapping of locale to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestName {
    /// Literal name, possibly a `__MSG_key__` reference.
    Text(String),
    /// Locale-keyed names, seen in some hand-built packages.
    Map(Map<String, Value>),
}

impl Default for ManifestName {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ManifestName {
    /// The message key if this name is a `__MSG_key__` reference.
    pub fn message_key(&self) -> Option<&str> {
        match self {
            Self::Text(s) => s
                .strip_prefix(MESSAGE_PREFIX)?
                .strip_suffix(MESSAGE_SUFFIX)
                .filter(|k| !k.is_empty()),
            Self::Map(_) => None,
        }
    }

    /// Raw textual form, used when nothing better can be resolved.
    pub fn raw(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Map(m) => Value::Object(m.clone()).to_string(),
        }
    }
}

/// Parsed `manifest.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Display name of the extension.
    #[serde(default)]
    pub name: ManifestName,

    /// Version string (e.g. "1.0.3").
    #[serde(default)]
    pub version: String,

    /// Manifest schema version (2 or 3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_version: Option<u32>,

    /// Short description, possibly a message reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Locale used when a message is missing from the UI locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_locale: Option<String>,

    /// Icon size to relative path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons: Option<BTreeMap<String, String>>,

    /// Required permissions (strings, or objects in older manifests).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Value>,

    /// Permissions requested at runtime.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_permissions: Vec<Value>,

    /// All remaining keys, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Parse a manifest from raw JSON bytes, tolerating a UTF-8 BOM.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error if the document is not a valid manifest.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        serde_json::from_slice(bytes)
    }

    /// Names of declared and optional permissions, in declaration order.
    ///
    /// Object-valued entries contribute their keys.
    pub fn permission_names(&self) -> Vec<String> {
        self.permissions
            .iter()
            .chain(&self.optional_permissions)
            .flat_map(|v| match v {
                Value::String(s) => vec![s.clone()],
                Value::Object(m) => m.keys().cloned().collect(),
                _ => Vec::new(),
            })
            .collect()
    }
}
