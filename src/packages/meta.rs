// src/packages/meta.rs

//! `meta.json` decoding
//!
//! Package manifests in the wild disagree on shape: dependencies may be an
//! object keyed by package, a list, or a single value, and the content
//! listing hides under several key names. Each logical field is decoded by
//! trying an ordered list of accepted shapes and normalizing the first that
//! fits into one canonical [`MetaDocument`].

use serde_json::{Map, Value};
use tracing::debug;

/// Name of the manifest document at the archive root
pub const META_FILENAME: &str = "meta.json";

/// Keys that may hold the content listing, in order of preference
const CONTENT_LIST_KEYS: &[&str] = &["contentList", "content_list", "content", "files", "fileList"];

/// Keys searched when the content listing is itself an object
const NESTED_LIST_KEYS: &[&str] = &["items", "list", "contentList", "files"];

/// Keys naming the path inside an object-shaped content entry
const ENTRY_PATH_KEYS: &[&str] = &["path", "name", "file"];

/// Normalized view of a package manifest document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDocument {
    /// Dependency tokens in declaration order
    pub dependencies: Vec<String>,
    /// Inner paths listed by the manifest, forward-slash separated
    pub content_list: Vec<String>,
    pub creator: Option<String>,
    pub package_name: Option<String>,
}

impl MetaDocument {
    /// Decode raw manifest bytes
    ///
    /// Invalid UTF-8 is replaced lossily. Returns `None` when the bytes are
    /// not a JSON object at all.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_start_matches('\u{feff}');

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(Self::from_object(&map)),
            Ok(_) => {
                debug!("meta.json is not an object");
                None
            }
            Err(e) => {
                debug!("meta.json failed to parse: {}", e);
                None
            }
        }
    }

    /// Normalize an already-parsed manifest object
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            dependencies: decode_dependencies(map.get("dependencies")),
            content_list: decode_content_list(map),
            creator: first_text(map, &["creator", "author"]),
            package_name: first_text(map, &["packageName", "name"]),
        }
    }
}

/// Accepted shapes of the `dependencies` field
enum DependencyShape<'a> {
    Keyed(&'a Map<String, Value>),
    Listed(&'a [Value]),
    Single(String),
}

impl<'a> DependencyShape<'a> {
    fn detect(value: &'a Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::Keyed(map)),
            Value::Array(items) => Some(Self::Listed(items)),
            other => scalar_text(other).map(Self::Single),
        }
    }

    fn into_tokens(self) -> Vec<String> {
        match self {
            Self::Keyed(map) => map.keys().cloned().collect(),
            Self::Listed(items) => items.iter().filter_map(scalar_text).collect(),
            Self::Single(token) => vec![token],
        }
    }
}

fn decode_dependencies(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(DependencyShape::detect)
        .map(DependencyShape::into_tokens)
        .unwrap_or_default()
}

/// Strings and numbers count as tokens; booleans and null do not
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_content_list(map: &Map<String, Value>) -> Vec<String> {
    let listing = CONTENT_LIST_KEYS
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()));

    match listing {
        Some(Value::Array(items)) => collect_paths(items),
        Some(Value::Object(nested)) => NESTED_LIST_KEYS
            .iter()
            .filter_map(|key| nested.get(*key).and_then(Value::as_array))
            .map(|items| collect_paths(items))
            .find(|paths| !paths.is_empty())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn collect_paths(items: &[Value]) -> Vec<String> {
    items.iter().filter_map(entry_path).collect()
}

/// Path of one content entry: a string, or an object with a path-like key
fn entry_path(item: &Value) -> Option<String> {
    let raw = match item {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => ENTRY_PATH_KEYS
            .iter()
            .filter_map(|key| obj.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty())?,
        _ => return None,
    };

    let normalized = raw.replace('\\', "/");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .filter_map(scalar_text)
        .find(|s| !s.is_empty())
}
