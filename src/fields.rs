//! Field extraction for Open Library's loosely-typed record JSON. Every
//! helper tolerates missing or oddly-shaped input and answers with `None`
//! rather than failing: a record that lacks a field simply has nothing to
//! contribute.

use crate::normalize;
use serde_json::Value;
use std::collections::BTreeMap;

const COVER_URL: &str = "https://covers.openlibrary.org/b/id";
const AUTHOR_PHOTO_URL: &str = "https://covers.openlibrary.org/a/id";

/// Unwraps OL text fields, which are either a bare string or a
/// `{"type": "/type/text", "value": ...}` object.
pub fn text_value(field: &Value) -> Option<&str> {
    match field {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("value").and_then(Value::as_str),
        _ => None,
    }
}

/// Text value run through description cleanup; empty results become `None`.
pub fn description(field: &Value) -> Option<String> {
    let raw = text_value(field)?;
    let cleaned = normalize::clean_description(raw);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Free-text date fields occasionally arrive as bare numbers.
pub fn date_text(field: &Value) -> Option<String> {
    match field {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_positive_id(field: &Value) -> Option<i64> {
    field
        .as_array()?
        .iter()
        .filter_map(Value::as_i64)
        .find(|id| *id > 0)
}

/// First positive cover id turned into the large-cover URL.
pub fn cover_url(field: &Value) -> Option<String> {
    first_positive_id(field).map(|id| format!("{COVER_URL}/{id}-L.jpg"))
}

/// First positive photo id turned into the large-photo URL.
pub fn photo_url(field: &Value) -> Option<String> {
    first_positive_id(field).map(|id| format!("{AUTHOR_PHOTO_URL}/{id}-L.jpg"))
}

/// Non-empty string entries of the `remote_ids` map.
pub fn remote_ids(author: &Value) -> BTreeMap<String, String> {
    let mut ids = BTreeMap::new();
    if let Some(map) = author.get("remote_ids").and_then(Value::as_object) {
        for (key, val) in map {
            if let Some(s) = val.as_str() {
                if !s.is_empty() {
                    ids.insert(key.clone(), s.to_string());
                }
            }
        }
    }
    ids
}

/// Strips a key prefix from a reference that is either a bare string or a
/// `{"key": "/works/OL1W"}` object. Returns `None` when the prefix is absent
/// or the remainder is empty.
pub fn key_suffix<'a>(field: &'a Value, prefix: &str) -> Option<&'a str> {
    let key = match field {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("key")?.as_str()?,
        _ => return None,
    };
    let suffix = key.strip_prefix(prefix)?;
    if suffix.is_empty() {
        None
    } else {
        Some(suffix)
    }
}

/// Resolves a `languages` entry through the MARC table to ISO 639-1.
pub fn language_code(field: &Value) -> Option<&'static str> {
    let code = key_suffix(field, "/languages/")?;
    crate::lang::to_iso(code)
}

/// ISBN-10s followed by ISBN-13s, non-empty strings only.
pub fn isbns(edition: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for list_key in ["isbn_10", "isbn_13"] {
        if let Some(list) = edition.get(list_key).and_then(Value::as_array) {
            for entry in list {
                if let Some(s) = entry.as_str() {
                    if !s.is_empty() {
                        out.push(s.to_string());
                    }
                }
            }
        }
    }
    out
}

/// The `identifiers` map flattened to its first value per scheme.
pub fn identifiers(edition: &Value) -> BTreeMap<String, String> {
    let mut ids = BTreeMap::new();
    if let Some(map) = edition.get("identifiers").and_then(Value::as_object) {
        for (scheme, values) in map {
            if let Some(first) = values.as_array().and_then(|v| v.first()).and_then(Value::as_str)
            {
                ids.insert(scheme.clone(), first.to_string());
            }
        }
    }
    ids
}

/// Positive integers only; OL page counts are sometimes 0 or negative.
pub fn positive_int(field: &Value) -> Option<i64> {
    field.as_i64().filter(|n| *n > 0)
}

/// Whether a string looks like a bare Wikidata entity id ("Q42").
pub fn is_qid(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next() == Some('Q')
        && !value[1..].is_empty()
        && value[1..].chars().all(|c| c.is_ascii_digit())
}
