//! Case-insensitive header storage with explicit multi-value semantics.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Separator used when a second value is appended to an existing header.
pub const MULTI_VALUE_SEPARATOR: &str = "; ";

/// Ordered, case-insensitive header map.
///
/// Names are stored in canonical capitalization (see [`canonical_name`]), so
/// `content-type`, `CONTENT-TYPE` and `Content-Type` address the same entry.
/// Each name holds exactly one value; [`HeaderMap::append`] folds a new value
/// onto an existing one with `"; "` while [`HeaderMap::set`] replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, canonical: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == canonical)
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let canonical = canonical_name(name);
        self.entries
            .iter()
            .find(|(k, _)| *k == canonical)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Store `value` under `name`, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let canonical = canonical_name(name);
        let value = normalize_value(value.into());
        match self.position(&canonical) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((canonical, value)),
        }
    }

    /// Add `value` under `name`.
    ///
    /// An existing value is kept and the new one is joined onto it with
    /// [`MULTI_VALUE_SEPARATOR`]. Integer values always replace.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let canonical = canonical_name(name);
        let value = value.into();
        let numeric = is_integer(&value);
        let value = normalize_value(value);
        match self.position(&canonical) {
            Some(idx) if numeric => self.entries[idx].1 = value,
            Some(idx) => {
                let existing = &mut self.entries[idx].1;
                existing.push_str(MULTI_VALUE_SEPARATOR);
                existing.push_str(&value);
            }
            None => self.entries.push((canonical, value)),
        }
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let canonical = canonical_name(name);
        let idx = self.position(&canonical)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the `Content-Type` header mentions JSON (case-insensitive).
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.get("Content-Type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderMap
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.append(k.as_ref(), v);
        }
        map
    }
}

impl Serialize for HeaderMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            writeln!(f, "{k}: {v}")?;
        }
        Ok(())
    }
}

/// Canonical header capitalization.
///
/// The first letter of every alphabetic run is upper-cased and the rest of
/// the run lower-cased: `x-test-header` becomes `X-Test-Header`.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn is_integer(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

// "0042" and "42" are the same header value.
fn normalize_value(value: String) -> String {
    if !is_integer(&value) {
        return value;
    }
    let trimmed = value.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
