use serde::Serialize;
use std::collections::BTreeMap;

/// Query values as received: every key maps to its ordered list of values.
pub type RawQuery = BTreeMap<String, Vec<String>>;

/// Query parameters after normalization.
pub type Query = BTreeMap<String, QueryValue>;

/// A normalized query parameter.
///
/// Keys that appeared once hold a `Single` value; everything else (including
/// an explicitly empty list) stays a `Multi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    /// First value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::Single(v) => Some(v),
            QueryValue::Multi(vs) => vs.first().map(String::as_str),
        }
    }

    /// All values as a slice-like vector of borrowed strings.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(v) => vec![v.as_str()],
            QueryValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Single(v.to_string())
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(vs: Vec<&str>) -> Self {
        QueryValue::Multi(vs.into_iter().map(str::to_string).collect())
    }
}

/// Collapse singleton lists to scalars.
#[must_use]
pub fn normalize_query(raw: RawQuery) -> Query {
    raw.into_iter()
        .map(|(k, mut vs)| {
            let value = if vs.len() == 1 {
                QueryValue::Single(vs.remove(0))
            } else {
                QueryValue::Multi(vs)
            };
            (k, value)
        })
        .collect()
}

/// Parse a raw query string (`a=1&a=2&b=%F0%9F%94%A5`).
///
/// Names and values are percent-decoded with form-urlencoded rules. Pairs
/// whose value is blank are dropped.
#[must_use]
pub fn parse_query_string(qs: &str) -> RawQuery {
    let mut out = RawQuery::new();
    for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
        if v.is_empty() {
            continue;
        }
        out.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    out
}

/// Split a request target into path and query string.
///
/// The path is returned verbatim; any fragment is discarded.
#[must_use]
pub fn split_target(target: &str) -> (&str, &str) {
    let target = target.split('#').next().unwrap_or("");
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}
