use serde::Serialize;
use serde_json::Value;

/// Body carried by a [`Request`](super::Request) or [`Response`](super::Response).
///
/// Requests hold `Empty` when nothing was sent, `Text` for decoded payloads
/// and `Json` once a JSON body has been parsed. Responses may hold any
/// variant; the wire bytes are derived by the response itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Body {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Body::Bytes(_))
    }

    /// Nothing to send: no body, or an empty string, byte buffer, object or
    /// array.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(s) => s.is_empty(),
            Body::Bytes(b) => b.is_empty(),
            Body::Json(Value::Null) => true,
            Body::Json(Value::String(s)) => s.is_empty(),
            Body::Json(Value::Object(map)) => map.is_empty(),
            Body::Json(Value::Array(items)) => items.is_empty(),
            Body::Json(_) => false,
        }
    }

    /// Objects and arrays, i.e. the values that serialize as JSON documents.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Body::Json(Value::Object(_) | Value::Array(_)))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            Body::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Plain byte rendering, without JSON document formatting.
    ///
    /// Strings render as-is, other JSON values as compact JSON text.
    #[must_use]
    pub fn to_plain_bytes(&self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Text(s) => s.as_bytes().to_vec(),
            Body::Bytes(b) => b.clone(),
            Body::Json(Value::String(s)) => s.as_bytes().to_vec(),
            Body::Json(Value::Null) => Vec::new(),
            Body::Json(other) => other.to_string().into_bytes(),
        }
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

impl From<&[u8]> for Body {
    fn from(b: &[u8]) -> Self {
        Body::Bytes(b.to_vec())
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Body::Json(v)
    }
}

impl<T: Into<Body>> From<Option<T>> for Body {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Body::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_bodies() {
        for body in [
            Body::Empty,
            Body::from(""),
            Body::from(Vec::<u8>::new()),
            Body::from(json!({})),
            Body::from(json!([])),
            Body::from(json!(null)),
        ] {
            assert!(body.is_blank(), "{body:?}");
        }
        for body in [Body::from(" "), Body::from(json!(0)), Body::from(json!(false)), Body::from(json!([0]))] {
            assert!(!body.is_blank(), "{body:?}");
        }
    }

    #[test]
    fn test_structured_detection() {
        assert!(Body::from(json!({"a": 1})).is_structured());
        assert!(Body::from(json!([1, 2])).is_structured());
        assert!(!Body::from(json!(5)).is_structured());
        assert!(!Body::from("x").is_structured());
    }

    #[test]
    fn test_plain_bytes() {
        assert_eq!(Body::Empty.to_plain_bytes(), b"");
        assert_eq!(Body::from(json!(12345)).to_plain_bytes(), b"12345");
        assert_eq!(Body::from(json!(true)).to_plain_bytes(), b"true");
        assert_eq!(Body::from(json!("hey")).to_plain_bytes(), b"hey");
        assert_eq!(Body::from(json!({"x": 1})).to_plain_bytes(), br#"{"x":1}"#);
        assert_eq!(Body::from(vec![0u8, 0xff]).to_plain_bytes(), vec![0u8, 0xff]);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Body::from(None::<String>), Body::Empty);
        assert_eq!(Body::from(Some("a")), Body::Text("a".into()));
    }
}
