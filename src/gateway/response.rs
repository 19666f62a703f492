use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

/// A JSON-compatible object with keys in selection order.
pub type JsonMap = serde_json::Map<String, JsonValue>;

/// One step into the response tree: an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A resolution failure attached to the node it nulled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphError {
    pub message: String,
    pub path: Vec<PathSegment>,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at ", self.message)?;
        for (i, segment) in self.path.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// The assembled result of one resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub data: JsonValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
}

impl Response {
    /// Follows `path` (dot-separated keys, numeric segments index lists).
    pub fn pointer(&self, path: &str) -> Option<&JsonValue> {
        path.split('.').try_fold(&self.data, |node, segment| match segment.parse::<usize>() {
            Ok(index) => node.get(index),
            Err(_) => node.get(segment),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn errors_serialize_with_mixed_paths() {
        let response = Response {
            data: json!({ "accounts": [{ "orders": null }] }),
            errors: vec![GraphError {
                message: "order service unavailable".into(),
                path: vec!["accounts".into(), 0.into(), "orders".into()],
            }],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "data": { "accounts": [{ "orders": null }] },
                "errors": [{ "message": "order service unavailable", "path": ["accounts", 0, "orders"] }]
            })
        );
        assert_eq!(
            response.errors[0].to_string(),
            "order service unavailable at accounts[0].orders"
        );
        assert_eq!(response.pointer("accounts.0.orders"), Some(&JsonValue::Null));
    }

    #[test]
    fn empty_error_list_is_omitted() {
        let response = Response {
            data: json!({}),
            errors: Vec::new(),
        };
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"data":{}}"#);
    }
}
