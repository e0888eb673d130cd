//! Response extraction helpers
//!
//! Most endpoints decode into typed structs via [`decode`]. The path lookups
//! cover payloads whose shape is only partly known, such as the operation
//! handle buried in a create response (`server_ids[0]`, `status.job_id`).
//!
//! Path syntax: dot-separated object keys, each optionally followed by one or
//! more `[index]` array subscripts, e.g. `jobs[0].error_code`.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid path expression '{0}'")]
    InvalidPath(String),

    #[error("'{0}' is not found in API response")]
    Missing(String),

    #[error("'{path}' in API response is not a {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
    },

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> ExtractResult<Vec<Segment>> {
    let invalid = || ExtractError::InvalidPath(path.to_string());
    if path.is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() && (rest.is_empty() || !segments.is_empty()) {
            return Err(invalid());
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

/// Look up `path` in `value`. Invalid paths and missing entries give `None`.
pub fn search<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = match parse_path(path) {
        Ok(segments) => segments,
        Err(e) => {
            log::warn!("{}", e);
            return None;
        }
    };

    segments
        .iter()
        .try_fold(value, |current, segment| match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        })
        .filter(|v| !v.is_null())
}

/// Look up `path` and render scalars as text (numbers and booleans included).
///
/// Status fields come back as numbers from some services and strings from
/// others; call sites compare them as text.
pub fn search_string(value: &Value, path: &str) -> Option<String> {
    match search(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Like [`search_string`], falling back to `default`
pub fn search_string_or(value: &Value, path: &str, default: &str) -> String {
    search_string(value, path).unwrap_or_else(|| default.to_string())
}

/// Look up a required non-empty string at `path`
pub fn require_str<'a>(value: &'a Value, path: &str) -> ExtractResult<&'a str> {
    parse_path(path)?;
    match search(value, path) {
        None => Err(ExtractError::Missing(path.to_string())),
        Some(Value::String(s)) if s.is_empty() => Err(ExtractError::Missing(path.to_string())),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ExtractError::WrongType {
            path: path.to_string(),
            expected: "string",
        }),
    }
}

/// Decode a generic payload into a typed response struct
pub fn decode<T: DeserializeOwned>(value: Value) -> ExtractResult<T> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn create_response() -> Value {
        json!({
            "request_id": "req-1",
            "order_id": "CS2401010000ABCDE",
            "server_ids": ["srv-1", "srv-2"],
            "metadata": {"order_id": "CS2401010000ABCDE"},
            "jobs": [
                {"phone_id": "p-1", "job_id": "j-1"},
                {"phone_id": "p-2", "error_code": "CPS.0005", "error_msg": "phone busy"}
            ],
            "status": 5,
            "empty": null
        })
    }

    #[test]
    fn test_search_nested_paths() {
        let body = create_response();
        assert_eq!(search(&body, "server_ids[0]"), Some(&json!("srv-1")));
        assert_eq!(search(&body, "metadata.order_id"), Some(&json!("CS2401010000ABCDE")));
        assert_eq!(search(&body, "jobs[1].error_code"), Some(&json!("CPS.0005")));
        assert_eq!(search(&body, "jobs[5].error_code"), None);
        assert_eq!(search(&body, "missing.key"), None);
        assert_eq!(search(&body, "empty"), None);
    }

    #[test]
    fn test_search_string_renders_numbers() {
        let body = create_response();
        assert_eq!(search_string(&body, "status"), Some("5".to_string()));
        assert_eq!(search_string_or(&body, "jobs[0].error_code", ""), "");
        assert_eq!(search_string(&body, "server_ids"), None);
    }

    #[test]
    fn test_require_str() {
        let body = create_response();
        assert_eq!(require_str(&body, "server_ids[1]").unwrap(), "srv-2");
        assert!(matches!(
            require_str(&body, "status.job_id"),
            Err(ExtractError::Missing(_))
        ));
        assert!(matches!(
            require_str(&body, "status"),
            Err(ExtractError::WrongType { .. })
        ));
        assert!(matches!(
            require_str(&body, "jobs[x]"),
            Err(ExtractError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_parse_path_rejects_malformed_expressions() {
        assert!(parse_path("").is_err());
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[0").is_err());
        assert!(parse_path("a[0]b").is_err());
        assert_eq!(
            parse_path("[1].name").unwrap(),
            vec![Segment::Index(1), Segment::Key("name".to_string())]
        );
    }

    #[test]
    fn test_decode_typed_struct() {
        #[derive(Debug, Deserialize)]
        struct Created {
            order_id: String,
            server_ids: Vec<String>,
        }

        let created: Created = decode(create_response()).unwrap();
        assert_eq!(created.order_id, "CS2401010000ABCDE");
        assert_eq!(created.server_ids.len(), 2);

        let err = decode::<Created>(json!({"order_id": 1})).unwrap_err();
        assert!(matches!(err, ExtractError::Decode(_)));
    }
}
