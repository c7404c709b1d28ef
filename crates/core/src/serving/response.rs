use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

/// Message of the response for a target path that is not an existing file.
pub const TARGET_NOT_FOUND: &str = "target path not real";

/// Outcome of one request line, serialized as a single JSON line.
///
/// `request_id` is always present; `null` when the request carried none or
/// could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { status: &'static str, request_id: Value },
    Error { error: String, request_id: Value },
}

impl Response {
    pub fn ok(request_id: Value) -> Self {
        Self::Ok {
            status: "ok",
            request_id,
        }
    }

    pub fn error(message: impl Into<String>, request_id: Value) -> Self {
        Self::Error {
            error: message.into(),
            request_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Writes the response as one line and flushes `out`.
    pub fn write_line(&self, out: &mut impl Write) -> io::Result<()> {
        serde_json::to_writer(&mut *out, self)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(response: &Response) -> String {
        let mut buf = Vec::new();
        response.write_line(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_ok_shape() {
        assert_eq!(line(&Response::ok(json!("a1"))), "{\"status\":\"ok\",\"request_id\":\"a1\"}\n");
    }

    #[test]
    fn test_error_shape() {
        assert_eq!(
            line(&Response::error(TARGET_NOT_FOUND, json!("a2"))),
            "{\"error\":\"target path not real\",\"request_id\":\"a2\"}\n"
        );
    }

    #[test]
    fn test_null_request_id_is_kept() {
        assert_eq!(
            line(&Response::error("bad", Value::Null)),
            "{\"error\":\"bad\",\"request_id\":null}\n"
        );
    }

    #[test]
    fn test_structured_request_id_round_trips() {
        let id = json!({"job": 7, "tags": ["x"]});
        let parsed: Value = serde_json::from_str(&line(&Response::ok(id.clone()))).unwrap();
        assert_eq!(parsed["request_id"], id);
    }

    #[test]
    fn test_message_is_escaped() {
        let parsed: Value =
            serde_json::from_str(&line(&Response::error("line1\n\"quoted\"", Value::Null))).unwrap();
        assert_eq!(parsed["error"], "line1\n\"quoted\"");
    }

    #[test]
    fn test_is_error() {
        assert!(Response::error("x", Value::Null).is_error());
        assert!(!Response::ok(Value::Null).is_error());
    }
}
