//! WebSocket Message Types
//!
//! Broadcast frames are detector events serialized as-is. The only typed
//! messages are the replies a recorder client gets for each log record it
//! submits.

use serde::Serialize;

/// Reply to a log record submitted over a recorder socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecorderReply {
    /// Record stored: `{"status":"saved"}`
    Saved { status: &'static str },
    /// Record rejected: `{"error":"<reason>"}`
    Error { error: String },
}

impl RecorderReply {
    pub fn saved() -> Self {
        RecorderReply::Saved { status: "saved" }
    }

    pub fn invalid_json() -> Self {
        Self::error("invalid JSON")
    }

    pub fn db_failed() -> Self {
        Self::error("db failed")
    }

    pub fn error(reason: impl Into<String>) -> Self {
        RecorderReply::Error {
            error: reason.into(),
        }
    }

    /// Serialize to the text frame sent to the client
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_reply() {
        assert_eq!(RecorderReply::saved().to_text(), r#"{"status":"saved"}"#);
        assert_eq!(
            serde_json::to_string(&RecorderReply::saved()).unwrap(),
            r#"{"status":"saved"}"#
        );
    }

    #[test]
    fn test_error_replies() {
        assert_eq!(RecorderReply::invalid_json().to_text(), r#"{"error":"invalid JSON"}"#);
        assert_eq!(RecorderReply::db_failed().to_text(), r#"{"error":"db failed"}"#);
        assert_eq!(
            RecorderReply::error(r#"bad "quote""#).to_text(),
            r#"{"error":"bad \"quote\""}"#
        );
    }
}
