use serde::{Deserialize, Serialize};

/// Error discriminants returned by the remote state endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiError {
    /// No session; the viewer stays in local-only mode.
    Unauthenticated,
    /// Authenticated, but the server holds no saved state for this user yet.
    Unknown,
    /// Anything the client does not recognize; logged and treated as failure.
    #[serde(other)]
    Unrecognized,
}

/// Response body of the remote state endpoint, for both GET (fetch) and POST
/// (upload). Exactly one of `state` and `error` is expected; `state` stays a
/// raw JSON value because legacy shapes must run through migration before
/// they can be decoded into [`crate::UserState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl StateEnvelope {
    pub fn with_state(state: serde_json::Value) -> Self {
        Self {
            state: Some(state),
            error: None,
        }
    }

    pub fn with_error(error: ApiError) -> Self {
        Self {
            state: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_state_response() {
        let envelope: StateEnvelope = serde_json::from_str(r#"{"state": {"s7": []}}"#).unwrap();
        assert!(envelope.state.is_some());
        assert!(envelope.error.is_none());
    }

    #[test]
    fn decodes_known_errors() {
        let envelope: StateEnvelope =
            serde_json::from_str(r#"{"error": "unauthenticated"}"#).unwrap();
        assert_eq!(envelope.error, Some(ApiError::Unauthenticated));

        let envelope: StateEnvelope = serde_json::from_str(r#"{"error": "unknown"}"#).unwrap();
        assert_eq!(envelope.error, Some(ApiError::Unknown));
    }

    #[test]
    fn unknown_error_string_is_unrecognized() {
        let envelope: StateEnvelope =
            serde_json::from_str(r#"{"error": "teapot_overheated"}"#).unwrap();
        assert_eq!(envelope.error, Some(ApiError::Unrecognized));
    }
}
