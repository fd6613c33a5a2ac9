//! Structured replies.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Error text for kinds that have no registered handler.
pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type";

/// `{ success, data?, error? }`.
///
/// `data` is only meaningful when `success` is true, `error` only when it is
/// false. Constructors keep the two exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct MessageResponse<T> {
    pub success: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Untyped reply as produced by a router.
pub type WireResponse = MessageResponse<Value>;

// A present-but-null `data` must stay `Some(null)` for kinds whose response
// is itself optional.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<T> MessageResponse<T> {
    /// Successful reply carrying `data`.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed reply carrying a description.
    #[must_use]
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// The reply for a kind nobody handles.
    #[must_use]
    pub fn unknown_kind() -> Self {
        Self::err(UNKNOWN_MESSAGE_TYPE)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Error text of a failed reply.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("Unknown error"))
        }
    }

    /// Collapse into a `Result`.
    ///
    /// # Errors
    /// Returns the error text when the reply is a failure or carries no data.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("Response carried no data".to_string()),
            (false, _) => Err(self.error.unwrap_or_else(|| "Unknown error".to_string())),
        }
    }

    /// Transform the data of a successful reply.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MessageResponse<U> {
        MessageResponse {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl WireResponse {
    /// Decode the untyped `data` into the kind's response shape.
    ///
    /// A success whose data does not match the expected shape becomes a
    /// failure; a missing `data` decodes as JSON `null`.
    #[must_use]
    pub fn decode<T: DeserializeOwned>(self) -> MessageResponse<T> {
        if !self.success {
            return MessageResponse {
                success: false,
                data: None,
                error: self.error,
            };
        }
        match serde_json::from_value(self.data.unwrap_or(Value::Null)) {
            Ok(data) => MessageResponse::ok(data),
            Err(e) => MessageResponse::err(format!("Malformed response: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ack, Settings};

    #[test]
    fn test_failure_has_no_data() {
        let resp = WireResponse::unknown_kind();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "Unknown message type" })
        );
        assert_eq!(resp.error_message(), Some(UNKNOWN_MESSAGE_TYPE));
    }

    #[test]
    fn test_decode_success() {
        let wire = WireResponse::ok(serde_json::json!({ "success": true }));
        let typed = wire.decode::<Ack>();
        assert_eq!(typed.into_result(), Ok(Ack::OK));
    }

    #[test]
    fn test_decode_absent_settings() {
        let wire = WireResponse::ok(Value::Null);
        let typed = wire.decode::<Option<Settings>>();
        assert!(typed.success);
        assert_eq!(typed.into_result(), Ok(None));
    }

    #[test]
    fn test_decode_wrong_shape_fails() {
        let wire = WireResponse::ok(serde_json::json!("nope"));
        let typed = wire.decode::<Ack>();
        assert!(!typed.success);
        assert!(typed.error.unwrap().starts_with("Malformed response"));
    }

    #[test]
    fn test_null_data_survives_roundtrip() {
        let resp: MessageResponse<Option<Settings>> = MessageResponse::ok(None);
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"success":true,"data":null}"#);
        let parsed: MessageResponse<Option<Settings>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data, Some(None));
    }
}
