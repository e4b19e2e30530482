use serde::{Deserialize, Serialize};

/// Exception type the service reports when a battle in the batch has no data
pub const KEY_NOT_FOUND_EXCEPTION: &str = "System.Collections.Generic.KeyNotFoundException";

/// Error payload returned alongside failing status codes
///
/// Only the exception type matters here; stack traces and messages are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(rename = "ExceptionType", default)]
    pub exception_type: Option<String>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

impl ServiceErrorBody {
    pub fn is_key_not_found(&self) -> bool {
        self.exception_type.as_deref() == Some(KEY_NOT_FOUND_EXCEPTION)
    }
}
