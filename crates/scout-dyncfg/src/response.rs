//! Command reply bodies and status codes.

use serde::Serialize;

/// Status codes used in `FUNCTION_RESULT` frames.
pub mod codes {
    /// Success
    pub const OK: u16 = 200;
    /// Accepted, pending an activation decision
    pub const ACCEPTED: u16 = 202;
    /// Malformed or missing payload
    pub const BAD_REQUEST: u16 = 400;
    /// Unknown config id
    pub const NOT_FOUND: u16 = 404;
    /// Operation not allowed for this config
    pub const NOT_ALLOWED: u16 = 405;
    /// The config was applied but its pipeline could not be built
    pub const ENABLE_FAILED: u16 = 422;
    /// Command not implemented
    pub const NOT_IMPLEMENTED: u16 = 501;
}

#[derive(Serialize)]
struct SuccessBody {
    status: u16,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    #[serde(rename = "errorMessage")]
    error_message: String,
}

/// `{"status":N,"message":""}`
pub fn success_body(status: u16) -> String {
    serde_json::to_string(&SuccessBody {
        status,
        message: String::new(),
    })
    .expect("success body serialization cannot fail")
}

/// `{"status":N,"errorMessage":"…"}`
pub fn error_body(status: u16, message: impl Into<String>) -> String {
    serde_json::to_string(&ErrorBody {
        status,
        error_message: message.into(),
    })
    .expect("error body serialization cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_body_shape() {
        assert_eq!(success_body(202), r#"{"status":202,"message":""}"#);
    }

    #[test]
    fn test_error_body_shape() {
        assert_eq!(
            error_body(400, "missing configuration payload"),
            r#"{"status":400,"errorMessage":"missing configuration payload"}"#
        );
    }
}
