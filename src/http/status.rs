//! The status codes this server knows how to produce.
//!
//! Grounded on `http_server.h`'s `http_status_code_t` / `http_response_set_code`:
//! the original enumerates fourteen codes and looks up a fixed reason phrase
//! for each (panicking the caller's request by returning `false` for
//! anything else). Here that's `http::StatusCode` restricted to the same
//! set via [`reason_phrase`], which also doubles as the "is this code one we
//! support" check.
//!
//! The original's `http_response_set_code` never wires up a case for
//! `HTTP_STATUS_CODE_INSUFFICIENT_STORAGE` even though it's in the enum —
//! setting that code silently falls through to `default: return false`. That
//! reads as an oversight rather than a deliberate omission (507 is exactly
//! the code a WebDAV PUT handler needs for a full filesystem), so this port
//! gives it a reason phrase rather than reproducing the gap.

use http::StatusCode;

/// Returns the fixed reason phrase this server sends for `code`, or `None`
/// if `code` isn't one of the statuses this server ever produces.
pub fn reason_phrase(code: StatusCode) -> Option<&'static str> {
    match code {
        StatusCode::OK => Some("OK"),
        StatusCode::CREATED => Some("Created"),
        StatusCode::NO_CONTENT => Some("No Content"),
        StatusCode::MULTI_STATUS => Some("Multi-Status"),
        StatusCode::BAD_REQUEST => Some("Bad Request"),
        StatusCode::FORBIDDEN => Some("Forbidden"),
        StatusCode::NOT_FOUND => Some("Not Found"),
        StatusCode::METHOD_NOT_ALLOWED => Some("Method Not Allowed"),
        StatusCode::CONFLICT => Some("Conflict"),
        StatusCode::PRECONDITION_FAILED => Some("Precondition Failed"),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => Some("Unsupported Media Type"),
        StatusCode::EXPECTATION_FAILED => Some("Expectation Failed"),
        StatusCode::INTERNAL_SERVER_ERROR => Some("Internal Server Error"),
        StatusCode::NOT_IMPLEMENTED => Some("Not Implemented"),
        StatusCode::INSUFFICIENT_STORAGE => Some("Insufficient Storage"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_code_has_a_phrase() {
        for code in [
            StatusCode::OK,
            StatusCode::CREATED,
            StatusCode::NO_CONTENT,
            StatusCode::MULTI_STATUS,
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::METHOD_NOT_ALLOWED,
            StatusCode::CONFLICT,
            StatusCode::PRECONDITION_FAILED,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            StatusCode::EXPECTATION_FAILED,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::NOT_IMPLEMENTED,
            StatusCode::INSUFFICIENT_STORAGE,
        ] {
            assert!(reason_phrase(code).is_some(), "{code} missing a phrase");
        }
    }

    #[test]
    fn unsupported_code_has_no_phrase() {
        assert_eq!(reason_phrase(StatusCode::IM_A_TEAPOT), None);
    }
}
