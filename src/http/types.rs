//! Bounded request/response header storage.
//!
//! Grounded on `http_server.h`'s `HTTPRequestHeaders`/`HTTPResponseHeaders`:
//! fixed `char[N]` arrays for the method, URI, and each header name/value,
//! and a fixed-size array of header pairs. `SmallString`/`SmallVec` (from
//! the `r3bl_tui` example's dependency stack) give the same "usually
//! stack-resident, bounded" shape without losing the ability to express
//! "this field is too long" as a distinct, recoverable parse error instead
//! of undefined behavior from an unchecked `memcpy`.
//!
//! Unlike a true fixed-size C array, these containers spill to the heap
//! past their inline capacity instead of refusing the write — so every
//! push in [`crate::http::parse`] is paired with an explicit length check
//! against the matching `MAX_*` constant in [`crate::config`], preserving
//! the original's hard per-field capacity.

use crate::config::{
    MAX_HEADER_NAME_SIZE, MAX_HEADER_VALUE_SIZE, MAX_METHOD_SIZE, MAX_NUM_HEADERS, MAX_URI_SIZE,
};
use smallstr::SmallString;
use smallvec::SmallVec;

pub(crate) type MethodBuf = SmallString<[u8; MAX_METHOD_SIZE]>;
pub(crate) type UriBuf = SmallString<[u8; MAX_URI_SIZE]>;
pub(crate) type HeaderNameBuf = SmallString<[u8; MAX_HEADER_NAME_SIZE]>;
pub(crate) type HeaderValueBuf = SmallString<[u8; MAX_HEADER_VALUE_SIZE]>;

/// One `Name: value` pair.
#[derive(Clone, Debug)]
pub struct HeaderPair {
    pub name: HeaderNameBuf,
    pub value: HeaderValueBuf,
}

/// The parsed request line and headers of one HTTP request.
///
/// Holds at most [`MAX_NUM_HEADERS`](crate::config::MAX_NUM_HEADERS)
/// headers; the parser in [`crate::http::parse`] rejects a request with
/// more as [`Kind::Parse(Parse::TooManyHeaders)`](crate::error).
#[derive(Clone, Debug, Default)]
pub struct HTTPRequestHeaders {
    pub(crate) method: MethodBuf,
    pub(crate) uri: UriBuf,
    pub(crate) version: http::Version,
    pub(crate) headers: SmallVec<[HeaderPair; MAX_NUM_HEADERS]>,
}

impl HTTPRequestHeaders {
    /// The request method, e.g. `"PROPFIND"`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request-target as sent on the wire (not yet percent-decoded).
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The request's declared HTTP version.
    pub fn version(&self) -> http::Version {
        self.version
    }

    /// Case-insensitive header lookup, matching `http_get_header_value`.
    /// Returns the first matching header's value if more than one header
    /// with the same name is present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|pair| pair.name.eq_ignore_ascii_case(name))
            .map(|pair| pair.value.as_str())
    }

    /// Iterates every header pair in wire order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|pair| (pair.name.as_str(), pair.value.as_str()))
    }
}

/// A response's status line and headers, built up before any bytes are
/// written to the connection.
///
/// Grounded on `HTTPResponseHeaders` / `http_response_init` /
/// `http_response_add_header` / `http_response_set_code`.
#[derive(Clone, Debug)]
pub struct HTTPResponseHeaders {
    pub(crate) code: http::StatusCode,
    pub(crate) headers: SmallVec<[HeaderPair; MAX_NUM_HEADERS]>,
}

impl Default for HTTPResponseHeaders {
    fn default() -> Self {
        HTTPResponseHeaders {
            code: http::StatusCode::OK,
            headers: SmallVec::new(),
        }
    }
}

impl HTTPResponseHeaders {
    /// Starts a fresh, header-less `200 OK` response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code. Fails if `code` isn't one this server knows a
    /// reason phrase for (see [`crate::http::status::reason_phrase`]).
    pub fn set_code(&mut self, code: http::StatusCode) -> bool {
        if super::status::reason_phrase(code).is_none() {
            return false;
        }
        self.code = code;
        true
    }

    /// The status code most recently set, or `200 OK` if never set.
    pub fn code(&self) -> http::StatusCode {
        self.code
    }

    /// Appends a header. Fails with `false` (mirroring the original's
    /// `bool`-returning API) if the response already holds
    /// [`MAX_NUM_HEADERS`](crate::config::MAX_NUM_HEADERS) headers, or if
    /// `name`/`value` exceed their respective size limits.
    pub fn add_header(&mut self, name: &str, value: &str) -> bool {
        if self.headers.len() >= MAX_NUM_HEADERS {
            return false;
        }
        if name.len() > MAX_HEADER_NAME_SIZE || value.len() > MAX_HEADER_VALUE_SIZE {
            return false;
        }
        self.headers.push(HeaderPair {
            name: HeaderNameBuf::from(name),
            value: HeaderValueBuf::from(value),
        });
        true
    }

    pub(crate) fn headers(&self) -> &[HeaderPair] {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HTTPRequestHeaders::default();
        headers.headers.push(HeaderPair {
            name: HeaderNameBuf::from("Content-Length"),
            value: HeaderValueBuf::from("42"),
        });
        assert_eq!(headers.header("content-length"), Some("42"));
        assert_eq!(headers.header("CONTENT-LENGTH"), Some("42"));
        assert_eq!(headers.header("x-other"), None);
    }

    #[test]
    fn add_header_rejects_past_capacity() {
        let mut rsp = HTTPResponseHeaders::new();
        for i in 0..MAX_NUM_HEADERS {
            assert!(rsp.add_header(&format!("X-{i}"), "v"));
        }
        assert!(!rsp.add_header("X-overflow", "v"));
    }

    #[test]
    fn set_code_rejects_unsupported_status() {
        let mut rsp = HTTPResponseHeaders::new();
        assert!(!rsp.set_code(http::StatusCode::IM_A_TEAPOT));
        assert_eq!(rsp.code(), http::StatusCode::OK);
        assert!(rsp.set_code(http::StatusCode::NOT_FOUND));
        assert_eq!(rsp.code(), http::StatusCode::NOT_FOUND);
    }
}
