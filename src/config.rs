//! Tunable limits, in the style of `hyper::server::conn::http1::Builder`'s
//! `max_buf_size`/`max_headers` knobs.
//!
//! None of these are safety-critical defaults a caller must get right: every
//! field has a value matching the fixed capacities the original spec hard-
//! codes, so a server built with `ServerConfig::default()` already enforces
//! the documented bounds.

/// Hard limit on the request/status line, matching `MAX_LINE_SIZE`.
pub const MAX_LINE_SIZE: usize = 1024;
/// Hard limit on the method token, matching `MAX_METHOD_SIZE`.
pub const MAX_METHOD_SIZE: usize = 16;
/// Hard limit on the request-target, matching `MAX_URI_SIZE`.
pub const MAX_URI_SIZE: usize = 1024;
/// Hard limit on the `HTTP/` version tag, matching `MAX_VERSION_SIZE`.
pub const MAX_VERSION_SIZE: usize = 8;
/// Hard limit on a header name, matching `MAX_HEADER_NAME_SIZE`.
pub const MAX_HEADER_NAME_SIZE: usize = 64;
/// Hard limit on a header value, matching `MAX_HEADER_VALUE_SIZE`.
pub const MAX_HEADER_VALUE_SIZE: usize = 128;
/// Hard limit on the number of headers per message, matching `MAX_NUM_HEADERS`.
pub const MAX_NUM_HEADERS: usize = 16;
/// Size of a connection's input buffer, matching `IN_BUF_SIZE`.
pub const IN_BUF_SIZE: usize = 4096;
/// Size of a connection's output scratch buffer, matching `OUT_BUF_SIZE`.
pub const OUT_BUF_SIZE: usize = 4096;
/// Hard limit on a serialized status line, matching `MAX_RESPONSE_LINE_SIZE`.
pub const MAX_RESPONSE_LINE_SIZE: usize = 128;

/// Builder for per-server tunables.
///
/// Every knob here already defaults to the spec's fixed capacities; this
/// exists so an embedder can lower (never raise — raising would violate the
/// bounded-memory-per-connection invariant) buffer sizes for a
/// resource-constrained deployment.
#[derive(Clone, Copy, Debug)]
pub struct ServerConfig {
    pub(crate) in_buf_size: usize,
    pub(crate) out_buf_size: usize,
    pub(crate) max_headers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            in_buf_size: IN_BUF_SIZE,
            out_buf_size: OUT_BUF_SIZE,
            max_headers: MAX_NUM_HEADERS,
        }
    }
}

impl ServerConfig {
    /// Starts building a config from the spec's defaults.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig::default(),
        }
    }
}

/// Fluent builder for [`ServerConfig`], mirroring hyper's `http1::Builder`.
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Sets the per-connection input buffer size. Must not exceed
    /// [`IN_BUF_SIZE`].
    pub fn in_buf_size(&mut self, size: usize) -> &mut Self {
        assert!(size <= IN_BUF_SIZE, "in_buf_size cannot exceed {}", IN_BUF_SIZE);
        self.config.in_buf_size = size;
        self
    }

    /// Sets the per-connection output buffer size. Must not exceed
    /// [`OUT_BUF_SIZE`].
    pub fn out_buf_size(&mut self, size: usize) -> &mut Self {
        assert!(
            size <= OUT_BUF_SIZE,
            "out_buf_size cannot exceed {}",
            OUT_BUF_SIZE
        );
        self.config.out_buf_size = size;
        self
    }

    /// Sets the maximum number of headers accepted per message. Must not
    /// exceed [`MAX_NUM_HEADERS`].
    pub fn max_headers(&mut self, count: usize) -> &mut Self {
        assert!(
            count <= MAX_NUM_HEADERS,
            "max_headers cannot exceed {}",
            MAX_NUM_HEADERS
        );
        self.config.max_headers = count;
        self
    }

    /// Finishes building the config.
    pub fn build(&self) -> ServerConfig {
        self.config
    }
}
