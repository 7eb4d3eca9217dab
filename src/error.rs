//! Error and Result module.
//!
//! Grounded on `hyper::Error` (`src/error.rs` in the teacher crate): a single
//! opaque `Error` type wrapping a private `Kind`, with `is_*` predicates for
//! callers who need to branch on the failure class without matching on
//! private internals.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// A `Result` alias where the `Err` case is this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Represents errors that can occur while driving the reactor, a buffered
/// I/O coroutine, the HTTP connection state machine, or the FUSE adapter.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// Malformed request: header too long, too many headers, malformed
    /// request line. Spec taxonomy: `ParseError`.
    Parse(Parse),
    /// I/O failure on socket read/write, or EOF mid-request.
    /// Spec taxonomy: `TransportError`.
    Io,
    /// Allocation/registration failure (watch, context, connection), or the
    /// FUSE reply slot was already in use. Spec taxonomy: `ResourceExhaustion`.
    Exhausted,
    /// `select`/`poll` failed with something other than `EINTR`.
    /// Spec taxonomy: `UnrecoverableSelect`.
    Reactor,
}

#[derive(Debug)]
pub(crate) enum Parse {
    Method,
    Uri,
    Version,
    Header,
    TooManyHeaders,
    HeaderTooLong,
    LineTooLong,
    UnsupportedExpect,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(kind: Kind, cause: C) -> Error {
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                cause: Some(cause.into()),
            }),
        }
    }

    pub(crate) fn new_parse(parse: Parse) -> Error {
        Error::new(Kind::Parse(parse))
    }

    pub(crate) fn new_io(cause: io::Error) -> Error {
        Error::with(Kind::Io, cause)
    }

    pub(crate) fn new_exhausted() -> Error {
        Error::new(Kind::Exhausted)
    }

    pub(crate) fn new_reactor(cause: io::Error) -> Error {
        Error::with(Kind::Reactor, cause)
    }

    /// Returns true if this was a malformed-request parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(_))
    }

    /// Returns true if this was an I/O failure on the underlying stream.
    pub fn is_io(&self) -> bool {
        matches!(self.inner.kind, Kind::Io)
    }

    /// Returns true if this was a resource exhaustion failure (allocation,
    /// or the FUSE adapter's single reply slot was already in use).
    pub fn is_exhausted(&self) -> bool {
        matches!(self.inner.kind, Kind::Exhausted)
    }

    /// Returns true if the event loop's readiness poll itself failed.
    pub fn is_reactor(&self) -> bool {
        matches!(self.inner.kind, Kind::Reactor)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Parse(Parse::Method) => "invalid method token",
            Kind::Parse(Parse::Uri) => "invalid request-target",
            Kind::Parse(Parse::Version) => "invalid HTTP version",
            Kind::Parse(Parse::Header) => "invalid header",
            Kind::Parse(Parse::TooManyHeaders) => "too many headers",
            Kind::Parse(Parse::HeaderTooLong) => "header name or value too long",
            Kind::Parse(Parse::LineTooLong) => "request line too long",
            Kind::Parse(Parse::UnsupportedExpect) => "unsupported Expect directive",
            Kind::Io => "connection I/O error",
            Kind::Exhausted => "resource exhausted",
            Kind::Reactor => "event loop poll failed",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Error");
        builder.field("kind", &self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            builder.field("cause", cause);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())?;
        if let Some(ref cause) = self.inner.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.cause.as_ref().map(|c| &**c as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::new_io(err)
    }
}
