//! The per-connection request/response state machine.
//!
//! Grounded on `_http_request_context`'s `read_state`/`write_state` pair
//! (`HTTP_REQUEST_READ_STATE_*` / `HTTP_REQUEST_WRITE_STATE_*`), simplified
//! the way hyper's `proto::h1::conn::{Reading, Writing}` simplify the same
//! idea: both states only ever move forward, and there is no keep-alive
//! state to track since every connection serves exactly one request.

use crate::config::ServerConfig;
use crate::error::Parse;
use crate::io::{RawIo, StreamBuffer};
use crate::{Error, Result};

use super::encode;
use super::parse;
use super::types::{HTTPRequestHeaders, HTTPResponseHeaders};

/// The lifecycle events a connection moves through, in order.
///
/// These mirror the event names a callback-dispatch design would hand a
/// handler (`NEW_REQUEST`, `READ_HEADERS_DONE`, ...); here they're only
/// ever emitted as `tracing` events and asserted on in tests, since the
/// actual sequencing is just the order `async fn` code runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestEvent {
    NewRequest,
    ReadHeadersDone,
    BodyReadDone,
    HeadersWritten,
    Complete,
}

fn trace_event(event: RequestEvent) {
    tracing::trace!(?event, "request event");
}

/// How far a request's body has been read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    Head,
    Body,
    Done,
}

/// How far a response has been written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteState {
    Init,
    WroteHeaders,
    Done,
}

/// A request handed to a connection handler.
///
/// Grounded on the `http_request_*` free functions in `http_server.h`,
/// realized as methods on a handle instead of callback-style functions
/// taking a `http_request_handle_t` — the handle owns its connection's
/// buffered stream directly since there's no longer a separate
/// `HTTPConnection`/`HTTPRequestContext` split once the coroutine state
/// lives in the `async fn`'s own stack frame.
pub struct Request<S> {
    headers: HTTPRequestHeaders,
    stream: StreamBuffer<S>,
    read_remaining: usize,
    read_state: ReadState,
    write_state: WriteState,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Request<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("headers", &self.headers)
            .field("stream", &self.stream)
            .field("read_remaining", &self.read_remaining)
            .field("read_state", &self.read_state)
            .field("write_state", &self.write_state)
            .finish()
    }
}

impl<S: RawIo> Request<S> {
    /// The parsed request line and headers.
    pub fn headers(&self) -> &HTTPRequestHeaders {
        &self.headers
    }

    /// Bytes of the request body not yet read.
    pub fn remaining(&self) -> usize {
        self.read_remaining
    }

    /// Reads up to `max` bytes of the request body. Matches
    /// `http_request_read`'s "read at most `nbyte`, possibly fewer if the
    /// body doesn't have that many bytes left" contract.
    pub async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        if self.read_state == ReadState::Done || self.read_remaining == 0 {
            self.read_state = ReadState::Done;
            return Ok(Vec::new());
        }
        self.read_state = ReadState::Body;
        let n = max.min(self.read_remaining);
        let bytes = self.stream.read_exact(n).await?;
        self.read_remaining -= n;
        if self.read_remaining == 0 {
            self.read_state = ReadState::Done;
            trace_event(RequestEvent::BodyReadDone);
        }
        Ok(bytes)
    }

    /// Reads and discards the rest of the body, so the connection's input
    /// is left positioned after this request (there is only ever one
    /// request per connection, but leaving unread body bytes would corrupt
    /// the invariant that nothing after `end()` cares about wire position).
    async fn drain(&mut self) -> Result<()> {
        while self.read_remaining > 0 {
            self.read(self.read_remaining).await?;
        }
        Ok(())
    }

    /// Writes the response status line and headers. May be called exactly
    /// once, and only before [`write`](Self::write) or [`end`](Self::end).
    pub async fn write_headers(&mut self, response: &HTTPResponseHeaders) -> Result<()> {
        assert_eq!(
            self.write_state,
            WriteState::Init,
            "write_headers called more than once"
        );
        encode::write_headers(&mut self.stream, response).await?;
        self.write_state = WriteState::WroteHeaders;
        trace_event(RequestEvent::HeadersWritten);
        Ok(())
    }

    /// Writes a chunk of the response body. Must follow
    /// [`write_headers`](Self::write_headers).
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        assert_ne!(
            self.write_state,
            WriteState::Init,
            "write called before write_headers"
        );
        self.stream.write_all(data).await
    }

    /// Flushes any buffered output and marks the response complete.
    pub async fn end(&mut self) -> Result<()> {
        self.stream.flush().await?;
        self.write_state = WriteState::Done;
        trace_event(RequestEvent::Complete);
        Ok(())
    }
}

fn content_length(headers: &HTTPRequestHeaders) -> Result<usize> {
    match headers.header("content-length") {
        Some(v) => v.trim().parse::<usize>().map_err(|_| Error::new_parse(Parse::Header)),
        None => Ok(0),
    }
}

/// Reads one request's head off `stream` and builds its [`Request`] handle.
///
/// Returns `Err` with the [`Error`] that caused it if the client sent an
/// `Expect` directive — this server only understands `100-continue` well
/// enough to say no to it, so per the original's stated scope it answers
/// `417 Expectation Failed` and the caller should close the connection
/// without invoking a handler.
pub async fn accept_request<S: RawIo>(
    stream: &mut StreamBuffer<S>,
    config: &ServerConfig,
) -> Result<Result<HTTPRequestHeaders, Error>> {
    trace_event(RequestEvent::NewRequest);
    let headers = parse::read_headers(stream, config.max_headers).await?;
    trace_event(RequestEvent::ReadHeadersDone);
    if headers.header("expect").is_some() {
        let err = Error::new_parse(Parse::UnsupportedExpect);
        tracing::debug!(error = %err, "answering 417 to an unsupported Expect directive");
        let mut rsp = HTTPResponseHeaders::new();
        rsp.set_code(http::StatusCode::EXPECTATION_FAILED);
        rsp.add_header("Content-Length", "0");
        encode::write_headers(stream, &rsp).await?;
        return Ok(Err(err));
    }
    Ok(Ok(headers))
}

/// Builds a [`Request`] handle around an already-parsed head.
pub fn into_request<S: RawIo>(stream: StreamBuffer<S>, headers: HTTPRequestHeaders) -> Result<Request<S>> {
    let read_remaining = content_length(&headers)?;
    Ok(Request {
        headers,
        stream,
        read_remaining,
        read_state: ReadState::Head,
        write_state: WriteState::Init,
    })
}

/// Runs `handler` against one request on `stream`, then drains any
/// unread body and flushes any unflushed output so the connection can be
/// closed cleanly regardless of what the handler did or didn't consume.
pub async fn serve_one<S, F, Fut>(mut stream: StreamBuffer<S>, config: &ServerConfig, handler: F) -> Result<()>
where
    S: RawIo,
    F: FnOnce(&mut Request<S>) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let headers = match accept_request(&mut stream, config).await? {
        Ok(headers) => headers,
        Err(_) => return Ok(()),
    };

    let mut request = into_request(stream, headers)?;
    handler(&mut request).await?;
    request.drain().await?;
    if request.write_state != WriteState::Done {
        request.stream.flush().await?;
    }
    Ok(())
}
