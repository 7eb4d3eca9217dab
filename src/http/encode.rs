//! Response status-line and header serialization.
//!
//! Grounded on `_http_server.c`'s `WriteHeadersState` coroutine: format the
//! response line into a small fixed buffer, then write each header as
//! `Name: value\r\n`, then the blank line terminating the head.

use crate::config::MAX_RESPONSE_LINE_SIZE;
use crate::error::Parse;
use crate::io::{RawIo, StreamBuffer};
use crate::Error;
use crate::Result;
use std::fmt::Write as _;

use super::status;
use super::types::HTTPResponseHeaders;

/// Writes `response`'s status line and headers to `stream`, followed by
/// the blank line that ends the head. Does not write a body.
///
/// Assembles the whole head into the connection's scratch buffer via
/// [`StreamBuffer::buffer`], then issues a single [`StreamBuffer::flush`] —
/// mirroring `WriteHeadersState`'s "format into the scratch buffer, then one
/// `write`" shape rather than one `write(2)` per fragment.
pub async fn write_headers<S: RawIo>(
    stream: &mut StreamBuffer<S>,
    response: &HTTPResponseHeaders,
) -> Result<()> {
    let reason = status::reason_phrase(response.code())
        .expect("HTTPResponseHeaders::set_code already rejects unsupported codes");

    let mut line = String::new();
    let _ = write!(
        line,
        "HTTP/1.1 {} {}\r\n",
        response.code().as_u16(),
        reason
    );
    if line.len() > MAX_RESPONSE_LINE_SIZE {
        return Err(Error::new_parse(Parse::LineTooLong));
    }
    stream.buffer(line.as_bytes())?;

    for pair in response.headers() {
        stream.buffer(pair.name.as_bytes())?;
        stream.buffer(b": ")?;
        stream.buffer(pair.value.as_bytes())?;
        stream.buffer(b"\r\n")?;
    }

    stream.buffer(b"\r\n")?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::EventLoop;
    use std::cell::RefCell;
    use std::io::{self, Read, Write};
    use std::pin::Pin;
    use std::rc::Rc;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    #[derive(Debug)]
    struct SinkIo(Vec<u8>);
    impl Read for SinkIo {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no input"))
        }
    }
    impl Write for SinkIo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl RawIo for SinkIo {
        fn raw_fd(&self) -> std::os::unix::io::RawFd {
            -1
        }
    }

    fn block_on<F: std::future::Future>(mut fut: F) -> F::Output {
        fn noop_clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop, noop, noop);
        let raw = RawWaker::new(std::ptr::null(), &VTABLE);
        let waker = unsafe { Waker::from_raw(raw) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(v) => v,
            Poll::Pending => panic!("not immediately ready"),
        }
    }

    #[test]
    fn serializes_status_line_and_headers() {
        let reactor = Rc::new(RefCell::new(EventLoop::init().unwrap()));
        let mut stream = StreamBuffer::new(SinkIo(Vec::new()), reactor, 4096, 4096);

        let mut rsp = HTTPResponseHeaders::new();
        rsp.set_code(http::StatusCode::NOT_FOUND);
        rsp.add_header("Content-Length", "0");

        block_on(write_headers(&mut stream, &rsp)).unwrap();

        let written = stream.get_ref().0.clone();
        let text = String::from_utf8(written).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
