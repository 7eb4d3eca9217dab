//! Buffered, cancellation-free async I/O primitives shared by the HTTP
//! connection state machine and the FUSE channel workers.
//!
//! Grounded on `hyper::proto::h1::io::Buffered`: one input buffer, one
//! output buffer, both owned by the connection rather than the kernel.
//! Unlike hyper's version (which hands `httparse` the whole input buffer
//! at once), every read here goes through `getc`/`peek` so the HTTP parser
//! in [`crate::http::parse`] can be written the same incremental,
//! byte-at-a-time way the original spec's coroutine parser is.

use super::readiness::{readable, writable, RawIo};
use crate::error::Kind;
use crate::reactor::EventLoop;
use crate::{Error, Result};
use std::cell::RefCell;
use std::io::ErrorKind as StdErrorKind;
use std::rc::Rc;

/// A buffered, nonblocking stream driven by the reactor.
///
/// Generic over [`RawIo`] so the same incremental-read/bounded-write logic
/// serves both TCP connections and FUSE pipe channels.
pub struct StreamBuffer<S> {
    inner: S,
    reactor: Rc<RefCell<EventLoop>>,
    in_buf: Vec<u8>,
    in_pos: usize,
    in_cap: usize,
    out_buf: Vec<u8>,
    out_cap: usize,
}

impl<S: RawIo> StreamBuffer<S> {
    /// Wraps `inner`, whose reads/writes are driven against `reactor`.
    /// `in_cap` bounds how many unconsumed input bytes this buffer will
    /// hold before refusing to read further (see [`IN_BUF_SIZE`]); `out_cap`
    /// bounds how many bytes [`buffer`](Self::buffer) will queue before a
    /// flush (see [`OUT_BUF_SIZE`]).
    ///
    /// [`IN_BUF_SIZE`]: crate::config::IN_BUF_SIZE
    /// [`OUT_BUF_SIZE`]: crate::config::OUT_BUF_SIZE
    pub fn new(inner: S, reactor: Rc<RefCell<EventLoop>>, in_cap: usize, out_cap: usize) -> Self {
        StreamBuffer {
            inner,
            reactor,
            in_buf: Vec::new(),
            in_pos: 0,
            in_cap,
            out_buf: Vec::new(),
            out_cap,
        }
    }

    /// Borrows the underlying stream, e.g. to read its raw fd.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Reads and consumes the next byte.
    pub async fn getc(&mut self) -> Result<u8> {
        let b = self.peek().await?;
        self.in_pos += 1;
        Ok(b)
    }

    /// Reads the next byte without consuming it.
    pub async fn peek(&mut self) -> Result<u8> {
        loop {
            if self.in_pos < self.in_buf.len() {
                return Ok(self.in_buf[self.in_pos]);
            }
            self.fill().await?;
        }
    }

    /// Consumes bytes while `pred` holds, stopping (without consuming) at
    /// the first byte `pred` rejects. Fails with [`Kind::Exhausted`] if
    /// `max` bytes are collected before that happens — the caller (the
    /// HTTP parser) is responsible for turning that into the right
    /// `Parse` variant for the field it was reading.
    pub async fn read_while(&mut self, max: usize, mut pred: impl FnMut(u8) -> bool) -> Result<Vec<u8>> {
        let mut collected = Vec::new();
        loop {
            let b = self.peek().await?;
            if !pred(b) {
                return Ok(collected);
            }
            if collected.len() >= max {
                return Err(Error::new(Kind::Exhausted));
            }
            self.in_pos += 1;
            collected.push(b);
        }
    }

    /// Reads exactly `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.getc().await?);
        }
        Ok(out)
    }

    /// Writes every byte of `data`, retrying on partial writes and
    /// `WouldBlock`.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match self.inner.write(&data[written..]) {
                Ok(0) => {
                    return Err(Error::new_io(std::io::Error::new(
                        StdErrorKind::WriteZero,
                        "write returned 0",
                    )))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == StdErrorKind::WouldBlock => {
                    let fd = self.inner.raw_fd();
                    writable(self.reactor.clone(), fd).await?;
                }
                Err(e) if e.kind() == StdErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Buffers `data` for a later flush rather than writing immediately —
    /// used to assemble a response's status line and headers before the
    /// body is known to be ready, mirroring `Buffered::buffer` in hyper.
    /// Fails with [`Kind::Exhausted`] rather than growing past `out_cap`.
    pub fn buffer(&mut self, data: &[u8]) -> Result<()> {
        if self.out_buf.len() + data.len() > self.out_cap {
            return Err(Error::new(Kind::Exhausted));
        }
        self.out_buf.extend_from_slice(data);
        Ok(())
    }

    /// Flushes anything queued by [`buffer`](Self::buffer).
    pub async fn flush(&mut self) -> Result<()> {
        if self.out_buf.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.out_buf);
        self.write_all(&pending).await
    }

    async fn fill(&mut self) -> Result<()> {
        if self.in_pos > 0 {
            self.in_buf.drain(..self.in_pos);
            self.in_pos = 0;
        }
        if self.in_buf.len() >= self.in_cap {
            return Err(Error::new(Kind::Exhausted));
        }

        let mut tmp = vec![0u8; self.in_cap - self.in_buf.len()];
        loop {
            match self.inner.read(&mut tmp) {
                Ok(0) => {
                    return Err(Error::new_io(std::io::Error::new(
                        StdErrorKind::UnexpectedEof,
                        "connection closed mid-request",
                    )))
                }
                Ok(n) => {
                    self.in_buf.extend_from_slice(&tmp[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == StdErrorKind::WouldBlock => {
                    let fd = self.inner.raw_fd();
                    readable(self.reactor.clone(), fd).await?;
                }
                Err(e) if e.kind() == StdErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for StreamBuffer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("inner", &self.inner)
            .field("buffered_in", &(self.in_buf.len() - self.in_pos))
            .field("buffered_out", &self.out_buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    #[derive(Debug)]
    struct MemIo {
        incoming: VecDeque<u8>,
        outgoing: Vec<u8>,
    }

    impl Read for MemIo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.incoming.is_empty() {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "empty"));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.incoming.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for MemIo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outgoing.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl RawIo for MemIo {
        fn raw_fd(&self) -> std::os::unix::io::RawFd {
            // never registered with the reactor in these tests: every
            // read/write below is immediately satisfiable.
            -1
        }
    }

    fn test_reactor() -> Rc<RefCell<EventLoop>> {
        Rc::new(RefCell::new(EventLoop::init().unwrap()))
    }

    fn block_on<F: std::future::Future>(mut fut: F) -> F::Output {
        use std::pin::Pin;
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

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
            Poll::Pending => panic!("test future was not immediately ready"),
        }
    }

    #[test]
    fn getc_and_peek_share_the_cursor() {
        let io = MemIo {
            incoming: b"ab".iter().copied().collect(),
            outgoing: Vec::new(),
        };
        let mut buf = StreamBuffer::new(io, test_reactor(), 16, 16);

        assert_eq!(block_on(buf.peek()).unwrap(), b'a');
        assert_eq!(block_on(buf.getc()).unwrap(), b'a');
        assert_eq!(block_on(buf.getc()).unwrap(), b'b');
    }

    #[test]
    fn read_while_stops_without_consuming_delimiter() {
        let io = MemIo {
            incoming: b"tok:rest".iter().copied().collect(),
            outgoing: Vec::new(),
        };
        let mut buf = StreamBuffer::new(io, test_reactor(), 16, 16);

        let token = block_on(buf.read_while(16, |b| b != b':')).unwrap();
        assert_eq!(token, b"tok");
        assert_eq!(block_on(buf.getc()).unwrap(), b':');
    }

    #[test]
    fn read_while_enforces_max() {
        let io = MemIo {
            incoming: b"aaaaaaaaaa".iter().copied().collect(),
            outgoing: Vec::new(),
        };
        let mut buf = StreamBuffer::new(io, test_reactor(), 16, 16);
        let err = block_on(buf.read_while(4, |b| b == b'a')).unwrap_err();
        assert!(err.is_exhausted());
    }

    #[test]
    fn write_all_buffers_into_outgoing() {
        let io = MemIo {
            incoming: VecDeque::new(),
            outgoing: Vec::new(),
        };
        let mut buf = StreamBuffer::new(io, test_reactor(), 16, 16);
        block_on(buf.write_all(b"hello")).unwrap();
        assert_eq!(buf.get_ref().outgoing, b"hello");
    }

    #[test]
    fn buffer_enforces_out_cap() {
        let io = MemIo {
            incoming: VecDeque::new(),
            outgoing: Vec::new(),
        };
        let mut buf = StreamBuffer::new(io, test_reactor(), 16, 4);
        let err = buf.buffer(b"hello").unwrap_err();
        assert!(err.is_exhausted());
    }

    #[test]
    fn buffer_then_flush_writes_everything_at_once() {
        let io = MemIo {
            incoming: VecDeque::new(),
            outgoing: Vec::new(),
        };
        let mut buf = StreamBuffer::new(io, test_reactor(), 16, 16);
        buf.buffer(b"hel").unwrap();
        buf.buffer(b"lo").unwrap();
        assert!(buf.get_ref().outgoing.is_empty());
        block_on(buf.flush()).unwrap();
        assert_eq!(buf.get_ref().outgoing, b"hello");
    }
}
