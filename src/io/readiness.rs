//! The leaf future every async I/O primitive bottoms out in: "wait until
//! this fd is ready", built directly on [`EventLoop::add_watch`].
//!
//! Grounded on the `other_examples` stackless-coroutine reactor's
//! `HttpGetFuture`: first poll registers interest (and the current waker)
//! with the reactor and returns `Pending`; once the reactor fires the
//! registered handler, the next poll observes the fired flag and resolves.

use crate::reactor::{EventLoop, Interest};
use crate::Result;
use std::cell::Cell;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::cell::RefCell;

/// Anything a [`StreamBuffer`](super::StreamBuffer) can drive: a raw,
/// nonblocking fd plus the ordinary `Read`/`Write` traits over it.
///
/// Implemented for `mio::net::TcpStream` (HTTP connections) and the
/// nonblocking ends of a FUSE channel's pipes.
pub trait RawIo: std::io::Read + std::io::Write {
    fn raw_fd(&self) -> RawFd;
}

pub(crate) struct ReadinessFuture {
    reactor: Rc<RefCell<EventLoop>>,
    fd: RawFd,
    interest: Interest,
    fired: Rc<Cell<bool>>,
    registered: bool,
}

impl ReadinessFuture {
    pub(crate) fn new(reactor: Rc<RefCell<EventLoop>>, fd: RawFd, interest: Interest) -> Self {
        ReadinessFuture {
            reactor,
            fd,
            interest,
            fired: Rc::new(Cell::new(false)),
            registered: false,
        }
    }
}

impl Future for ReadinessFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.fired.get() {
            return Poll::Ready(Ok(()));
        }
        if self.registered {
            return Poll::Pending;
        }

        let fired = self.fired.clone();
        let waker = cx.waker().clone();
        let result = self
            .reactor
            .borrow_mut()
            .add_watch(self.fd, self.interest, move |_event| {
                fired.set(true);
                waker.wake();
            });

        match result {
            Ok(_key) => {
                self.registered = true;
                Poll::Pending
            }
            Err(err) => Poll::Ready(Err(err)),
        }
    }
}

pub(crate) async fn readable(reactor: Rc<RefCell<EventLoop>>, fd: RawFd) -> Result<()> {
    ReadinessFuture::new(reactor, fd, Interest::READABLE).await
}

pub(crate) async fn writable(reactor: Rc<RefCell<EventLoop>>, fd: RawFd) -> Result<()> {
    ReadinessFuture::new(reactor, fd, Interest::WRITABLE).await
}

impl RawIo for mio::net::TcpStream {
    fn raw_fd(&self) -> RawFd {
        use std::os::unix::io::AsRawFd;
        self.as_raw_fd()
    }
}
