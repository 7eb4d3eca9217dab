//! The accept loop: binds a listener and spawns one task per connection.
//!
//! Grounded on `http_server_start`/`http_server_stop`, adapted from
//! "register one watch on the listening fd, re-register after every
//! accept" to "spawn a coroutine that loops accepting", matching how
//! `hyper::server::Server`'s `serve` future owns its listener for as long
//! as it runs.

use crate::config::ServerConfig;
use crate::io::StreamBuffer;
use crate::reactor::EventLoop;
use crate::task::Executor;
use crate::Result;

use std::cell::RefCell;
use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use super::conn::{serve_one, Request};

/// Binds `addr` and drives an accept loop on `executor` that spawns
/// `handler` for every accepted connection.
///
/// Returns the address the listener actually bound to (so a caller that
/// passed port `0` can discover the ephemeral port the OS picked, the same
/// role `hyper::server::conn::AddrIncoming::local_addr` plays) alongside a
/// [`ServerHandle`] once the listener itself is bound; the accept loop keeps
/// running for as long as `executor.run()` keeps polling it and
/// [`ServerHandle::stop`] hasn't been called.
pub fn serve<F, Fut>(
    executor: &Rc<Executor>,
    reactor: Rc<RefCell<EventLoop>>,
    addr: SocketAddr,
    config: ServerConfig,
    handler: F,
) -> Result<(SocketAddr, ServerHandle)>
where
    F: Fn(&mut Request<mio::net::TcpStream>) -> Fut + Clone + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    let std_listener = std::net::TcpListener::bind(addr)?;
    std_listener.set_nonblocking(true)?;
    let local_addr = std_listener.local_addr()?;
    let listener = mio::net::TcpListener::from_std(std_listener);

    let shared = Rc::new(RefCell::new(StopShared {
        stopped: false,
        waker: None,
    }));
    let handle = ServerHandle {
        shared: shared.clone(),
    };

    executor.spawn(accept_loop(executor.clone(), reactor, listener, config, handler, shared));
    Ok((local_addr, handle))
}

/// A handle to a running [`serve`] accept loop.
///
/// Grounded on `http_server_stop`: removing the listen watch so no new
/// connections are accepted, while every connection already in flight keeps
/// running until its handler calls `end`.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Rc<RefCell<StopShared>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("stopped", &self.shared.borrow().stopped)
            .finish()
    }
}

impl ServerHandle {
    /// Stops the accept loop. Connections already accepted are unaffected —
    /// each keeps running under the executor until its own handler finishes.
    pub fn stop(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.stopped = true;
        if let Some(waker) = shared.waker.take() {
            waker.wake();
        }
    }
}

struct StopShared {
    stopped: bool,
    waker: Option<Waker>,
}

/// Resolves once [`ServerHandle::stop`] has been called.
struct StopSignal {
    shared: Rc<RefCell<StopShared>>,
}

impl Future for StopSignal {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut shared = self.shared.borrow_mut();
        if shared.stopped {
            Poll::Ready(())
        } else {
            shared.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Races "the listening fd became readable" against "the server was asked
/// to stop", waking on whichever happens first. Both legs register the same
/// waker, so a `stop()` call while the task is parked on the fd still wakes
/// it promptly, matching the spec's cancellation model of faulting the next
/// I/O attempt rather than providing first-class cancellation.
struct AcceptRace {
    readable: Pin<Box<dyn Future<Output = Result<()>>>>,
    stop: StopSignal,
}

enum RaceOutcome {
    Readable(Result<()>),
    Stopped,
}

impl Future for AcceptRace {
    type Output = RaceOutcome;
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<RaceOutcome> {
        if Pin::new(&mut self.stop).poll(cx).is_ready() {
            return Poll::Ready(RaceOutcome::Stopped);
        }
        match self.readable.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready(RaceOutcome::Readable(result)),
            Poll::Pending => Poll::Pending,
        }
    }
}

async fn accept_loop<F, Fut>(
    executor: Rc<Executor>,
    reactor: Rc<RefCell<EventLoop>>,
    mut listener: mio::net::TcpListener,
    config: ServerConfig,
    handler: F,
    stop: Rc<RefCell<StopShared>>,
) where
    F: Fn(&mut Request<mio::net::TcpStream>) -> Fut + Clone + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    loop {
        match listener.accept() {
            Ok((stream, _peer)) => {
                let _ = stream.set_nodelay(true);
                let reactor2 = reactor.clone();
                let config2 = config;
                let handler2 = handler.clone();
                let executor2 = executor.clone();
                executor.spawn(async move {
                    let buffered =
                        StreamBuffer::new(stream, reactor2, config2.in_buf_size, config2.out_buf_size);
                    if let Err(err) = serve_one(buffered, &config2, |req| handler2(req)).await {
                        tracing::debug!(error = %err, "connection ended with an error");
                    }
                    let _ = executor2;
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                let fd = listener.as_raw_fd();
                let race = AcceptRace {
                    readable: Box::pin(crate::io::readable(reactor.clone(), fd)),
                    stop: StopSignal { shared: stop.clone() },
                };
                match race.await {
                    RaceOutcome::Stopped => return,
                    RaceOutcome::Readable(Ok(())) => continue,
                    RaceOutcome::Readable(Err(_)) => return,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(_req: &mut Request<mio::net::TcpStream>) -> impl Future<Output = Result<()>> {
        async move { Ok(()) }
    }

    #[test]
    fn serve_on_port_zero_reports_the_bound_address() {
        let reactor = Rc::new(RefCell::new(EventLoop::init().unwrap()));
        let executor = Executor::new(reactor.clone());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let (bound, handle) =
            serve(&executor, reactor, addr, ServerConfig::default(), not_found).unwrap();
        assert_ne!(bound.port(), 0);
        assert_eq!(bound.ip(), addr.ip());

        // tears the accept loop down without needing a live connection: the
        // full accept-then-stop interplay is covered end to end by the
        // top-level `tests/server.rs` integration suite.
        handle.stop();
    }

    #[test]
    fn stop_wakes_a_pending_stop_signal() {
        use std::task::{RawWaker, RawWakerVTable};

        unsafe fn clone(data: *const ()) -> RawWaker {
            let rc = Rc::from_raw(data as *const std::cell::Cell<bool>);
            let cloned = rc.clone();
            std::mem::forget(rc);
            RawWaker::new(Rc::into_raw(cloned) as *const (), &VTABLE)
        }
        unsafe fn wake(data: *const ()) {
            let rc = Rc::from_raw(data as *const std::cell::Cell<bool>);
            rc.set(true);
        }
        unsafe fn wake_by_ref(data: *const ()) {
            let rc = Rc::from_raw(data as *const std::cell::Cell<bool>);
            rc.set(true);
            std::mem::forget(rc);
        }
        unsafe fn drop_waker(data: *const ()) {
            drop(Rc::from_raw(data as *const std::cell::Cell<bool>));
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_waker);

        let shared = Rc::new(RefCell::new(StopShared {
            stopped: false,
            waker: None,
        }));
        let handle = ServerHandle {
            shared: shared.clone(),
        };

        let woken = Rc::new(std::cell::Cell::new(false));
        let raw = RawWaker::new(Rc::into_raw(woken.clone()) as *const (), &VTABLE);
        let waker = unsafe { Waker::from_raw(raw) };
        let mut cx = Context::from_waker(&waker);

        let mut signal = StopSignal { shared: shared.clone() };
        assert!(Pin::new(&mut signal).poll(&mut cx).is_pending());
        assert!(!woken.get());

        handle.stop();
        assert!(woken.get(), "stop() must wake a waker registered by a pending StopSignal");
        assert!(Pin::new(&mut signal).poll(&mut cx).is_ready());
    }
}
