//! A minimal runnable server built on `davfuse_transport`: echoes every
//! request body back as the response body.
//!
//! Not part of the crate's public API surface — this is the same kind of
//! small, runnable demo hyper itself ships, trimmed to this crate's scope
//! (one handler, no routing, no TLS).

use davfuse_transport::config::ServerConfig;
use davfuse_transport::http::{server, HTTPResponseHeaders, Request};
use davfuse_transport::reactor::EventLoop;
use davfuse_transport::task::Executor;

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

async fn echo(req: &mut Request<mio::net::TcpStream>) -> davfuse_transport::Result<()> {
    let len = req.remaining();
    let body = req.read(len).await?;

    let mut response = HTTPResponseHeaders::new();
    response.set_code(http::StatusCode::OK);
    response.add_header("Content-Length", &body.len().to_string());
    req.write_headers(&response).await?;
    if !body.is_empty() {
        req.write(&body).await?;
    }
    req.end().await
}

fn main() -> davfuse_transport::Result<()> {
    tracing_subscriber::fmt::init();

    // This server never writes to a socket after the peer has gone away
    // without checking the write's return value first, but the peer can
    // still close its end between our readiness check and our write;
    // ignore SIGPIPE so that race is an `EPIPE` `Result::Err`, not a
    // terminated process.
    unsafe {
        nix::sys::signal::signal(nix::sys::signal::Signal::SIGPIPE, nix::sys::signal::SigHandler::SigIgn)
            .expect("failed to ignore SIGPIPE");
    }

    let reactor = Rc::new(RefCell::new(EventLoop::init()?));
    let executor = Executor::new(reactor.clone());

    let addr: SocketAddr = "127.0.0.1:8080".parse().expect("valid address");
    let (addr, _handle) = server::serve(&executor, reactor, addr, ServerConfig::default(), |req| echo(req))?;

    tracing::info!(%addr, "listening");
    executor.run()
}
