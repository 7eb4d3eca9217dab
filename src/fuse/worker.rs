//! The blocking worker loop.
//!
//! Grounded on `async_fuse_fs.c`'s worker `pthread`/process main loop: block
//! reading a request frame, perform the matching blocking filesystem call,
//! write back a reply frame, repeat until a `Quit` request arrives.

use super::channel::WorkerEnd;
use super::message::{Reply, Request, FUSE_FRAME_SIZE};
use std::io::{Read, Write};

/// The blocking filesystem operations a FUSE worker dispatches requests to.
///
/// Implementors do their own blocking I/O freely — this trait's whole
/// purpose is to keep that I/O off the event loop's thread.
pub trait FilesystemBackend {
    /// Opens `path`, returning an opaque handle or a raw `errno`.
    fn open(&mut self, path: &str) -> std::result::Result<u64, i32>;
    /// Reads up to `len` bytes from `handle` at `offset`, returning a raw
    /// `errno` on failure. Returning fewer bytes than `len` (including
    /// zero) signals end-of-file, the same as a short `read(2)`.
    fn read(&mut self, handle: u64, offset: u64, len: u32) -> std::result::Result<Vec<u8>, i32>;
}

pub(crate) fn run<B: FilesystemBackend>(mut channel: WorkerEnd, mut backend: B) {
    loop {
        let request = match recv_request(&mut channel.to_worker) {
            Some(request) => request,
            None => return,
        };

        let reply = match request {
            Request::Quit => return,
            Request::Open { path } => match backend.open(&path) {
                Ok(handle) => Reply::Open { handle },
                Err(errno) => Reply::Error { errno },
            },
            Request::Read { handle, offset, len } => match backend.read(handle, offset, len) {
                Ok(data) => Reply::Read { data },
                Err(errno) => Reply::Error { errno },
            },
        };

        if send_reply(&mut channel.from_worker, &reply).is_err() {
            return;
        }
    }
}

/// Blocks for the next request frame in a single `read(2)` call — the
/// event-loop side always writes a whole `FUSE_FRAME_SIZE` frame atomically
/// (see `adapter::send_frame`), so one call here either returns the entire
/// frame or signals the channel closed.
fn recv_request(reader: &mut impl Read) -> Option<Request> {
    let mut frame = vec![0u8; FUSE_FRAME_SIZE];
    match reader.read(&mut frame).ok()? {
        0 => None,
        n if n == FUSE_FRAME_SIZE => Request::decode(&frame),
        n => panic!("fuse frame read was not atomic: read {n} of {FUSE_FRAME_SIZE} bytes"),
    }
}

/// Replies in a single `write(2)` call of exactly one frame. Never fails
/// per the spec ("reply write never fails (else abort)") except when the
/// event-loop side's read end has genuinely gone away, in which case the
/// caller treats it as the worker's own shutdown signal.
fn send_reply(writer: &mut impl Write, reply: &Reply) -> std::io::Result<()> {
    let frame = reply.encode();
    let n = writer.write(&frame)?;
    assert_eq!(n, FUSE_FRAME_SIZE, "fuse frame write was not atomic");
    Ok(())
}
