//! The pipe pair connecting the event-loop side of a FUSE adapter to its
//! worker.
//!
//! Grounded on `async_fuse_fs.c`'s `Channel` struct: two pipes, one for
//! each direction, with the event-loop ends nonblocking (so the reactor can
//! multiplex them like any other fd) and the worker ends blocking (the
//! worker does nothing but alternate between blocking reads and blocking
//! filesystem calls).

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::pipe as nix_pipe;
use std::fs::File;
use std::os::unix::io::{FromRawFd, RawFd};

use crate::{Error, Result};

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io_err)?;
    Ok(())
}

fn io_err(e: nix::Error) -> Error {
    Error::new_io(std::io::Error::from(e))
}

/// The event-loop side of a channel: a nonblocking write end to send
/// requests, a nonblocking read end to receive replies.
pub(crate) struct EventLoopEnd {
    pub(crate) to_worker: mio::unix::pipe::Sender,
    pub(crate) from_worker: mio::unix::pipe::Receiver,
}

/// The worker side of a channel: a blocking read end to receive requests, a
/// blocking write end to send replies.
pub(crate) struct WorkerEnd {
    pub(crate) to_worker: File,
    pub(crate) from_worker: File,
}

/// Builds a fresh pair of pipes, split into their event-loop and worker
/// ends. Mirrors `channel_init`.
pub(crate) fn channel_pair() -> Result<(EventLoopEnd, WorkerEnd)> {
    let (to_worker_r, to_worker_w) = nix_pipe().map_err(io_err)?;
    let (from_worker_r, from_worker_w) = nix_pipe().map_err(io_err)?;

    set_nonblocking(to_worker_w)?;
    set_nonblocking(from_worker_r)?;

    // Safety: each fd came from `pipe(2)` above and is handed to exactly
    // one owning wrapper here, never reused afterward.
    let event_loop_end = EventLoopEnd {
        to_worker: unsafe { mio::unix::pipe::Sender::from_raw_fd(to_worker_w) },
        from_worker: unsafe { mio::unix::pipe::Receiver::from_raw_fd(from_worker_r) },
    };
    let worker_end = WorkerEnd {
        to_worker: unsafe { File::from_raw_fd(to_worker_r) },
        from_worker: unsafe { File::from_raw_fd(from_worker_w) },
    };

    Ok((event_loop_end, worker_end))
}
