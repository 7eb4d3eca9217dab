//! Component E — a cross-process-shaped async FUSE adapter.
//!
//! Tunnels blocking filesystem calls to a worker over a pair of
//! `PIPE_BUF`-bounded pipes, so the event loop's thread never blocks on a
//! filesystem syscall.

mod adapter;
mod channel;
mod message;
pub mod worker;

pub use self::adapter::FuseAdapter;
pub use self::message::FUSE_MAX_READ;
pub use self::worker::FilesystemBackend;
