//! Component C — buffered, cancellation-free async I/O primitives.
//!
//! See [`StreamBuffer`] for `getc`/`peek`/`read_while`/`read_exact`/
//! `write_all`, and [`RawIo`] for the trait any readiness-driven stream
//! implements to plug into it.

mod buffered;
mod readiness;

pub use self::buffered::StreamBuffer;
pub use self::readiness::RawIo;
pub(crate) use self::readiness::{readable, writable};
