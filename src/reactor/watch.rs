use std::os::unix::io::RawFd;

/// Which direction(s) of readiness a watch cares about.
///
/// Mirrors the original `StreamEvents` bitset (`events.h`): a watch can ask
/// for readability, writability, or both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    /// Interested in the fd becoming readable.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    /// Interested in the fd becoming writable.
    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };

    pub(crate) fn to_mio(self) -> mio::Interest {
        match (self.read, self.write) {
            (true, true) => mio::Interest::READABLE.add(mio::Interest::WRITABLE),
            (true, false) => mio::Interest::READABLE,
            (false, true) => mio::Interest::WRITABLE,
            (false, false) => unreachable!("a watch must ask for at least one direction"),
        }
    }
}

/// A stable (but one-shot) reference to a registered watch.
///
/// Carries a generation counter so that a key from a watch that has already
/// fired (or been removed) can never accidentally address a newer watch
/// that happens to reuse the same slot — this is the "generational arena"
/// substitution the spec's REDESIGN FLAGS calls for in place of the
/// original's intrusive doubly linked list (`fdevent_select.c`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// The readiness event delivered to a watch's handler.
#[derive(Clone, Copy, Debug)]
pub struct FdEvent {
    /// The fd that became ready.
    pub fd: RawFd,
    /// True if the fd is readable.
    pub readable: bool,
    /// True if the fd is writable.
    pub writable: bool,
}

pub(crate) type Handler = Box<dyn FnOnce(FdEvent)>;

pub(crate) struct WatchSlot {
    pub(crate) fd: RawFd,
    pub(crate) interest: Interest,
    pub(crate) handler: Option<Handler>,
    pub(crate) active: bool,
    pub(crate) generation: u32,
}
