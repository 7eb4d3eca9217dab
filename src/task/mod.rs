//! Component B — the single-threaded coroutine executor.
//!
//! The original spec drives its "microthreads" with the UTHR macros
//! (`CRBEGIN`/`CRYIELD`/`CRRETURN`) layered over the event loop: a
//! microthread runs until it needs an event, yields control back to the
//! loop, and resumes from the same point once the event arrives. Native
//! Rust already has this primitive — `async fn` compiles to exactly that
//! kind of resumable state machine — so rather than hand-rolling coroutine
//! macros this crate uses `std::future::Future` directly, driven by the
//! minimal executor below.
//!
//! This is deliberately not `tokio` or any other multi-threaded runtime:
//! the spec's whole premise is a single thread with no task migration and
//! no `Send`/`Sync` requirement on connection state, which is exactly what
//! the `other_examples` stackless-coroutine reactor demonstrates pairing
//! with `mio`. `Executor` here is that same pattern adapted to native
//! futures: a slot vector of boxed, locally-scoped futures, a ready queue,
//! and a `Waker` that re-enqueues a task's slot index.

mod waker;

use crate::reactor::EventLoop;
use crate::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Context;

type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// The single-threaded task scheduler.
///
/// Not `Send`/`Sync` — every future it holds may close over `Rc<RefCell<_>>`
/// state shared with the reactor, which is the whole point of staying on
/// one thread.
pub struct Executor {
    reactor: Rc<RefCell<EventLoop>>,
    tasks: RefCell<Vec<Option<LocalFuture>>>,
    free_list: RefCell<Vec<usize>>,
    ready: RefCell<VecDeque<usize>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("pending_tasks", &self.tasks.borrow().iter().flatten().count())
            .finish()
    }
}

impl Executor {
    /// Builds an executor driving the given reactor.
    pub fn new(reactor: Rc<RefCell<EventLoop>>) -> Rc<Executor> {
        Rc::new(Executor {
            reactor,
            tasks: RefCell::new(Vec::new()),
            free_list: RefCell::new(Vec::new()),
            ready: RefCell::new(VecDeque::new()),
        })
    }

    /// Returns the reactor this executor's leaf futures register watches
    /// with.
    pub fn reactor(&self) -> Rc<RefCell<EventLoop>> {
        self.reactor.clone()
    }

    /// Spawns a fire-and-forget task. The equivalent of the original's
    /// `start_coroutine` call — there is no join handle, matching the
    /// spec's connection-handler coroutines, which never return a value
    /// their caller waits on.
    pub fn spawn(self: &Rc<Self>, future: impl Future<Output = ()> + 'static) {
        let mut tasks = self.tasks.borrow_mut();
        let index = self
            .free_list
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| tasks.len());

        let boxed: LocalFuture = Box::pin(future);
        if index < tasks.len() {
            tasks[index] = Some(boxed);
        } else {
            tasks.push(Some(boxed));
        }
        drop(tasks);

        self.ready.borrow_mut().push_back(index);
    }

    pub(crate) fn mark_ready(&self, index: usize) {
        self.ready.borrow_mut().push_back(index);
    }

    fn has_tasks(&self) -> bool {
        self.tasks.borrow().iter().any(Option::is_some)
    }

    /// Polls every currently-ready task once, removing any that complete.
    fn drain_ready(self: &Rc<Self>) {
        loop {
            let index = match self.ready.borrow_mut().pop_front() {
                Some(index) => index,
                None => return,
            };

            let mut future = match self.tasks.borrow_mut()[index].take() {
                Some(future) => future,
                // already completed, or woken twice for one poll — a
                // harmless race between a leaf future's waker and a fresh
                // readiness notification.
                None => continue,
            };

            let waker = waker::waker_for(self.clone(), index);
            let mut cx = Context::from_waker(&waker);

            match future.as_mut().poll(&mut cx) {
                std::task::Poll::Ready(()) => {
                    self.free_list.borrow_mut().push(index);
                }
                std::task::Poll::Pending => {
                    self.tasks.borrow_mut()[index] = Some(future);
                }
            }
        }
    }

    /// Runs until every spawned task (and every task spawned transitively
    /// by them) has completed.
    ///
    /// Interleaves draining the ready queue with single dispatch passes of
    /// the reactor ([`EventLoop::turn`]), so a task woken by another task
    /// in the same batch runs before the loop blocks on I/O again.
    pub fn run(self: &Rc<Self>) -> Result<()> {
        loop {
            self.drain_ready();

            if !self.has_tasks() {
                return Ok(());
            }

            // Every remaining task is waiting on a reactor watch it
            // registered during `drain_ready` above; block for the next
            // readiness batch.
            self.reactor.borrow_mut().turn()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::task::Poll;

    struct YieldOnce {
        yielded: bool,
    }

    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn spawned_task_runs_to_completion() {
        let reactor = Rc::new(RefCell::new(EventLoop::init().unwrap()));
        let executor = Executor::new(reactor);
        let ran = Rc::new(Cell::new(false));
        let ran2 = ran.clone();

        executor.spawn(async move {
            YieldOnce { yielded: false }.await;
            ran2.set(true);
        });

        executor.run().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn multiple_tasks_all_complete() {
        let reactor = Rc::new(RefCell::new(EventLoop::init().unwrap()));
        let executor = Executor::new(reactor);
        let count = Rc::new(Cell::new(0));

        for _ in 0..5 {
            let count = count.clone();
            executor.spawn(async move {
                YieldOnce { yielded: false }.await;
                count.set(count.get() + 1);
            });
        }

        executor.run().unwrap();
        assert_eq!(count.get(), 5);
    }
}
