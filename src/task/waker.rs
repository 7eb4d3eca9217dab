//! A `std::task::Waker` that re-enqueues a task index on an executor's
//! ready queue.
//!
//! Grounded on the `other_examples` stackless-coroutine reactor, which
//! hand-rolls its own `Waker` tied to a reactor-assigned id; here the
//! equivalent id is the task's slot index in [`Executor`](super::Executor),
//! and the wake operation is expressed against `std::task::RawWaker` so the
//! rest of the crate can use native `async fn` / `.await` instead of a
//! bespoke `Future` trait.

use super::Executor;
use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

struct WakeData {
    executor: Rc<Executor>,
    index: usize,
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);

unsafe fn clone(data: *const ()) -> RawWaker {
    let wake_data = Rc::from_raw(data as *const WakeData);
    let cloned = wake_data.clone();
    std::mem::forget(wake_data);
    RawWaker::new(Rc::into_raw(cloned) as *const (), &VTABLE)
}

unsafe fn wake(data: *const ()) {
    let wake_data = Rc::from_raw(data as *const WakeData);
    wake_data.executor.mark_ready(wake_data.index);
}

unsafe fn wake_by_ref(data: *const ()) {
    let wake_data = Rc::from_raw(data as *const WakeData);
    wake_data.executor.mark_ready(wake_data.index);
    std::mem::forget(wake_data);
}

unsafe fn drop(data: *const ()) {
    drop(Rc::from_raw(data as *const WakeData));
}

/// Builds a `Waker` that, when woken, marks task `index` ready on `executor`.
pub(crate) fn waker_for(executor: Rc<Executor>, index: usize) -> Waker {
    let data = Rc::new(WakeData { executor, index });
    let raw = RawWaker::new(Rc::into_raw(data) as *const (), &VTABLE);
    unsafe { Waker::from_raw(raw) }
}
