use std::rc::Rc;
use std::task::{Context, Poll};

use futures_util::future::LocalBoxFuture;
use tracing::trace;
use waker_fn::waker_fn;

use crate::exec::{EventLoop, Inner};
use crate::promise::Promise;
use crate::result::Outcome;
use crate::state;

pub(crate) struct TaskSlot {
    fut: Option<LocalBoxFuture<'static, ()>>,
}

/// Runs `fut` as a task on the current loop and returns the promise it will
/// settle: `Outcome::Value` resolves it, `Outcome::Error` rejects it. The
/// body runs eagerly up to its first suspension before this returns.
///
/// Cancelling the returned promise drops the task's future, releasing
/// everything it holds across suspension points. Promises the task is
/// currently awaiting are not cancelled by that; wire their resolvers into
/// the task if that is wanted.
///
/// # Panics
///
/// Panics when no live [`EventLoop`] is bound to this thread.
pub fn spawn<T, E, F>(fut: F) -> Promise<T, E>
where
    T: 'static,
    E: 'static,
    F: std::future::Future<Output = Outcome<T, E>> + 'static,
{
    let ev = EventLoop::current().expect("cannot spawn a task without a loop on this thread");
    let inner = ev.inner().clone();
    let promise = Promise::with_executor(ev.executor());

    // the task owns a handle to its own state, so the state outlives the
    // frame even if the caller drops every promise clone
    let cell = promise.state().clone();
    let wrapped = async move {
        let out = fut.await;
        state::settle(&cell, out);
    };

    let key = inner.tasks.borrow_mut().push(TaskSlot {
        fut: Some(Box::pin(wrapped)),
    });
    let weak = Rc::downgrade(&inner);
    state::set_on_cancel(promise.state(), move || {
        if let Some(inner) = weak.upgrade() {
            drop_task(&inner, key);
        }
    });

    poll_task(&inner, key);
    promise
}

/// Polls the task at `key` once. Spurious keys (completed, cancelled, or
/// reused slots) are harmless.
pub(crate) fn poll_task(inner: &Rc<Inner>, key: usize) {
    let mut fut = {
        let mut tasks = inner.tasks.borrow_mut();
        match tasks.get_mut(key).and_then(|slot| slot.fut.take()) {
            Some(fut) => fut,
            None => return,
        }
    };

    let shared = inner.shared.clone();
    let waker = waker_fn(move || shared.wake_task(key));
    let mut cx = Context::from_waker(&waker);

    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(()) => {
            let finished = inner.tasks.borrow_mut().remove(key);
            drop(finished);
        }
        Poll::Pending => {
            let mut tasks = inner.tasks.borrow_mut();
            match tasks.get_mut(key) {
                Some(slot) => slot.fut = Some(fut),
                None => {
                    // cancelled while running; the frame dies right here
                    drop(tasks);
                    drop(fut);
                }
            }
        }
    }
}

pub(crate) fn drop_task(inner: &Rc<Inner>, key: usize) {
    let removed = inner.tasks.borrow_mut().remove(key);
    if removed.is_some() {
        trace!(key, "task frame dropped");
    }
    drop(removed);
}
