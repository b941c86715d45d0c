use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::callback::Callback;
use crate::exec::{EventLoop, ExecutorRef};
use crate::promise::Promise;
use crate::result::Outcome;
use crate::state::{self, StateCell, Status};

/// Future face of a promise. A buffered settlement is fetched inline so the
/// await never suspends; a pending promise parks the waker behind the
/// continuation slot, delivered on the current loop. A promise that was
/// already delivered elsewhere, or cancelled, never completes this future.
pub struct PromiseFuture<T: 'static, E: 'static> {
    state: Rc<StateCell<T, E>>,
    slot: Rc<RefCell<Option<Outcome<T, E>>>>,
    attached: bool,
}

impl<T: 'static, E: 'static> PromiseFuture<T, E> {
    fn new(state: Rc<StateCell<T, E>>) -> Self {
        PromiseFuture {
            state,
            slot: Rc::new(RefCell::new(None)),
            attached: false,
        }
    }
}

impl<T: 'static, E: 'static> Unpin for PromiseFuture<T, E> {}

impl<T: 'static, E: 'static> Future for PromiseFuture<T, E> {
    type Output = Outcome<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(out) = this.slot.borrow_mut().take() {
            return Poll::Ready(out);
        }
        let status = this.state.borrow().status();
        match status {
            Status::PreResolved | Status::PreRejected => {
                // settled but undelivered: a transient continuation with no
                // executor delivers inline, before we return
                let slot = this.slot.clone();
                state::attach(
                    &this.state,
                    Callback::once(move |out| *slot.borrow_mut() = Some(out)),
                    None,
                );
                match this.slot.borrow_mut().take() {
                    Some(out) => Poll::Ready(out),
                    None => Poll::Pending,
                }
            }
            Status::Init => {
                if !this.attached {
                    this.attached = true;
                    let slot = this.slot.clone();
                    let waker = cx.waker().clone();
                    let exec = EventLoop::current().map(|ev| ExecutorRef::from(ev.executor()));
                    state::attach(
                        &this.state,
                        Callback::once(move |out| {
                            *slot.borrow_mut() = Some(out);
                            waker.wake();
                        }),
                        exec,
                    );
                }
                Poll::Pending
            }
            Status::Resolved | Status::Rejected | Status::Cancelled => Poll::Pending,
        }
    }
}

impl<T: 'static, E: 'static> IntoFuture for Promise<T, E> {
    type Output = Outcome<T, E>;
    type IntoFuture = PromiseFuture<T, E>;

    fn into_future(self) -> PromiseFuture<T, E> {
        PromiseFuture::new(self.state().clone())
    }
}

impl<'a, T: 'static, E: 'static> IntoFuture for &'a Promise<T, E> {
    type Output = Outcome<T, E>;
    type IntoFuture = PromiseFuture<T, E>;

    fn into_future(self) -> PromiseFuture<T, E> {
        PromiseFuture::new(self.state().clone())
    }
}
