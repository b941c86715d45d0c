use std::rc::{Rc, Weak};

use crate::callback::Callback;
use crate::exec::ExecutorRef;
use crate::result::Outcome;
use crate::state::{self, PromiseState, StateCell, Status};

/// One-shot asynchronous value with a single continuation slot. Clones share
/// the backing state; the handle never crosses threads.
pub struct Promise<T, E> {
    state: Rc<StateCell<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            state: self.state.clone(),
        }
    }
}

impl<T: 'static, E: 'static> Default for Promise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, E: 'static> Promise<T, E> {
    /// A pending promise with no executor: continuations run inline on the
    /// thread that settles it.
    pub fn new() -> Self {
        Promise {
            state: Rc::new(PromiseState::new(None)),
        }
    }

    /// A pending promise whose continuations are posted to `exec` — either
    /// a bare executor (delivered in its default band) or an
    /// [`ExecutorRef`] pinned to a specific band.
    pub fn with_executor(exec: impl Into<ExecutorRef>) -> Self {
        Promise {
            state: Rc::new(PromiseState::new(Some(exec.into()))),
        }
    }

    pub(crate) fn from_state(state: Rc<StateCell<T, E>>) -> Self {
        Promise { state }
    }

    pub(crate) fn state(&self) -> &Rc<StateCell<T, E>> {
        &self.state
    }

    pub fn resolver(&self) -> Resolver<T, E> {
        Resolver {
            state: Rc::downgrade(&self.state),
        }
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    /// True while a settlement is buffered in the state but not yet handed
    /// to a continuation. The await adapter relies on exactly this window to
    /// skip suspension.
    pub fn has_buffered_result(&self) -> bool {
        matches!(self.status(), Status::PreResolved | Status::PreRejected)
    }

    pub fn has_handler(&self) -> bool {
        self.state.borrow().has_handler()
    }

    pub fn executor(&self) -> Option<ExecutorRef> {
        self.state.borrow().executor()
    }

    /// Side-effect continuation; the chain ends here. The callback receives
    /// the outcome whether the promise resolved or rejected.
    pub fn then_tap<F>(&self, f: F)
    where
        F: FnOnce(Outcome<T, E>) + 'static,
    {
        self.tap_impl(self.executor(), f);
    }

    /// Like [`then_tap`](Self::then_tap) with an explicit executor. `None`
    /// runs the callback inline on the thread that settles this promise.
    pub fn then_tap_on<F>(&self, exec: Option<ExecutorRef>, f: F)
    where
        F: FnOnce(Outcome<T, E>) + 'static,
    {
        self.tap_impl(exec, f);
    }

    /// Synchronous transform: the returned downstream promise settles with
    /// whatever outcome `f` produces.
    pub fn then_map<U, F2, F>(&self, f: F) -> Promise<U, F2>
    where
        U: 'static,
        F2: 'static,
        F: FnOnce(Outcome<T, E>) -> Outcome<U, F2> + 'static,
    {
        self.map_impl(self.executor(), self.executor(), f)
    }

    pub fn then_map_on<U, F2, F>(&self, exec: Option<ExecutorRef>, f: F) -> Promise<U, F2>
    where
        U: 'static,
        F2: 'static,
        F: FnOnce(Outcome<T, E>) -> Outcome<U, F2> + 'static,
    {
        let down_exec = exec.clone().or_else(|| self.executor());
        self.map_impl(exec, down_exec, f)
    }

    /// Asynchronous transform: `f` yields an inner promise the downstream
    /// mirrors. Cancelling the downstream cancels the inner promise.
    pub fn then_bind<U, F2, F>(&self, f: F) -> Promise<U, F2>
    where
        U: 'static,
        F2: 'static,
        F: FnOnce(Outcome<T, E>) -> Promise<U, F2> + 'static,
    {
        self.bind_impl(self.executor(), self.executor(), f)
    }

    pub fn then_bind_on<U, F2, F>(&self, exec: Option<ExecutorRef>, f: F) -> Promise<U, F2>
    where
        U: 'static,
        F2: 'static,
        F: FnOnce(Outcome<T, E>) -> Promise<U, F2> + 'static,
    {
        let down_exec = exec.clone().or_else(|| self.executor());
        self.bind_impl(exec, down_exec, f)
    }

    fn tap_impl<F>(&self, exec: Option<ExecutorRef>, f: F)
    where
        F: FnOnce(Outcome<T, E>) + 'static,
    {
        let guard = Rc::downgrade(&self.state);
        let cb = Callback::once(move |out: Outcome<T, E>| {
            // every handle died between delivery and this posted run
            if guard.upgrade().is_some() {
                f(out);
            }
        });
        state::attach(&self.state, cb, exec);
    }

    fn map_impl<U, F2, F>(
        &self,
        cont_exec: Option<ExecutorRef>,
        down_exec: Option<ExecutorRef>,
        f: F,
    ) -> Promise<U, F2>
    where
        U: 'static,
        F2: 'static,
        F: FnOnce(Outcome<T, E>) -> Outcome<U, F2> + 'static,
    {
        let down: Promise<U, F2> = Promise::from_state(Rc::new(PromiseState::new(down_exec)));
        state::link(&self.state, down.state());
        let guard = Rc::downgrade(&self.state);
        let down_weak = Rc::downgrade(down.state());
        let cb = Callback::once(move |out: Outcome<T, E>| {
            if guard.upgrade().is_none() {
                return;
            }
            let mapped = f(out);
            if let Some(next) = down_weak.upgrade() {
                state::settle(&next, mapped);
            }
        });
        state::attach(&self.state, cb, cont_exec);
        down
    }

    fn bind_impl<U, F2, F>(
        &self,
        cont_exec: Option<ExecutorRef>,
        down_exec: Option<ExecutorRef>,
        f: F,
    ) -> Promise<U, F2>
    where
        U: 'static,
        F2: 'static,
        F: FnOnce(Outcome<T, E>) -> Promise<U, F2> + 'static,
    {
        let down: Promise<U, F2> = Promise::from_state(Rc::new(PromiseState::new(down_exec)));
        state::link(&self.state, down.state());
        let guard = Rc::downgrade(&self.state);
        let down_weak = Rc::downgrade(down.state());
        let cb = Callback::once(move |out: Outcome<T, E>| {
            if guard.upgrade().is_none() {
                return;
            }
            let inner = f(out);
            let Some(next) = down_weak.upgrade() else {
                // downstream already gone: stop the inner work too
                inner.resolver().cancel();
                return;
            };
            if next.borrow().status() == Status::Cancelled {
                inner.resolver().cancel();
                return;
            }
            let inner_resolver = inner.resolver();
            state::set_on_cancel(&next, move || {
                inner_resolver.cancel();
            });
            // the inner promise becomes the downstream's upstream and feeds
            // it through an identity continuation
            state::link(inner.state(), &next);
            let inner_guard = Rc::downgrade(inner.state());
            let mirror_weak = Rc::downgrade(&next);
            let mirror = Callback::once(move |r: Outcome<U, F2>| {
                if inner_guard.upgrade().is_none() {
                    return;
                }
                if let Some(next) = mirror_weak.upgrade() {
                    state::settle(&next, r);
                }
            });
            state::attach(inner.state(), mirror, None);
        });
        state::attach(&self.state, cb, cont_exec);
        down
    }
}

/// Weak grip used by producers to settle a promise without extending its
/// lifetime. Once every handle has dropped the state, calls become no-ops.
pub struct Resolver<T, E> {
    state: Weak<StateCell<T, E>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Resolver {
            state: self.state.clone(),
        }
    }
}

impl<T: 'static, E: 'static> Resolver<T, E> {
    /// True iff the state was alive and still unsettled.
    pub fn resolve(&self, v: T) -> bool {
        match self.state.upgrade() {
            Some(cell) => state::settle(&cell, Outcome::Value(v)),
            None => false,
        }
    }

    pub fn reject(&self, e: E) -> bool {
        match self.state.upgrade() {
            Some(cell) => state::settle(&cell, Outcome::Error(e)),
            None => false,
        }
    }

    pub fn cancel(&self) -> bool {
        match self.state.upgrade() {
            Some(cell) => state::cancel(&cell),
            None => false,
        }
    }

    pub fn status(&self) -> Option<Status> {
        self.state.upgrade().map(|cell| cell.borrow().status())
    }
}
