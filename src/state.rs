use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::callback::Callback;
use crate::exec::ExecutorRef;
use crate::result::Outcome;

/// Observable lifecycle of a promise state. Transitions are monotonic:
/// `Init -> PreResolved -> Resolved` or `Init -> PreRejected -> Rejected`,
/// with `Cancelled` reachable from `Init` and either `Pre*` state only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Init,
    PreResolved,
    Resolved,
    PreRejected,
    Rejected,
    Cancelled,
}

pub(crate) type StateCell<T, E> = RefCell<PromiseState<T, E>>;

/// Type-erased chain edge. `next` edges are weak and consulted only for
/// cancellation; `prev` edges are strong so a leaf handle keeps its whole
/// upstream chain alive.
pub(crate) trait ChainLink {
    fn cancel_link(&self) -> bool;
    fn clear_next(&self);
}

pub(crate) struct PromiseState<T, E> {
    status: Status,
    storage: Option<Outcome<T, E>>,
    callback: Option<Callback<Outcome<T, E>>>,
    exec: Option<ExecutorRef>,
    next: Option<Weak<dyn ChainLink>>,
    prev: Option<Rc<dyn ChainLink>>,
    on_cancel: Option<Box<dyn FnOnce()>>,
}

impl<T, E> PromiseState<T, E> {
    pub(crate) fn new(exec: Option<ExecutorRef>) -> StateCell<T, E> {
        RefCell::new(PromiseState {
            status: Status::Init,
            storage: None,
            callback: None,
            exec,
            next: None,
            prev: None,
            on_cancel: None,
        })
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn executor(&self) -> Option<ExecutorRef> {
        self.exec.clone()
    }
}

impl<T, E> Drop for PromiseState<T, E> {
    fn drop(&mut self) {
        // drop the strong back edge first so the upstream releases tail-first
        if let Some(prev) = self.prev.take() {
            prev.clear_next();
        }
    }
}

impl<T: 'static, E: 'static> ChainLink for StateCell<T, E> {
    fn cancel_link(&self) -> bool {
        cancel(self)
    }

    fn clear_next(&self) {
        self.borrow_mut().next = None;
    }
}

/// Settles the state: `Init -> Pre*`, stores the outcome, then runs
/// delivery. Returns false from any other status (no double settle).
pub(crate) fn settle<T: 'static, E: 'static>(cell: &StateCell<T, E>, out: Outcome<T, E>) -> bool {
    {
        let mut st = cell.borrow_mut();
        if st.status != Status::Init {
            return false;
        }
        st.status = if out.is_error() {
            Status::PreRejected
        } else {
            Status::PreResolved
        };
        st.storage = Some(out);
    }
    try_deliver(cell);
    true
}

/// Installs the at-most-one continuation and the executor it is delivered
/// on. On a `Pre*` state delivery runs immediately. Attaching to a delivered
/// or cancelled state drops the callback: a callback may only ever be held
/// by a state that can still fire it.
pub(crate) fn attach<T: 'static, E: 'static>(
    cell: &StateCell<T, E>,
    cb: Callback<Outcome<T, E>>,
    exec: Option<ExecutorRef>,
) {
    let replaced = {
        let mut st = cell.borrow_mut();
        match st.status {
            Status::Resolved | Status::Rejected | Status::Cancelled => return,
            _ => {}
        }
        st.exec = exec;
        st.callback.replace(cb)
    };
    drop(replaced);
    try_deliver(cell);
}

/// Delivery sub-protocol: once both a callback and a buffered outcome are
/// present, move them out, transition `Pre* -> *`, and run the callback on
/// the state's executor, in the band it carries (or inline when there is
/// none).
fn try_deliver<T: 'static, E: 'static>(cell: &StateCell<T, E>) {
    let (cb, out, exec) = {
        let mut st = cell.borrow_mut();
        match st.status {
            Status::PreResolved | Status::PreRejected => {}
            _ => return,
        }
        if st.callback.is_none() {
            return;
        }
        let Some(out) = st.storage.take() else {
            return;
        };
        let Some(cb) = st.callback.take() else {
            return;
        };
        st.status = if st.status == Status::PreResolved {
            Status::Resolved
        } else {
            Status::Rejected
        };
        (cb, out, st.exec.clone())
    };
    match exec {
        Some(exec) => exec.post(Callback::once(move |()| cb.call(out))),
        None => cb.call(out),
    }
}

/// Cancels the state and propagates forward through the weak `next` edge.
/// The pending callback never fires; the `on_cancel` hook (coroutine frame,
/// inner promise of a bind) runs exactly once, from here only.
pub(crate) fn cancel<T: 'static, E: 'static>(cell: &StateCell<T, E>) -> bool {
    let (hook, cb, storage, next) = {
        let mut st = cell.borrow_mut();
        match st.status {
            Status::Init | Status::PreResolved | Status::PreRejected => {}
            _ => return false,
        }
        st.status = Status::Cancelled;
        (
            st.on_cancel.take(),
            st.callback.take(),
            st.storage.take(),
            st.next.take(),
        )
    };
    trace!("promise state cancelled");
    drop(cb);
    drop(storage);
    if let Some(hook) = hook {
        hook();
    }
    if let Some(next) = next.and_then(|w| w.upgrade()) {
        next.cancel_link();
    }
    true
}

/// Links `up -> down`: the downstream owns the upstream, the upstream holds
/// a weak forward edge for cancellation.
pub(crate) fn link<T, E, U, F2>(up: &Rc<StateCell<T, E>>, down: &Rc<StateCell<U, F2>>)
where
    T: 'static,
    E: 'static,
    U: 'static,
    F2: 'static,
{
    let old_prev = {
        let mut d = down.borrow_mut();
        std::mem::replace(&mut d.prev, Some(up.clone() as Rc<dyn ChainLink>))
    };
    drop(old_prev);
    let weak: Weak<dyn ChainLink> = Rc::downgrade(&(down.clone() as Rc<dyn ChainLink>));
    up.borrow_mut().next = Some(weak);
}

pub(crate) fn set_on_cancel<T, E>(cell: &StateCell<T, E>, hook: impl FnOnce() + 'static) {
    cell.borrow_mut().on_cancel = Some(Box::new(hook));
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{attach, cancel, link, settle, PromiseState, Status};
    use crate::callback::Callback;
    use crate::result::Outcome;

    type Cell32 = super::StateCell<i32, String>;

    fn new_state() -> Rc<Cell32> {
        Rc::new(PromiseState::new(None))
    }

    #[test]
    fn settles_at_most_once() {
        let s = new_state();
        assert!(settle(&s, Outcome::Value(1)));
        assert!(!settle(&s, Outcome::Value(2)));
        assert!(!settle(&s, Outcome::Error("late".into())));
        assert_eq!(s.borrow().status(), Status::PreResolved);
    }

    #[test]
    fn buffered_outcome_delivered_on_attach() {
        let s = new_state();
        settle(&s, Outcome::Value(9));
        assert_eq!(s.borrow().status(), Status::PreResolved);

        let got = Rc::new(Cell::new(0));
        let g = got.clone();
        attach(&s, Callback::once(move |r: Outcome<i32, String>| g.set(r.value())), None);
        assert_eq!(got.get(), 9);
        assert_eq!(s.borrow().status(), Status::Resolved);
        assert!(!s.borrow().has_handler());
    }

    #[test]
    fn attach_then_settle_delivers_inline() {
        let s = new_state();
        let got = Rc::new(Cell::new(0));
        let g = got.clone();
        attach(&s, Callback::once(move |r: Outcome<i32, String>| g.set(r.value())), None);
        assert_eq!(got.get(), 0);
        settle(&s, Outcome::Value(4));
        assert_eq!(got.get(), 4);
        assert_eq!(s.borrow().status(), Status::Resolved);
    }

    #[test]
    fn cancel_drops_callback_and_storage() {
        let s = new_state();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        attach(&s, Callback::once(move |_| f.set(true)), None);
        assert!(cancel(&s));
        assert_eq!(s.borrow().status(), Status::Cancelled);
        assert!(!fired.get());
        // settling a cancelled state is refused
        assert!(!settle(&s, Outcome::Value(1)));
        assert!(!cancel(&s));
    }

    #[test]
    fn cancel_runs_before_delivery_wins() {
        let s = new_state();
        settle(&s, Outcome::Value(3));
        // still undelivered, so cancellation is allowed
        assert!(cancel(&s));
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        attach(&s, Callback::once(move |_| f.set(true)), None);
        assert!(!fired.get());
    }

    #[test]
    fn cancel_propagates_forward_only() {
        let a = new_state();
        let b: Rc<super::StateCell<i32, String>> = Rc::new(PromiseState::new(None));
        link(&a, &b);
        assert!(cancel(&a));
        assert_eq!(b.borrow().status(), Status::Cancelled);

        let c = new_state();
        let d: Rc<Cell32> = Rc::new(PromiseState::new(None));
        link(&c, &d);
        assert!(cancel(&d));
        // downstream cancellation leaves the upstream free to settle
        assert_eq!(c.borrow().status(), Status::Init);
        assert!(settle(&c, Outcome::Value(1)));
    }

    #[test]
    fn on_cancel_hook_runs_once_and_only_from_cancel() {
        let s = new_state();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        super::set_on_cancel(&s, move || r.set(r.get() + 1));
        assert!(cancel(&s));
        assert!(!cancel(&s));
        assert_eq!(runs.get(), 1);

        let s2 = new_state();
        let runs2 = Rc::new(Cell::new(0));
        let r2 = runs2.clone();
        super::set_on_cancel(&s2, move || r2.set(r2.get() + 1));
        settle(&s2, Outcome::Value(5));
        attach(&s2, Callback::once(|_| {}), None);
        drop(s2);
        // settle and drop never run the hook
        assert_eq!(runs2.get(), 0);
    }

    #[test]
    fn dropping_the_leaf_releases_the_chain() {
        let a = new_state();
        let b: Rc<Cell32> = Rc::new(PromiseState::new(None));
        link(&a, &b);
        let weak_a = Rc::downgrade(&a);
        drop(a);
        // still alive: b owns its upstream
        assert!(weak_a.upgrade().is_some());
        drop(b);
        assert!(weak_a.upgrade().is_none());
    }
}
