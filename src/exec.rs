use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use stable_vec::StableVec;
use tracing::debug;

use crate::callback::Callback;
use crate::event::Shared;
use crate::task::TaskSlot;
use crate::timer::{self, TimerHandle, Timers};

/// Queue bands processed High to Low each tick, FIFO within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// Same-thread enqueue capability. Promise continuations run wherever their
/// state's executor points; a loop hands out its own executor via
/// [`EventLoop::executor`].
pub trait Executor {
    fn post(&self, cb: Callback, prio: Priority);
}

/// An executor pinned to the band its work is posted into. This is what a
/// promise state actually holds: continuation delivery goes through it, so
/// the band chosen at `with_executor` / `then_*_on` time is the band the
/// continuation runs in.
#[derive(Clone)]
pub struct ExecutorRef {
    exec: Rc<dyn Executor>,
    prio: Priority,
}

impl ExecutorRef {
    pub fn new(exec: Rc<dyn Executor>, prio: Priority) -> ExecutorRef {
        ExecutorRef { exec, prio }
    }

    pub fn prio(&self) -> Priority {
        self.prio
    }

    pub(crate) fn post(&self, cb: Callback) {
        self.exec.post(cb, self.prio);
    }
}

impl From<Rc<dyn Executor>> for ExecutorRef {
    /// A bare executor lands in `Low`, the same band a bare post gets.
    fn from(exec: Rc<dyn Executor>) -> ExecutorRef {
        ExecutorRef::new(exec, Priority::Low)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Init,
    Running,
    Stopping,
    Stopped,
}

thread_local! {
    static CURRENT: RefCell<Option<Weak<Inner>>> = const { RefCell::new(None) };
}

pub(crate) struct Inner {
    bands: [RefCell<VecDeque<Callback>>; 3],
    pub(crate) shared: Arc<Shared>,
    pub(crate) timers: RefCell<Timers>,
    pub(crate) tasks: RefCell<StableVec<TaskSlot>>,
    status: Cell<LoopStatus>,
}

impl Executor for Inner {
    fn post(&self, cb: Callback, prio: Priority) {
        self.bands[prio.index()].borrow_mut().push_back(cb);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shared.mark_dead();
    }
}

impl Inner {
    fn tick(self: &Rc<Self>) {
        for (prio, f) in self.shared.drain_injector() {
            self.post(Callback::once(move |()| f()), prio);
        }
        timer::fire_due(self);
        for key in self.shared.drain_wakes() {
            crate::task::poll_task(self, key);
        }
        for band in &self.bands {
            let drained = std::mem::take(&mut *band.borrow_mut());
            for cb in drained {
                cb.call(());
            }
        }
    }

    fn has_ready_work(&self) -> bool {
        self.bands.iter().any(|b| !b.borrow().is_empty()) || self.shared.has_injected()
    }
}

/// Single-threaded cooperative loop: three FIFO priority bands, timers, and
/// the frames of promise-returning tasks. Bound to its creating thread; the
/// handle is `Clone` and stays on that thread. Foreign threads talk to it
/// through a [`Remote`] only.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<Inner>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates the loop and binds it as the current loop of this thread.
    pub fn new() -> EventLoop {
        let inner = Rc::new(Inner {
            bands: [
                RefCell::new(VecDeque::new()),
                RefCell::new(VecDeque::new()),
                RefCell::new(VecDeque::new()),
            ],
            shared: Arc::new(Shared::new()),
            timers: RefCell::new(Timers::new()),
            tasks: RefCell::new(StableVec::new()),
            status: Cell::new(LoopStatus::Init),
        });
        CURRENT.with(|c| *c.borrow_mut() = Some(Rc::downgrade(&inner)));
        EventLoop { inner }
    }

    /// The loop bound to the current thread, if one is still alive.
    pub fn current() -> Option<EventLoop> {
        CURRENT
            .with(|c| c.borrow().as_ref().and_then(Weak::upgrade))
            .map(|inner| EventLoop { inner })
    }

    pub(crate) fn inner(&self) -> &Rc<Inner> {
        &self.inner
    }

    pub fn executor(&self) -> Rc<dyn Executor> {
        self.inner.clone()
    }

    /// This loop's executor pinned to `prio`; promises built on it deliver
    /// their continuations in that band.
    pub fn executor_at(&self, prio: Priority) -> ExecutorRef {
        ExecutorRef::new(self.inner.clone(), prio)
    }

    /// Thread-safe handle for foreign threads.
    pub fn remote(&self) -> Remote {
        Remote {
            shared: self.inner.shared.clone(),
        }
    }

    pub fn status(&self) -> LoopStatus {
        self.inner.status.get()
    }

    pub fn post<F>(&self, prio: Priority, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.post(Callback::once(move |()| f()), prio);
    }

    pub fn run_after<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        timer::add(&self.inner, delay, None, Callback::once(move |()| f()))
    }

    pub fn run_every<F>(&self, period: Duration, mut f: F) -> TimerHandle
    where
        F: FnMut() + 'static,
    {
        timer::add(&self.inner, period, Some(period), Callback::reusable(move |()| f()))
    }

    /// Runs until [`Remote::stop`] (or [`EventLoop::stop`]) is called,
    /// parking when idle.
    pub fn run(&self) {
        self.inner.status.set(LoopStatus::Running);
        debug!("event loop running");
        loop {
            self.inner.tick();
            if self.inner.shared.stop_requested() {
                break;
            }
            if self.inner.has_ready_work() {
                continue;
            }
            self.inner.shared.sleep_until(timer::next_deadline(&self.inner));
        }
        self.inner.status.set(LoopStatus::Stopping);
        self.inner.tick();
        self.inner.status.set(LoopStatus::Stopped);
        debug!("event loop stopped");
    }

    /// Runs until no queued work remains and no timer is armed. Suspended
    /// tasks waiting on promises nobody will settle do not count as work.
    pub fn run_until_idle(&self) {
        let prev = self.inner.status.get();
        self.inner.status.set(LoopStatus::Running);
        loop {
            self.inner.tick();
            if self.inner.shared.stop_requested() {
                break;
            }
            if self.inner.has_ready_work() {
                continue;
            }
            match timer::next_deadline(&self.inner) {
                Some(deadline) => self.inner.shared.sleep_until(Some(deadline)),
                None => break,
            }
        }
        self.inner.status.set(prev);
    }

    pub fn stop(&self) {
        self.inner.shared.request_stop();
    }
}

/// `Send + Sync` face of a loop. Dispatch is the sole cross-thread entry
/// point into the loop thread; everything dispatched runs there.
#[derive(Clone)]
pub struct Remote {
    shared: Arc<Shared>,
}

impl Remote {
    /// Enqueues `f` from any thread. Returns false once the loop has stopped
    /// or died; the closure is dropped in that case.
    pub fn dispatch<F>(&self, prio: Priority, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.dispatch(prio, Box::new(f))
    }

    pub fn stop(&self) -> bool {
        self.shared.request_stop()
    }
}
