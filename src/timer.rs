use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::callback::Callback;
use crate::exec::Inner;

pub(crate) struct Timers {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    slots: HashMap<u64, TimerSlot>,
    next_id: u64,
}

struct TimerSlot {
    cb: Callback,
    period: Option<Duration>,
    shared: Rc<TimerShared>,
}

struct TimerShared {
    cancelled: Cell<bool>,
    fired: Cell<bool>,
}

impl Timers {
    pub fn new() -> Timers {
        Timers {
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
            next_id: 0,
        }
    }
}

/// Owning watcher handle; dropping it cancels the timer.
pub struct TimerHandle {
    shared: Rc<TimerShared>,
    inner: Weak<Inner>,
    id: u64,
}

impl TimerHandle {
    pub fn cancel(&self) {
        if self.shared.cancelled.replace(true) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.timers.borrow_mut().slots.remove(&self.id);
        }
    }

    pub fn cancelled(&self) -> bool {
        self.shared.cancelled.get()
    }

    /// True once the callback has run at least once.
    pub fn fired(&self) -> bool {
        self.shared.fired.get()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub(crate) fn add(
    inner: &Rc<Inner>,
    delay: Duration,
    period: Option<Duration>,
    cb: Callback,
) -> TimerHandle {
    let shared = Rc::new(TimerShared {
        cancelled: Cell::new(false),
        fired: Cell::new(false),
    });
    let mut timers = inner.timers.borrow_mut();
    let id = timers.next_id;
    timers.next_id += 1;
    timers.slots.insert(
        id,
        TimerSlot {
            cb,
            period,
            shared: shared.clone(),
        },
    );
    timers.heap.push(Reverse((Instant::now() + delay, id)));
    TimerHandle {
        shared,
        inner: Rc::downgrade(inner),
        id,
    }
}

/// Earliest armed deadline, skipping entries whose timer was cancelled.
pub(crate) fn next_deadline(inner: &Rc<Inner>) -> Option<Instant> {
    let mut timers = inner.timers.borrow_mut();
    loop {
        let Reverse((when, id)) = *timers.heap.peek()?;
        if timers.slots.contains_key(&id) {
            return Some(when);
        }
        timers.heap.pop();
    }
}

pub(crate) fn fire_due(inner: &Rc<Inner>) {
    loop {
        let (id, mut slot) = {
            let mut timers = inner.timers.borrow_mut();
            match timers.heap.peek() {
                Some(&Reverse((when, _))) if when <= Instant::now() => {
                    let Reverse((_, id)) = timers.heap.pop().unwrap();
                    match timers.slots.remove(&id) {
                        Some(slot) => (id, slot),
                        // cancelled after this heap entry was pushed
                        None => continue,
                    }
                }
                _ => return,
            }
        };
        if slot.shared.cancelled.get() {
            continue;
        }
        slot.shared.fired.set(true);
        slot.cb.invoke(());
        if let Some(period) = slot.period {
            if !slot.shared.cancelled.get() {
                let mut timers = inner.timers.borrow_mut();
                timers.heap.push(Reverse((Instant::now() + period, id)));
                timers.slots.insert(id, slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use crate::exec::EventLoop;

    #[test]
    fn run_after_fires_once_after_the_delay() {
        let ev = EventLoop::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let start = Instant::now();
        let timer = ev.run_after(Duration::from_millis(25), move || h.set(h.get() + 1));
        assert!(!timer.fired());
        ev.run_until_idle();
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert_eq!(hits.get(), 1);
        assert!(timer.fired());
        assert!(!timer.cancelled());
    }

    #[test]
    fn dropping_the_handle_cancels() {
        let ev = EventLoop::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let timer = ev.run_after(Duration::from_millis(10), move || h.set(h.get() + 1));
        drop(timer);
        ev.run_until_idle();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn run_every_repeats_until_cancelled() {
        let ev = EventLoop::new();
        let hits = Rc::new(Cell::new(0));
        let handle: Rc<std::cell::RefCell<Option<crate::timer::TimerHandle>>> =
            Rc::new(std::cell::RefCell::new(None));
        let h = hits.clone();
        let ha = handle.clone();
        let timer = ev.run_every(Duration::from_millis(5), move || {
            h.set(h.get() + 1);
            if h.get() == 3 {
                if let Some(t) = ha.borrow().as_ref() {
                    t.cancel();
                }
            }
        });
        *handle.borrow_mut() = Some(timer);
        ev.run_until_idle();
        assert_eq!(hits.get(), 3);
        assert!(handle.borrow().as_ref().unwrap().cancelled());
        assert!(handle.borrow().as_ref().unwrap().fired());
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let ev = EventLoop::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let _late = ev.run_after(Duration::from_millis(40), move || o1.borrow_mut().push("late"));
        let _soon = ev.run_after(Duration::from_millis(10), move || o2.borrow_mut().push("soon"));
        ev.run_until_idle();
        assert_eq!(*order.borrow(), vec!["soon", "late"]);
    }
}
