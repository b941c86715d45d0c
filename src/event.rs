use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use tracing::trace;

use crate::exec::Priority;

pub(crate) type SendTask = Box<dyn FnOnce() + Send>;

/// The part of a loop foreign threads may touch: the dispatch injector, the
/// task wake list, the stop flag, and the wake flag the loop sleeps on.
/// Everything else is loop-local.
///
/// The wake flag coalesces: producers set it and ring the condvar once, the
/// loop consumes it before going back to sleep, so a signal raised while the
/// loop was busy ticking is never lost.
pub(crate) struct Shared {
    injector: Mutex<VecDeque<(Priority, SendTask)>>,
    wakes: Mutex<Vec<usize>>,
    stop: AtomicBool,
    dead: AtomicBool,
    signalled: Mutex<bool>,
    bell: Condvar,
}

impl Shared {
    pub fn new() -> Shared {
        Shared {
            injector: Mutex::new(VecDeque::new()),
            wakes: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
            dead: AtomicBool::new(false),
            signalled: Mutex::new(false),
            bell: Condvar::new(),
        }
    }

    fn ring(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        if !*signalled {
            *signalled = true;
            self.bell.notify_one();
        }
    }

    /// Blocks until a producer rings or `deadline` (the next timer) passes.
    /// A ring that arrived while the loop was busy is consumed without
    /// blocking.
    pub fn sleep_until(&self, deadline: Option<Instant>) {
        let mut signalled = self.signalled.lock().unwrap();
        loop {
            if *signalled {
                *signalled = false;
                return;
            }
            match deadline {
                None => signalled = self.bell.wait(signalled).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        return;
                    }
                    let (guard, _timeout) =
                        self.bell.wait_timeout(signalled, deadline - now).unwrap();
                    signalled = guard;
                }
            }
        }
    }

    pub fn dispatch(&self, prio: Priority, task: SendTask) -> bool {
        if self.dead.load(Ordering::SeqCst) || self.stop.load(Ordering::SeqCst) {
            trace!("dispatch dropped: loop no longer accepting work");
            return false;
        }
        self.injector.lock().unwrap().push_back((prio, task));
        self.ring();
        true
    }

    pub fn wake_task(&self, key: usize) {
        if self.dead.load(Ordering::SeqCst) {
            return;
        }
        self.wakes.lock().unwrap().push(key);
        self.ring();
    }

    pub fn drain_injector(&self) -> VecDeque<(Priority, SendTask)> {
        std::mem::take(&mut *self.injector.lock().unwrap())
    }

    pub fn drain_wakes(&self) -> Vec<usize> {
        std::mem::take(&mut *self.wakes.lock().unwrap())
    }

    pub fn has_injected(&self) -> bool {
        !self.injector.lock().unwrap().is_empty() || !self.wakes.lock().unwrap().is_empty()
    }

    pub fn request_stop(&self) -> bool {
        if self.dead.load(Ordering::SeqCst) {
            return false;
        }
        self.stop.store(true, Ordering::SeqCst);
        self.ring();
        true
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::Shared;
    use crate::exec::Priority;

    #[test]
    fn ring_before_sleep_is_consumed_without_blocking() {
        let s = Shared::new();
        s.dispatch(Priority::Low, Box::new(|| {}));
        let start = Instant::now();
        s.sleep_until(None);
        assert!(start.elapsed() < Duration::from_millis(100));
        // the flag was consumed; a deadline sleep now actually waits
        let start = Instant::now();
        s.sleep_until(Some(Instant::now() + Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn past_deadline_returns_immediately() {
        let s = Shared::new();
        let start = Instant::now();
        s.sleep_until(Some(Instant::now() - Duration::from_millis(5)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn cross_thread_ring_wakes_the_sleeper() {
        let s = Arc::new(Shared::new());
        let s2 = s.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            s2.wake_task(0);
        });
        s.sleep_until(None);
        assert_eq!(s.drain_wakes(), vec![0]);
        t.join().unwrap();
    }

    #[test]
    fn dead_shared_refuses_work() {
        let s = Shared::new();
        assert!(s.dispatch(Priority::Low, Box::new(|| {})));
        s.mark_dead();
        assert!(!s.dispatch(Priority::Low, Box::new(|| {})));
        assert!(!s.request_stop());
    }
}
