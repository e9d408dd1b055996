//! One-shot delayed tasks, on a virtual clock or on real threads.

use log::debug;
use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

pub type Task = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

pub trait Scheduler {
    fn schedule(&mut self, delay_ms: u64, task: Task) -> TimerToken;
    /// Cancelling an already fired or unknown token is a no-op.
    fn cancel(&mut self, token: TimerToken);
    fn now_ms(&self) -> u64;
}

struct Pending {
    due_ms: u64,
    token: TimerToken,
    task: Task,
}

#[derive(Default)]
struct ClockState {
    now_ms: u64,
    next_token: u64,
    pending: Vec<Pending>,
}

/// Deterministic clock: time only moves on [`ManualClock::advance`].
/// Clones share the same timeline.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Rc<RefCell<ClockState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward, running due tasks in deadline order. Each task sees
    /// `now_ms()` equal to its own deadline. Returns the number of tasks run.
    pub fn advance(&self, ms: u64) -> usize {
        let target = self.inner.borrow().now_ms + ms;
        let mut fired = 0;
        loop {
            let next = {
                let mut st = self.inner.borrow_mut();
                // ties resolve in scheduling order: tokens are monotonic
                let idx = st
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due_ms <= target)
                    .min_by_key(|(_, p)| (p.due_ms, p.token.0))
                    .map(|(i, _)| i);
                idx.map(|i| {
                    let p = st.pending.remove(i);
                    st.now_ms = st.now_ms.max(p.due_ms);
                    p
                })
            };
            match next {
                Some(p) => {
                    (p.task)();
                    fired += 1;
                }
                None => break,
            }
        }
        self.inner.borrow_mut().now_ms = target;
        fired
    }

    /// Advance to an absolute time. A target in the past only runs what is
    /// already due.
    pub fn advance_to(&self, at_ms: u64) -> usize {
        let now = self.inner.borrow().now_ms;
        self.advance(at_ms.saturating_sub(now))
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Deadline of the earliest outstanding task.
    pub fn next_due(&self) -> Option<u64> {
        self.inner.borrow().pending.iter().map(|p| p.due_ms).min()
    }
}

impl Scheduler for ManualClock {
    fn schedule(&mut self, delay_ms: u64, task: Task) -> TimerToken {
        let mut st = self.inner.borrow_mut();
        st.next_token += 1;
        let token = TimerToken(st.next_token);
        let due_ms = st.now_ms + delay_ms;
        st.pending.push(Pending {
            due_ms,
            token,
            task,
        });
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        self.inner.borrow_mut().pending.retain(|p| p.token != token);
    }

    fn now_ms(&self) -> u64 {
        self.inner.borrow().now_ms
    }
}

/// Real-time scheduler: every task sleeps on its own thread and is skipped
/// if cancelled before waking.
pub struct ThreadScheduler {
    start: Instant,
    next_token: u64,
    flags: HashMap<TimerToken, Arc<AtomicBool>>,
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            next_token: 0,
            flags: HashMap::new(),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&mut self, delay_ms: u64, task: Task) -> TimerToken {
        // forget flags of timers that already woke up
        self.flags.retain(|_, f| Arc::strong_count(f) > 1);

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            if !flag.load(Ordering::Acquire) {
                task();
            }
        });
        self.flags.insert(token, cancelled);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(flag) = self.flags.remove(&token) {
            flag.store(true, Ordering::Release);
            debug!("timer {:?} cancelled", token);
        }
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn send_task(tx: &mpsc::Sender<&'static str>, label: &'static str) -> Task {
        let tx = tx.clone();
        Box::new(move || {
            let _ = tx.send(label);
        })
    }

    #[test]
    fn manual_clock_fires_in_deadline_order() {
        let mut clock = ManualClock::new();
        let (tx, rx) = mpsc::channel();
        clock.schedule(200, send_task(&tx, "late"));
        clock.schedule(50, send_task(&tx, "early"));
        clock.schedule(50, send_task(&tx, "early-2"));

        assert_eq!(clock.advance(49), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(clock.advance(1), 2);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["early", "early-2"]);
        assert_eq!(clock.advance(500), 1);
        assert_eq!(rx.try_recv(), Ok("late"));
        assert_eq!(clock.now_ms(), 550);
    }

    #[test]
    fn manual_clock_cancel_prevents_firing() {
        let mut clock = ManualClock::new();
        let (tx, rx) = mpsc::channel();
        let t = clock.schedule(10, send_task(&tx, "x"));
        clock.cancel(t);
        clock.cancel(t);
        assert_eq!(clock.advance(100), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn advance_to_ignores_past_targets() {
        let clock = ManualClock::new();
        clock.advance(300);
        assert_eq!(clock.advance_to(100), 0);
        assert_eq!(clock.now_ms(), 300);
        clock.advance_to(450);
        assert_eq!(clock.now_ms(), 450);
    }

    #[test]
    fn thread_scheduler_runs_and_cancels() {
        let mut sched = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        let cancelled = sched.schedule(20, send_task(&tx, "cancelled"));
        sched.schedule(1, send_task(&tx, "kept"));
        sched.cancel(cancelled);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("kept"));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
