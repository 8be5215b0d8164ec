use core::hint;

use spin::Mutex;

#[derive(Debug)]
struct State {
    /// Tokens available; negative when threads are queued or owed.
    count: isize,
    /// Threads blocked in `wait`.
    queued: usize,
    /// Signals addressed to queued threads, not yet picked up.
    wakeups: usize,
}

impl State {
    /// Whether a queued thread may proceed.
    ///
    /// While the count is negative, its magnitude is the number of waits not
    /// yet covered by a signal. Queued threads come last in that debt, so one
    /// of them is covered as soon as fewer waits than queued threads remain.
    fn has_turn(&self) -> bool {
        self.queued > 0 && (self.count >= 0 || self.count.unsigned_abs() < self.queued)
    }
}

/// Counting semaphore.
///
/// The initial count may be negative: waiters arriving while the count is
/// not positive queue until enough signals bring their turn.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<State>,
}

impl Semaphore {
    #[must_use]
    pub const fn new(count: isize) -> Self {
        Self {
            state: Mutex::new(State {
                count,
                queued: 0,
                wakeups: 0,
            }),
        }
    }

    /// Current counter value.
    #[must_use]
    pub fn count(&self) -> isize {
        self.state.lock().count
    }

    /// Number of threads currently blocked in [`wait`](Self::wait).
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().queued
    }

    /// Takes a token if one is available, without blocking.
    pub fn try_wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.count > 0 {
            state.count -= 1;
            return true;
        }
        false
    }

    /// Takes a token, spinning until a signal hands one over if none is
    /// available.
    pub fn wait(&self) {
        {
            let mut state = self.state.lock();
            state.count -= 1;
            if state.count >= 0 {
                return;
            }
            state.queued += 1;
        }

        loop {
            {
                let mut state = self.state.lock();
                if state.wakeups > 0 {
                    state.wakeups -= 1;
                    return;
                }
            }
            hint::spin_loop();
        }
    }

    /// Gives a token back.
    ///
    /// Wakes the oldest queued thread once the signals have paid off any debt
    /// from a negative initial count.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.count += 1;
        if state.has_turn() {
            state.queued -= 1;
            state.wakeups += 1;
        }
    }

    /// Consumes the semaphore at the end of its life.
    ///
    /// # Panics
    ///
    /// Panics if a thread is still queued on it.
    pub fn finalize(self) {
        let state = self.state.into_inner();
        assert!(
            state.queued == 0 && state.wakeups == 0,
            "semaphore finalized with queued threads"
        );
    }
}
