use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use rxba_hal::{TimerCallback, TimerHandle, TimerService};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Wheel<T: Ord + Copy> {
    next_id: u64,
    pending: BTreeMap<(T, u64), TimerCallback>,
}

impl<T: Ord + Copy> Wheel<T> {
    fn new() -> Self {
        Self { next_id: 0, pending: BTreeMap::new() }
    }

    fn insert(&mut self, deadline: T, on_fire: TimerCallback) -> TimerHandle {
        self.next_id += 1;
        self.pending.insert((deadline, self.next_id), on_fire);
        TimerHandle(self.next_id)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|&(_, id), _| id != handle.0);
    }

    fn earliest(&self) -> Option<T> {
        self.pending.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Removes the earliest entry if it is due at `now`.
    fn pop_due(&mut self, now: T) -> Option<(T, TimerCallback)> {
        let key = *self.pending.keys().next()?;
        if key.0 > now {
            return None;
        }
        self.pending.remove(&key).map(|cb| (key.0, cb))
    }
}

struct Shared {
    wheel: Mutex<(Wheel<Instant>, bool)>,
    wake: Condvar,
}

/// Wall-clock timer service backed by one worker thread.
///
/// Callbacks run on the worker, in deadline order, with no internal lock
/// held. Dropping the service discards whatever is still pending.
pub struct ThreadTimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn spawn(name: &str) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared {
            wheel: Mutex::new((Wheel::new(), false)),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_shared))
            .with_context(|| format!("spawning timer thread {name}"))?;
        Ok(Self { shared, worker: Some(worker) })
    }

    pub fn pending(&self) -> usize {
        lock(&self.shared.wheel).0.pending.len()
    }
}

fn run_worker(shared: &Shared) {
    let mut guard = lock(&shared.wheel);
    loop {
        if guard.1 {
            return;
        }
        let now = Instant::now();
        let due = guard.0.pop_due(now);
        if let Some((_, on_fire)) = due {
            drop(guard);
            on_fire();
            guard = lock(&shared.wheel);
            continue;
        }
        let earliest = guard.0.earliest();
        guard = match earliest {
            Some(deadline) => {
                shared
                    .wake
                    .wait_timeout(guard, deadline.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared.wake.wait(guard).unwrap_or_else(PoisonError::into_inner),
        };
    }
}

impl TimerService for ThreadTimer {
    fn schedule(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        let handle = lock(&self.shared.wheel).0.insert(Instant::now() + delay, on_fire);
        self.shared.wake.notify_one();
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.shared.wheel).0.cancel(handle);
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        lock(&self.shared.wheel).1 = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            // The last owner may be a callback running on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

/// Virtual-time timer service. Nothing fires until the owner calls
/// [`ManualTimer::advance`].
pub struct ManualTimer {
    state: Mutex<(Wheel<Duration>, Duration)>,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new((Wheel::new(), Duration::ZERO)) })
    }

    pub fn now(&self) -> Duration {
        lock(&self.state).1
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).0.pending.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        lock(&self.state).0.earliest()
    }

    /// Moves virtual time forward by `by`, firing every timer that comes due
    /// on the way, in deadline order. Callbacks may schedule further timers;
    /// those fire too if due before the target. Returns the number fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = lock(&self.state).1 + by;
        let mut fired = 0;
        loop {
            let due = {
                let mut state = lock(&self.state);
                let popped = state.0.pop_due(target);
                match popped {
                    Some((deadline, on_fire)) => {
                        state.1 = state.1.max(deadline);
                        on_fire
                    }
                    None => {
                        state.1 = target;
                        return fired;
                    }
                }
            };
            due();
            fired += 1;
        }
    }

    /// Advances to the earliest pending deadline and fires what is due there.
    pub fn fire_next(&self) -> usize {
        match self.next_deadline() {
            Some(deadline) => self.advance(deadline.saturating_sub(self.now())),
            None => 0,
        }
    }
}

impl TimerService for ManualTimer {
    fn schedule(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        let mut state = lock(&self.state);
        let deadline = state.1 + delay;
        state.0.insert(deadline, on_fire)
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.state).0.cancel(handle);
    }
}
