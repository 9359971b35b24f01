use core::time::Duration;

use rxba_hal::{TimerCallback, TimerHandle, TimerService};

/// Flush timer state of one session.
///
/// Every arming carries an epoch. An expiry whose epoch no longer matches
/// (the timer was restarted or stopped after the callback was queued) is
/// stale and ignored.
#[derive(Debug, Default)]
pub struct FlushTimer {
    handle: Option<TimerHandle>,
    epoch: u64,
}

impl FlushTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.handle.is_some()
    }

    pub fn restart(
        &mut self,
        timers: &dyn TimerService,
        delay: Duration,
        epoch: u64,
        on_fire: TimerCallback,
    ) {
        self.stop(timers);
        self.epoch = epoch;
        self.handle = Some(timers.schedule(delay, on_fire));
    }

    pub fn stop(&mut self, timers: &dyn TimerService) {
        if let Some(handle) = self.handle.take() {
            timers.cancel(handle);
        }
    }

    /// Marks the timer unset if `epoch` is the live arming.
    pub fn expire(&mut self, epoch: u64) -> bool {
        if self.handle.is_some() && self.epoch == epoch {
            self.handle = None;
            true
        } else {
            false
        }
    }
}
