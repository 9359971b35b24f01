use crate::session::Admission;
use crate::{Bypass, RxVerdict};
use rxba_core::RxbaError;

/// Engine-wide counters. A snapshot is returned by `ReorderEngine::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxReorderStats {
    /// Payloads handed to the dispatcher, from any path.
    pub delivered: u64,
    pub forwarded_no_session: u64,
    pub forwarded_amsdu: u64,
    pub forwarded_warmup: u64,
    pub buffered: u64,
    pub released: u64,
    pub dropped_duplicate: u64,
    pub dropped_out_of_window: u64,
    /// BARs for which no session exists.
    pub dropped_no_session: u64,
    pub window_advances: u64,
    pub realignments: u64,
    pub timer_flushes: u64,
    pub fw_dropped: u64,
    pub sessions_created: u64,
    pub sessions_reset: u64,
    pub sessions_torn_down: u64,
    pub allocation_failures: u64,
    pub malformed_events: u64,
}

impl RxReorderStats {
    pub(crate) fn record_verdict(&mut self, verdict: RxVerdict) {
        match verdict {
            RxVerdict::Forwarded(Bypass::NoSession) => self.forwarded_no_session += 1,
            RxVerdict::Forwarded(Bypass::AmsduNotAllowed) => self.forwarded_amsdu += 1,
            RxVerdict::Forwarded(Bypass::WarmUp) => self.forwarded_warmup += 1,
            RxVerdict::Buffered => self.buffered += 1,
            RxVerdict::Released => self.released += 1,
            RxVerdict::Dropped(RxbaError::Duplicate) => self.dropped_duplicate += 1,
            RxVerdict::Dropped(RxbaError::UnknownSession) => self.dropped_no_session += 1,
            RxVerdict::Dropped(_) => self.dropped_out_of_window += 1,
        }
    }

    pub(crate) fn record<P>(&mut self, admission: &Admission<P>) {
        self.record_verdict(admission.verdict);
        if admission.window_advanced {
            self.window_advances += 1;
        }
        if admission.realigned {
            self.realignments += 1;
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_duplicate + self.dropped_out_of_window + self.dropped_no_session
    }
}
