use core::time::Duration;

use rxba_core::{AddbaRequest, AddbaResponse, AddbaStatus, Tid, WindowSize, MAX_WINDOW_SIZE};

/// Per-slot flush granularity. The flush timer for a session is armed for
/// `window_size * MIN_FLUSH_INTERVAL`.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Enough for every TID of one peer at the largest window.
pub const DEFAULT_SLOT_BUDGET: usize = 16 * MAX_WINDOW_SIZE as usize;

pub const DEFAULT_RX_WIN_SIZE: u16 = 32;

/// What a flush-timer expiry releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Everything up to the highest occupied slot, skipping holes.
    #[default]
    SkipHoles,
    /// Only the occupied run at the head of the window.
    ContiguousOnly,
}

/// Responder policy for incoming ADDBA requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaPolicy {
    pub ampdu_rx_enabled: bool,
    /// Window offered to originators; `0` declines every request.
    pub rx_win_size: u16,
    pub rx_amsdu: bool,
    /// Bit `n` set rejects TID `n`.
    pub reject_tids: u16,
}

impl Default for AddbaPolicy {
    fn default() -> Self {
        Self {
            ampdu_rx_enabled: true,
            rx_win_size: DEFAULT_RX_WIN_SIZE,
            rx_amsdu: true,
            reject_tids: 0,
        }
    }
}

impl AddbaPolicy {
    pub fn reject(mut self, tid: Tid) -> Self {
        self.reject_tids |= 1 << tid.value();
        self
    }

    pub fn rejects(&self, tid: Tid) -> bool {
        self.reject_tids & (1 << tid.value()) != 0
    }

    /// Builds the response to `req`. A nonzero requested buffer size caps the
    /// offered window.
    pub fn decide(&self, req: &AddbaRequest) -> AddbaResponse {
        let mut buffer_size = self.rx_win_size.min(MAX_WINDOW_SIZE);
        if req.buffer_size != 0 {
            buffer_size = buffer_size.min(req.buffer_size);
        }
        let accept = self.ampdu_rx_enabled
            && !self.rejects(req.tid)
            && WindowSize::new(buffer_size).is_ok();
        AddbaResponse {
            peer: req.peer,
            tid: req.tid,
            dialog_token: req.dialog_token,
            ssn: req.ssn,
            status: if accept { AddbaStatus::Accepted } else { AddbaStatus::Declined },
            buffer_size,
            amsdu_supported: accept && req.amsdu_supported && self.rx_amsdu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub min_flush_interval: Duration,
    pub flush_policy: FlushPolicy,
    /// Reorder slots shared by all sessions.
    pub slot_budget: usize,
    pub addba: AddbaPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_flush_interval: MIN_FLUSH_INTERVAL,
            flush_policy: FlushPolicy::default(),
            slot_budget: DEFAULT_SLOT_BUDGET,
            addba: AddbaPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn flush_delay(&self, window_size: WindowSize) -> Duration {
        self.min_flush_interval * window_size.get() as u32
    }
}
