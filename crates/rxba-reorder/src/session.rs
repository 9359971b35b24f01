use alloc::vec::Vec;

use log::debug;
use rxba_core::{FrameKind, MacAddr, RxbaError, RxbaResult, SeqNum, Tid, WindowSize};
use rxba_mem::SlotReservation;

use crate::buffer::{ReorderBuffer, RxSlot};
use crate::config::FlushPolicy;
use crate::timer::FlushTimer;
use crate::{Bypass, RxVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaStatus {
    /// Created, handshake not yet confirmed. Frames are still reordered.
    SettingUp,
    Established,
}

/// Result of pushing one frame through a session.
pub(crate) struct Admission<P> {
    pub verdict: RxVerdict,
    pub deliver: Vec<P>,
    pub arm_timer: bool,
    pub window_advanced: bool,
    pub realigned: bool,
}

impl<P> Admission<P> {
    fn new(verdict: RxVerdict, deliver: Vec<P>) -> Self {
        Self { verdict, deliver, arm_timer: false, window_advanced: false, realigned: false }
    }

    fn bypass(reason: Bypass, payload: Option<P>) -> Self {
        Self::new(RxVerdict::Forwarded(reason), payload.into_iter().collect())
    }
}

pub struct ReorderSession<P> {
    peer: MacAddr,
    tid: Tid,
    pub(crate) buffer: ReorderBuffer<P>,
    last_seq: Option<SeqNum>,
    pkt_count: u16,
    check_start_win: bool,
    force_no_drop: bool,
    amsdu_allowed: bool,
    status: BaStatus,
    pub(crate) timer: FlushTimer,
    _slots: SlotReservation,
}

impl<P> ReorderSession<P> {
    pub(crate) fn new(
        peer: MacAddr,
        tid: Tid,
        window_size: WindowSize,
        starting_seq: SeqNum,
        last_seq: Option<SeqNum>,
        slots: SlotReservation,
    ) -> RxbaResult<Self> {
        Ok(Self {
            peer,
            tid,
            buffer: ReorderBuffer::new(window_size, starting_seq)?,
            last_seq,
            pkt_count: 0,
            check_start_win: true,
            force_no_drop: false,
            amsdu_allowed: false,
            status: BaStatus::SettingUp,
            timer: FlushTimer::new(),
            _slots: slots,
        })
    }

    pub fn status(&self) -> BaStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: BaStatus) {
        self.status = status;
    }

    pub fn amsdu_allowed(&self) -> bool {
        self.amsdu_allowed
    }

    pub(crate) fn set_amsdu_allowed(&mut self, allowed: bool) {
        self.amsdu_allowed = allowed;
    }

    pub fn force_no_drop(&self) -> bool {
        self.force_no_drop
    }

    pub(crate) fn set_force_no_drop(&mut self, flag: bool) {
        self.force_no_drop = flag;
    }

    pub fn last_seq(&self) -> Option<SeqNum> {
        self.last_seq
    }

    pub fn warming_up(&self) -> bool {
        self.check_start_win
    }

    pub(crate) fn end_warm_up(&mut self) {
        self.check_start_win = false;
    }

    pub fn window_size(&self) -> WindowSize {
        self.buffer.window_size()
    }

    /// Steps 2 to 9 of admission for a frame whose session exists.
    pub(crate) fn admit(&mut self, seq: SeqNum, kind: FrameKind, payload: Option<P>) -> Admission<P> {
        if kind == FrameKind::AggregatedSubframe && !self.amsdu_allowed {
            return Admission::bypass(Bypass::AmsduNotAllowed, payload);
        }

        let prev_start = self.buffer.start_win();
        let mut realigned = None;
        if self.check_start_win {
            if seq == self.buffer.start_win() {
                self.check_start_win = false;
            } else {
                self.pkt_count = self.pkt_count.saturating_add(1);
                if self.pkt_count < self.buffer.window_size().half() {
                    if self.last_seq == Some(seq) {
                        return Admission::new(RxVerdict::Dropped(RxbaError::Duplicate), Vec::new());
                    }
                    self.last_seq = Some(seq);
                    return Admission::bypass(Bypass::WarmUp, payload);
                }
                self.check_start_win = false;
                realigned = self.realign(seq);
            }
        }

        let mut admission = self.admit_to_window(seq, kind, payload);
        if let Some(mut released) = realigned {
            released.append(&mut admission.deliver);
            admission.deliver = released;
            admission.realigned = true;
        }
        let rejected = matches!(admission.verdict, RxVerdict::Dropped(_))
            && !admission.window_advanced
            && !admission.realigned;
        admission.arm_timer =
            !rejected && (!self.timer.is_set() || self.buffer.start_win() != prev_start);
        admission
    }

    /// End of warm-up. The peer's numbering disagrees with the negotiated
    /// SSN; if the last forwarded sequence sits inside the window, or trails
    /// `seq` which itself trails `start_win`, restart the window right after
    /// what was already forwarded. Anything still buffered is released in
    /// order first. Returns `None` when the window stays where it is.
    fn realign(&mut self, seq: SeqNum) -> Option<Vec<P>> {
        let last = self.last_seq?;
        let start = self.buffer.start_win();
        let last_in_window = last.within(start, self.buffer.window_size().get());
        let trailing = start.is_after(seq) && seq.is_after(last);
        if !(last_in_window || trailing) {
            return None;
        }
        let target = last.advance(1);
        debug!(
            "{}/{}: realigning window {} -> {} (last forwarded {})",
            self.peer, self.tid, start, target, last
        );
        if last_in_window {
            return Some(self.buffer.drain_until(target));
        }
        let released = self.buffer.drain_all();
        self.buffer.rebase(target);
        Some(released)
    }

    fn admit_to_window(&mut self, seq: SeqNum, kind: FrameKind, payload: Option<P>) -> Admission<P> {
        let start = self.buffer.start_win();
        let ws = self.buffer.window_size().get();

        if self.force_no_drop {
            debug!("{}/{}: no-drop override consumed by seq {}", self.peer, self.tid, seq);
            self.force_no_drop = false;
        } else if !seq.in_future_half(start) {
            // Within one window behind start_win the slot was already released.
            let reason = if start.distance(seq) <= ws {
                RxbaError::Duplicate
            } else {
                RxbaError::OutOfWindow
            };
            return Admission::new(RxVerdict::Dropped(reason), Vec::new());
        }

        let is_bar = kind == FrameKind::BlockAckRequest;
        let seq = if is_bar { seq.advance(ws - 1) } else { seq };

        let mut deliver = Vec::new();
        let mut window_advanced = false;
        if let Some(flushed) = self.buffer.slide_to_include(seq) {
            debug!(
                "{}/{}: window advanced {} -> {}, {} released",
                self.peer, self.tid, start, self.buffer.start_win(), flushed.len()
            );
            deliver = flushed;
            window_advanced = true;
        }

        let offset = seq.distance(self.buffer.start_win());
        if !is_bar {
            let slot = match payload {
                Some(p) => RxSlot::Frame(p),
                None => RxSlot::DroppedInFw,
            };
            if let Err(e) = self.buffer.insert(seq, slot) {
                let mut admission = Admission::new(RxVerdict::Dropped(e), deliver);
                admission.window_advanced = window_advanced;
                return admission;
            }
        }

        let before = self.buffer.start_win();
        deliver.extend(self.buffer.drain_contiguous_prefix());
        let released = self.buffer.start_win().distance(before);

        let verdict = if is_bar || offset < released { RxVerdict::Released } else { RxVerdict::Buffered };
        let mut admission = Admission::new(verdict, deliver);
        admission.window_advanced = window_advanced;
        admission
    }

    /// Flush-timer expiry. Returns the released payloads.
    pub(crate) fn flush_on_timeout(&mut self, policy: FlushPolicy) -> Vec<P> {
        match policy {
            FlushPolicy::SkipHoles => match self.buffer.last_occupied_index() {
                Some(last) => {
                    let target = self.buffer.start_win().advance(last as u16 + 1);
                    self.buffer.drain_until(target)
                }
                None => Vec::new(),
            },
            FlushPolicy::ContiguousOnly => self.buffer.drain_contiguous_prefix(),
        }
    }

    /// Moves frames buffered by a previous incarnation of this session into
    /// the current window. Frames behind `start_win` are released first;
    /// frames beyond the window slide it forward.
    pub(crate) fn adopt(&mut self, entries: Vec<(SeqNum, RxSlot<P>)>) -> Vec<P> {
        let mut deliver = Vec::new();
        for (seq, slot) in entries {
            if !seq.in_future_half(self.buffer.start_win()) {
                deliver.extend(slot.into_payload());
                continue;
            }
            if let Some(flushed) = self.buffer.slide_to_include(seq) {
                deliver.extend(flushed);
            }
            if let Err(e) = self.buffer.insert(seq, slot) {
                debug!("{}/{}: seq {} not carried over: {}", self.peer, self.tid, seq, e);
            }
        }
        deliver.extend(self.buffer.drain_contiguous_prefix());
        deliver
    }
}
