#![no_std]
extern crate alloc;
use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, info, warn};
use spin::Mutex;

use rxba_core::{
    AddbaRequest, AddbaResponse, AddbaStatus, BaEvent, DelbaReason, FrameKind, MacAddr, RxFrame,
    RxbaError, RxbaResult, SeqNum, Tid, WindowSize, MAX_DROP_BITMAP_LEN, MAX_NUM_TID,
};
use rxba_hal::{BlockAckTx, Dispatcher, RxIndication, TimerCallback, TimerService};
use rxba_mem::SlotBudget;

pub mod buffer;
pub mod config;
pub mod session;
pub mod stats;
pub mod timer;

pub use buffer::{ReorderBuffer, RxSlot};
pub use config::{AddbaPolicy, EngineConfig, FlushPolicy};
pub use session::{BaStatus, ReorderSession};
pub use stats::RxReorderStats;

/// Registry key of a reorder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub peer: MacAddr,
    pub tid: Tid,
}

impl SessionKey {
    pub fn new(peer: MacAddr, tid: Tid) -> Self {
        Self { peer, tid }
    }
}

/// Why a frame skipped the reorder window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    NoSession,
    AmsduNotAllowed,
    WarmUp,
}

/// Outcome of admitting one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxVerdict {
    /// Handed to the dispatcher without touching the window.
    Forwarded(Bypass),
    /// Stored behind a gap.
    Buffered,
    /// Entered the window and was released in order. BARs report this too.
    Released,
    /// Silently discarded.
    Dropped(RxbaError),
}

/// Read-only view of a session, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub peer: MacAddr,
    pub tid: Tid,
    pub status: BaStatus,
    pub window_size: WindowSize,
    pub start_win: SeqNum,
    pub buffered: usize,
    pub amsdu_allowed: bool,
    pub warming_up: bool,
    pub force_no_drop: bool,
    pub timer_armed: bool,
    pub last_seq: Option<SeqNum>,
}

struct Delivery<P> {
    peer: MacAddr,
    tid: Tid,
    payload: P,
}

struct EngineState<P> {
    sessions: BTreeMap<SessionKey, ReorderSession<P>>,
    /// Last sequence seen per TID while no session existed, with its sender;
    /// seeds warm-up. One entry per TID, the latest sender wins.
    last_rx_seq: [Option<(MacAddr, SeqNum)>; MAX_NUM_TID],
    deliveries: VecDeque<Delivery<P>>,
    delivering: bool,
    next_epoch: u64,
    stats: RxReorderStats,
}

impl<P> EngineState<P> {
    fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            last_rx_seq: [None; MAX_NUM_TID],
            deliveries: VecDeque::new(),
            delivering: false,
            next_epoch: 0,
            stats: RxReorderStats::default(),
        }
    }

    fn enqueue(&mut self, key: SessionKey, payloads: Vec<P>) {
        self.stats.delivered += payloads.len() as u64;
        for payload in payloads {
            self.deliveries.push_back(Delivery { peer: key.peer, tid: key.tid, payload });
        }
    }

    /// True if the caller became the context that drains `deliveries`.
    fn claim_delivery(&mut self) -> bool {
        if self.delivering || self.deliveries.is_empty() {
            return false;
        }
        self.delivering = true;
        true
    }

    fn note_rx_seq(&mut self, key: SessionKey, seq: SeqNum) {
        self.last_rx_seq[key.tid.value() as usize] = Some((key.peer, seq));
    }

    fn recorded_rx_seq(&self, key: SessionKey) -> Option<SeqNum> {
        match self.last_rx_seq[key.tid.value() as usize] {
            Some((peer, seq)) if peer == key.peer => Some(seq),
            _ => None,
        }
    }

    fn forget_rx_seq(&mut self, key: SessionKey) {
        if self.recorded_rx_seq(key).is_some() {
            self.last_rx_seq[key.tid.value() as usize] = None;
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn keys_where(&self, mut pred: impl FnMut(&SessionKey, &ReorderSession<P>) -> bool) -> Vec<SessionKey> {
        self.sessions.iter().filter(|(k, s)| pred(k, s)).map(|(k, _)| *k).collect()
    }
}

struct EngineInner<P> {
    config: EngineConfig,
    dispatcher: Box<dyn Dispatcher<P>>,
    timers: Box<dyn TimerService>,
    delba_tx: Option<Box<dyn BlockAckTx>>,
    budget: Arc<SlotBudget>,
    state: Mutex<EngineState<P>>,
}

/// Receive-side Block-Ack reorder engine.
///
/// Cloning yields another handle to the same registry. All entry points may
/// be called concurrently from the receive path, the event path and timer
/// expiry; payloads reach the dispatcher in release order, outside the lock.
pub struct ReorderEngine<P: Send + 'static> {
    inner: Arc<EngineInner<P>>,
}

impl<P: Send + 'static> Clone for ReorderEngine<P> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<P: Send + 'static> ReorderEngine<P> {
    pub fn new(
        config: EngineConfig,
        dispatcher: Box<dyn Dispatcher<P>>,
        timers: Box<dyn TimerService>,
        delba_tx: Option<Box<dyn BlockAckTx>>,
    ) -> Self {
        info!(
            "rx reorder engine: flush {:?}/slot, policy {:?}, budget {} slots",
            config.min_flush_interval, config.flush_policy, config.slot_budget
        );
        Self {
            inner: Arc::new(EngineInner {
                budget: SlotBudget::new(config.slot_budget),
                config,
                dispatcher,
                timers,
                delba_tx,
                state: Mutex::new(EngineState::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn admit(&self, frame: RxFrame<P>) -> RxVerdict {
        let inner = &self.inner;
        inner.locked(|state| inner.admit_locked(state, frame))
    }

    pub fn admit_parts(
        &self,
        peer: MacAddr,
        tid: Tid,
        seq: SeqNum,
        kind: FrameKind,
        payload: Option<P>,
    ) -> RxVerdict {
        self.admit(RxFrame { peer, tid, seq, kind, payload })
    }

    /// Creates the session for `(peer, tid)`, or re-creates it with new
    /// parameters. Frames buffered before `starting_seq` are released; later
    /// ones are carried into the new window.
    pub fn create_or_reset(
        &self,
        peer: MacAddr,
        tid: Tid,
        window_size: WindowSize,
        starting_seq: SeqNum,
    ) -> RxbaResult<()> {
        let inner = &self.inner;
        inner.locked(|state| inner.create_or_reset_locked(state, SessionKey::new(peer, tid), window_size, starting_seq))
    }

    pub fn establish(&self, peer: MacAddr, tid: Tid, amsdu_allowed: bool) -> RxbaResult<()> {
        let mut state = self.inner.state.lock();
        let session = state
            .sessions
            .get_mut(&SessionKey::new(peer, tid))
            .ok_or(RxbaError::UnknownSession)?;
        session.set_status(BaStatus::Established);
        session.set_amsdu_allowed(amsdu_allowed);
        info!("{}/{}: block-ack established (amsdu {})", peer, tid, amsdu_allowed);
        Ok(())
    }

    /// Releases everything buffered in order and removes the session.
    /// Returns false if there was none.
    pub fn teardown(&self, peer: MacAddr, tid: Tid) -> bool {
        let inner = &self.inner;
        inner.locked(|state| inner.teardown_locked(state, SessionKey::new(peer, tid)))
    }

    pub fn teardown_peer(&self, peer: MacAddr) -> usize {
        let inner = &self.inner;
        inner.locked(|state| {
            for entry in state.last_rx_seq.iter_mut() {
                if matches!(entry, Some((p, _)) if *p == peer) {
                    *entry = None;
                }
            }
            let keys = state.keys_where(|k, _| k.peer == peer);
            keys.into_iter().filter(|k| inner.teardown_locked(state, *k)).count()
        })
    }

    pub fn teardown_all(&self) -> usize {
        let inner = &self.inner;
        inner.locked(|state| {
            state.last_rx_seq = [None; MAX_NUM_TID];
            let keys = state.keys_where(|_, _| true);
            keys.into_iter().filter(|k| inner.teardown_locked(state, *k)).count()
        })
    }

    /// Arms (or clears) the one-shot window-test override. `tid == None`
    /// applies to every session of `peer`. Returns the sessions touched.
    pub fn set_force_no_drop(&self, peer: MacAddr, tid: Option<Tid>, flag: bool) -> usize {
        let mut state = self.inner.state.lock();
        let mut touched = 0;
        for (key, session) in state.sessions.iter_mut() {
            if key.peer == peer && tid.map_or(true, |t| t == key.tid) {
                session.set_force_no_drop(flag);
                touched += 1;
            }
        }
        touched
    }

    pub fn set_force_no_drop_all(&self, flag: bool) -> usize {
        let mut state = self.inner.state.lock();
        for session in state.sessions.values_mut() {
            session.set_force_no_drop(flag);
        }
        debug!("no-drop override {} on {} sessions", flag, state.sessions.len());
        state.sessions.len()
    }

    /// Applies the ADDBA responder policy and, on acceptance, creates the
    /// session in `SettingUp` state with the offered window.
    pub fn respond_to_addba(&self, req: &AddbaRequest) -> AddbaResponse {
        let mut resp = self.inner.config.addba.decide(req);
        if resp.status == AddbaStatus::Accepted {
            let created = WindowSize::new(resp.buffer_size)
                .and_then(|ws| self.create_or_reset(req.peer, req.tid, ws, req.ssn));
            if let Err(e) = created {
                warn!("{}/{}: declining ADDBA: {}", req.peer, req.tid, e);
                resp.status = AddbaStatus::Declined;
                resp.amsdu_supported = false;
            }
        }
        info!(
            "{}/{}: ADDBA token {} ssn {} -> {:?} (win {})",
            req.peer, req.tid, req.dialog_token, req.ssn, resp.status, resp.buffer_size
        );
        resp
    }

    /// Moves every established session back to `SettingUp` and asks the
    /// transmit side to send a DELBA for each.
    pub fn send_delba_to_all(&self) -> usize {
        let keys = {
            let mut state = self.inner.state.lock();
            let keys = state.keys_where(|_, s| s.status() == BaStatus::Established);
            for key in &keys {
                if let Some(session) = state.sessions.get_mut(key) {
                    session.set_status(BaStatus::SettingUp);
                }
            }
            keys
        };
        if let Some(tx) = &self.inner.delba_tx {
            for key in &keys {
                tx.send_delba(key.peer, key.tid, false, DelbaReason::Unspecified);
            }
        }
        keys.len()
    }

    /// Admits a placeholder for every set bit: bit `j` of byte `i` is
    /// sequence `base_seq + 8*i + j`. Returns the number of placeholders.
    pub fn peer_dropped_frames(
        &self,
        peer: MacAddr,
        tid: Tid,
        base_seq: SeqNum,
        bitmap: &[u8],
    ) -> RxbaResult<usize> {
        let inner = &self.inner;
        inner.locked(|state| {
            if bitmap.is_empty() || bitmap.len() > MAX_DROP_BITMAP_LEN {
                state.stats.malformed_events += 1;
                return Err(RxbaError::MalformedEvent);
            }
            if !state.sessions.contains_key(&SessionKey::new(peer, tid)) {
                return Err(RxbaError::UnknownSession);
            }
            let mut count = 0;
            for (i, byte) in bitmap.iter().enumerate() {
                for j in 0..8 {
                    if byte & (1 << j) != 0 {
                        let seq = base_seq.advance((i * 8 + j) as u16);
                        inner.admit_locked(state, RxFrame::dropped_in_fw(peer, tid, seq));
                        count += 1;
                    }
                }
            }
            state.stats.fw_dropped += count as u64;
            Ok(count)
        })
    }

    /// Applies a management notification. Errors are logged and returned.
    pub fn handle_event(&self, event: BaEvent) -> RxbaResult<()> {
        let result = match event {
            BaEvent::SetupAccepted { peer, tid, window_size, starting_seq, amsdu_allowed } => self
                .create_or_reset(peer, tid, window_size, starting_seq)
                .and_then(|()| self.establish(peer, tid, amsdu_allowed)),
            BaEvent::SetupConfirmed { peer, tid, amsdu_allowed } => {
                self.establish(peer, tid, amsdu_allowed)
            }
            BaEvent::SetupRejected { peer, tid } => {
                self.teardown(peer, tid);
                Ok(())
            }
            BaEvent::Teardown { peer, tid } => {
                self.teardown(peer, tid);
                Ok(())
            }
            BaEvent::StreamTimeout { peer, tid } => {
                if let Some(tx) = &self.inner.delba_tx {
                    tx.send_delba(peer, tid, false, DelbaReason::Timeout);
                }
                self.teardown(peer, tid);
                Ok(())
            }
            BaEvent::PeerDroppedFrames { peer, tid, base_seq, bitmap } => {
                self.peer_dropped_frames(peer, tid, base_seq, &bitmap).map(|_| ())
            }
        };
        if let Err(e) = result {
            warn!("block-ack event ignored: {}", e);
        }
        result
    }

    /// Entry point for a radio receive loop.
    pub fn handle_indication(&self, indication: RxIndication<P>) {
        match indication {
            RxIndication::Frame(frame) => {
                self.admit(frame);
            }
            RxIndication::Event(event) => {
                self.handle_event(event).ok();
            }
        }
    }

    pub fn stats(&self) -> RxReorderStats {
        self.inner.state.lock().stats
    }

    pub fn session_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    pub fn session_info(&self, peer: MacAddr, tid: Tid) -> Option<SessionInfo> {
        let state = self.inner.state.lock();
        state.sessions.get(&SessionKey::new(peer, tid)).map(|s| SessionInfo {
            peer,
            tid,
            status: s.status(),
            window_size: s.window_size(),
            start_win: s.buffer.start_win(),
            buffered: s.buffer.occupied(),
            amsdu_allowed: s.amsdu_allowed(),
            warming_up: s.warming_up(),
            force_no_drop: s.force_no_drop(),
            timer_armed: s.timer.is_set(),
            last_seq: s.last_seq(),
        })
    }

    pub fn sessions(&self) -> Vec<SessionKey> {
        self.inner.state.lock().keys_where(|_, _| true)
    }

    /// Slots still free in the shared budget.
    pub fn slots_available(&self) -> usize {
        self.inner.budget.available()
    }
}

impl<P: Send + 'static> EngineInner<P> {
    /// Runs `f` under the registry lock, then drains the delivery queue if no
    /// other context is already doing so.
    fn locked<R>(self: &Arc<Self>, f: impl FnOnce(&mut EngineState<P>) -> R) -> R {
        let (result, drain) = {
            let mut state = self.state.lock();
            let result = f(&mut *state);
            (result, state.claim_delivery())
        };
        if drain {
            self.run_deliveries();
        }
        result
    }

    fn run_deliveries(&self) {
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.deliveries.pop_front() {
                    Some(d) => d,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            self.dispatcher.deliver(next.peer, next.tid, next.payload);
        }
    }

    fn admit_locked(self: &Arc<Self>, state: &mut EngineState<P>, frame: RxFrame<P>) -> RxVerdict {
        let key = SessionKey::new(frame.peer, frame.tid);
        let admission = match state.sessions.get_mut(&key) {
            Some(session) => session.admit(frame.seq, frame.kind, frame.payload),
            None => {
                let verdict = if frame.kind == FrameKind::BlockAckRequest {
                    RxVerdict::Dropped(RxbaError::UnknownSession)
                } else {
                    state.note_rx_seq(key, frame.seq);
                    state.enqueue(key, frame.payload.into_iter().collect());
                    RxVerdict::Forwarded(Bypass::NoSession)
                };
                state.stats.record_verdict(verdict);
                return verdict;
            }
        };
        if admission.arm_timer {
            self.rearm_flush_timer(state, key);
        }
        state.stats.record(&admission);
        let verdict = admission.verdict;
        state.enqueue(key, admission.deliver);
        verdict
    }

    fn rearm_flush_timer(self: &Arc<Self>, state: &mut EngineState<P>, key: SessionKey) {
        let epoch = state.next_epoch();
        let Some(session) = state.sessions.get_mut(&key) else {
            return;
        };
        let delay = self.config.flush_delay(session.window_size());
        let weak = Arc::downgrade(self);
        let on_fire: TimerCallback = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_flush_timer(key, epoch);
            }
        });
        session.timer.restart(&*self.timers, delay, epoch, on_fire);
    }

    fn on_flush_timer(self: &Arc<Self>, key: SessionKey, epoch: u64) {
        self.locked(|state| {
            let Some(session) = state.sessions.get_mut(&key) else {
                return;
            };
            if !session.timer.expire(epoch) {
                return;
            }
            let before = session.buffer.start_win();
            let flushed = session.flush_on_timeout(self.config.flush_policy);
            let after = session.buffer.start_win();
            if after != before {
                debug!("{}/{}: flush timeout {} -> {}, {} released", key.peer, key.tid, before, after, flushed.len());
                state.stats.timer_flushes += 1;
            }
            state.enqueue(key, flushed);
        })
    }

    fn create_or_reset_locked(
        self: &Arc<Self>,
        state: &mut EngineState<P>,
        key: SessionKey,
        window_size: WindowSize,
        starting_seq: SeqNum,
    ) -> RxbaResult<()> {
        let previous = state.sessions.remove(&key);
        let resetting = previous.is_some();
        let mut carried = Vec::new();
        let mut amsdu_allowed = false;
        let mut warming_up = true;
        let mut last_seq = state.recorded_rx_seq(key);

        if let Some(mut old) = previous {
            old.timer.stop(&*self.timers);
            let released = old.buffer.drain_until(starting_seq);
            state.enqueue(key, released);
            carried = old.buffer.take_entries();
            amsdu_allowed = old.amsdu_allowed();
            warming_up = old.warming_up();
            last_seq = old.last_seq().or(last_seq);
            // Dropping `old` returns its slots before the new reservation.
        }

        let built = self
            .budget
            .reserve(window_size.slots())
            .and_then(|slots| ReorderSession::new(key.peer, key.tid, window_size, starting_seq, last_seq, slots));
        let mut session = match built {
            Ok(session) => session,
            Err(e) => {
                let leftovers = carried.into_iter().filter_map(|(_, slot)| slot.into_payload()).collect();
                state.enqueue(key, leftovers);
                state.stats.allocation_failures += 1;
                warn!("{}/{}: cannot allocate {} reorder slots: {}", key.peer, key.tid, window_size, e);
                return Err(e);
            }
        };

        session.set_amsdu_allowed(amsdu_allowed);
        // Reset keeps the warm-up state; carried frames end it.
        if !warming_up || !carried.is_empty() {
            session.end_warm_up();
        }
        let released = session.adopt(carried);
        state.enqueue(key, released);
        let pending = session.buffer.occupied() > 0;
        state.sessions.insert(key, session);
        state.forget_rx_seq(key);
        if pending {
            self.rearm_flush_timer(state, key);
        }

        if resetting {
            state.stats.sessions_reset += 1;
        } else {
            state.stats.sessions_created += 1;
        }
        info!("{}/{}: reorder session win {} ssn {}", key.peer, key.tid, window_size, starting_seq);
        Ok(())
    }

    fn teardown_locked(&self, state: &mut EngineState<P>, key: SessionKey) -> bool {
        let Some(mut session) = state.sessions.remove(&key) else {
            return false;
        };
        let flushed = session.buffer.drain_all();
        session.timer.stop(&*self.timers);
        info!("{}/{}: reorder session removed, {} released", key.peer, key.tid, flushed.len());
        state.enqueue(key, flushed);
        state.stats.sessions_torn_down += 1;
        true
    }
}

impl<P> Drop for EngineInner<P> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for session in state.sessions.values_mut() {
            session.timer.stop(&*self.timers);
        }
    }
}
