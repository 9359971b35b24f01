use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use rxba_core::{BaEvent, MacAddr, RxFrame, RxbaError, SeqNum, Tid};
use rxba_hal::{RadioRx, RxIndication};
use rxba_mem::{RxBufferLease, RxBufferPool};

/// Shape of the simulated Block-Ack link.
#[derive(Debug, Clone, Copy)]
pub struct LinkProfile {
    pub frames: u32,
    pub ssn: SeqNum,
    pub loss: f64,
    pub dup: f64,
    pub reorder: usize,
    pub bar_every: u32,
    pub fw_drop: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Frame number `index` of the stream, carried with sequence `seq`.
    Data { index: u32, seq: SeqNum },
    /// The radio reports it discarded `seq`.
    FwDrop { seq: SeqNum },
    Bar { ssn: SeqNum },
    /// End of one airtime slot.
    Tick,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptSummary {
    pub unique_sent: u32,
    pub lost: u32,
    pub fw_reported: u32,
    pub duplicated: u32,
    pub bars: u32,
    pub ticks: u32,
}

fn seq_of(profile: &LinkProfile, index: u32) -> SeqNum {
    profile.ssn.advance((index % 4096) as u16)
}

/// Generates the on-air sequence: bursts of `reorder` frames, each burst
/// shuffled, with losses, duplicates and periodic BARs.
pub fn build_script(profile: &LinkProfile, rng: &mut StdRng) -> (Vec<Step>, ScriptSummary) {
    let mut summary = ScriptSummary::default();
    let mut steps = Vec::new();
    if profile.frames == 0 {
        return (steps, summary);
    }

    // The SSN frame goes first so the session leaves warm-up on it.
    steps.push(Step::Data { index: 0, seq: seq_of(profile, 0) });
    steps.push(Step::Tick);
    summary.unique_sent = 1;
    summary.ticks = 1;

    let depth = profile.reorder.max(1) as u32;
    let mut burst = 0u32;
    let mut index = 1;
    while index < profile.frames {
        let end = (index + depth).min(profile.frames);
        let mut chunk = Vec::new();
        for i in index..end {
            let seq = seq_of(profile, i);
            if rng.gen_bool(profile.loss) {
                summary.lost += 1;
                if rng.gen_bool(profile.fw_drop) {
                    chunk.push(Step::FwDrop { seq });
                    summary.fw_reported += 1;
                }
                continue;
            }
            chunk.push(Step::Data { index: i, seq });
            summary.unique_sent += 1;
            if rng.gen_bool(profile.dup) {
                chunk.push(Step::Data { index: i, seq });
                summary.duplicated += 1;
            }
        }
        chunk.shuffle(rng);
        steps.extend(chunk);

        burst += 1;
        if profile.bar_every > 0 && burst % profile.bar_every == 0 && end < profile.frames {
            steps.push(Step::Bar { ssn: seq_of(profile, end) });
            summary.bars += 1;
        }
        steps.push(Step::Tick);
        summary.ticks += 1;
        index = end;
    }
    (steps, summary)
}

/// Plays a script as a radio. `poll_rx` reports `WouldBlock` at the end of
/// every airtime slot.
pub struct SimRadio {
    peer: MacAddr,
    tid: Tid,
    steps: VecDeque<Step>,
    pool: Arc<RxBufferPool>,
}

impl SimRadio {
    pub fn new(peer: MacAddr, tid: Tid, steps: Vec<Step>, pool: Arc<RxBufferPool>) -> Self {
        Self { peer, tid, steps: steps.into(), pool }
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

impl RadioRx<RxBufferLease> for SimRadio {
    fn poll_rx(&mut self) -> nb::Result<RxIndication<RxBufferLease>, RxbaError> {
        match self.steps.pop_front() {
            None | Some(Step::Tick) => Err(nb::Error::WouldBlock),
            Some(Step::Data { index, seq }) => {
                let mut lease = self
                    .pool
                    .alloc()
                    .ok_or(nb::Error::Other(RxbaError::AllocationFailure))?;
                lease.fill(&index.to_be_bytes()).map_err(nb::Error::Other)?;
                Ok(RxIndication::Frame(RxFrame::data(self.peer, self.tid, seq, lease)))
            }
            Some(Step::FwDrop { seq }) => Ok(RxIndication::Event(BaEvent::PeerDroppedFrames {
                peer: self.peer,
                tid: self.tid,
                base_seq: seq,
                bitmap: vec![0x01],
            })),
            Some(Step::Bar { ssn }) => Ok(RxIndication::Frame(RxFrame::bar(self.peer, self.tid, ssn))),
        }
    }
}

/// Checks the delivered stream: indices must strictly increase.
#[derive(Debug, Default)]
pub struct Verifier {
    last: Option<u32>,
    pub delivered: u64,
    pub violations: u64,
}

impl Verifier {
    pub fn check(&mut self, lease: &RxBufferLease) {
        self.delivered += 1;
        let index = match lease.payload().get(..4).and_then(|b| b.try_into().ok()) {
            Some(bytes) => u32::from_be_bytes(bytes),
            None => {
                log::warn!("malformed payload of {} bytes", lease.payload().len());
                self.violations += 1;
                return;
            }
        };
        if let Some(last) = self.last {
            if index <= last {
                log::warn!("order violation: frame {} delivered after {}", index, last);
                self.violations += 1;
            }
        }
        self.last = Some(index);
    }
}
