use core::fmt;

use crate::{
    RxbaError, RxbaResult, SeqNum, MAC_ADDR_LEN, MAX_NUM_TID, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE,
};

/// Transmitter address of a reorder session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_ADDR_LEN]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", m[0], m[1], m[2], m[3], m[4], m[5])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Traffic identifier, `0..=15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(u8);

impl Tid {
    pub fn new(raw: u8) -> RxbaResult<Self> {
        if (raw as usize) < MAX_NUM_TID {
            Ok(Self(raw))
        } else {
            Err(RxbaError::InvalidTid)
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Negotiated reorder buffer capacity, `1..=64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize(u16);

impl WindowSize {
    pub fn new(raw: u16) -> RxbaResult<Self> {
        if (MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&raw) {
            Ok(Self(raw))
        } else {
            Err(RxbaError::InvalidWindowSize)
        }
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn slots(self) -> usize {
        self.0 as usize
    }

    pub const fn half(self) -> u16 {
        self.0 / 2
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    /// A-MSDU carried inside an A-MPDU.
    AggregatedSubframe,
    /// Block Ack Request; carries no payload, its sequence number is the new SSN.
    BlockAckRequest,
}

/// A decoded frame as it enters the admission pipeline.
///
/// `payload` is `None` for BARs and for placeholders of frames the radio
/// discarded (see `BaEvent::PeerDroppedFrames`).
#[derive(Debug)]
pub struct RxFrame<P> {
    pub peer: MacAddr,
    pub tid: Tid,
    pub seq: SeqNum,
    pub kind: FrameKind,
    pub payload: Option<P>,
}

impl<P> RxFrame<P> {
    pub fn data(peer: MacAddr, tid: Tid, seq: SeqNum, payload: P) -> Self {
        Self { peer, tid, seq, kind: FrameKind::Data, payload: Some(payload) }
    }

    pub fn amsdu(peer: MacAddr, tid: Tid, seq: SeqNum, payload: P) -> Self {
        Self { peer, tid, seq, kind: FrameKind::AggregatedSubframe, payload: Some(payload) }
    }

    pub fn bar(peer: MacAddr, tid: Tid, ssn: SeqNum) -> Self {
        Self { peer, tid, seq: ssn, kind: FrameKind::BlockAckRequest, payload: None }
    }

    pub fn dropped_in_fw(peer: MacAddr, tid: Tid, seq: SeqNum) -> Self {
        Self { peer, tid, seq, kind: FrameKind::Data, payload: None }
    }
}
