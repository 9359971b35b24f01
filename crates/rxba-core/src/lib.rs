#![no_std]
#[cfg(feature = "std")]
extern crate std;
extern crate alloc;

pub mod event;
pub mod seq;
pub mod types;

pub use event::{AddbaRequest, AddbaResponse, AddbaStatus, BaEvent, DelbaReason};
pub use seq::SeqNum;
pub use types::{FrameKind, MacAddr, RxFrame, Tid, WindowSize};

/// Sequence numbers are 12 bits wide (IEEE Std 802.11-2016, 9.2.4.4.2).
pub const SEQ_MODULO: u16 = 4096;
pub const SEQ_MASK: u16 = SEQ_MODULO - 1;
/// Half of the sequence space; the horizon for "ahead of" comparisons.
pub const HALF_SEQ_SPACE: u16 = SEQ_MODULO / 2;

pub const MAC_ADDR_LEN: usize = 6;
pub const MAX_NUM_TID: usize = 16;

pub const MIN_WINDOW_SIZE: u16 = 1;
pub const MAX_WINDOW_SIZE: u16 = 64;

/// One bit per slot of the largest window.
pub const MAX_DROP_BITMAP_LEN: usize = (MAX_WINDOW_SIZE as usize) / 8;

pub type RxbaResult<T> = Result<T, RxbaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxbaError {
    /// Sequence number already buffered or already forwarded during warm-up.
    Duplicate,
    /// Stale retransmission outside the circular acceptance range.
    OutOfWindow,
    /// No reorder session for the (peer, tid) pair.
    UnknownSession,
    /// Reorder slots could not be reserved for a session.
    AllocationFailure,
    /// A management notification that cannot be applied.
    MalformedEvent,
    InvalidSequence,
    InvalidTid,
    InvalidWindowSize,
}

impl core::fmt::Display for RxbaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            RxbaError::Duplicate => "duplicate frame",
            RxbaError::OutOfWindow => "frame outside the reorder window",
            RxbaError::UnknownSession => "no reorder session for peer/tid",
            RxbaError::AllocationFailure => "reorder slot allocation failed",
            RxbaError::MalformedEvent => "malformed block-ack event",
            RxbaError::InvalidSequence => "sequence number exceeds 12 bits",
            RxbaError::InvalidTid => "traffic identifier out of range",
            RxbaError::InvalidWindowSize => "window size out of range",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RxbaError {}
