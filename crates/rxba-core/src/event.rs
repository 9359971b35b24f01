//! Inbound Block-Ack management events and ADDBA/DELBA parameters.
//!
//! Decoding these from firmware TLVs or action frames happens elsewhere; the
//! reorder engine only consumes the decoded values.

use alloc::vec::Vec;

use crate::{MacAddr, SeqNum, Tid, WindowSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaEvent {
    /// A Block-Ack agreement was set up and completed in one step.
    SetupAccepted {
        peer: MacAddr,
        tid: Tid,
        window_size: WindowSize,
        starting_seq: SeqNum,
        amsdu_allowed: bool,
    },
    /// The handshake for a session created by `respond_to_addba` completed.
    SetupConfirmed { peer: MacAddr, tid: Tid, amsdu_allowed: bool },
    /// Setup failed; any half-open session for the pair is discarded.
    SetupRejected { peer: MacAddr, tid: Tid },
    /// DELBA received or sent.
    Teardown { peer: MacAddr, tid: Tid },
    /// The agreement's inactivity timer expired.
    StreamTimeout { peer: MacAddr, tid: Tid },
    /// The radio discarded frames; bit `j` of byte `i` is `base_seq + 8*i + j`.
    PeerDroppedFrames { peer: MacAddr, tid: Tid, base_seq: SeqNum, bitmap: Vec<u8> },
}

/// A decoded ADDBA request from an originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaRequest {
    pub peer: MacAddr,
    pub tid: Tid,
    pub dialog_token: u8,
    pub ssn: SeqNum,
    /// Buffer size proposed by the originator; 0 means "no preference".
    pub buffer_size: u16,
    pub amsdu_supported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddbaStatus {
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddbaResponse {
    pub peer: MacAddr,
    pub tid: Tid,
    pub dialog_token: u8,
    pub ssn: SeqNum,
    pub status: AddbaStatus,
    pub buffer_size: u16,
    pub amsdu_supported: bool,
}

/// IEEE Std 802.11-2016, Table 9-45 reason codes used when closing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DelbaReason {
    Unspecified = 1,
    Timeout = 39,
}

impl DelbaReason {
    pub const fn code(self) -> u16 {
        self as u16
    }
}
