use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rxba_core::{DelbaReason, MacAddr, RxbaError, Tid};
use rxba_hal::{BlockAckTx, Dispatcher, PlatformClock, RadioRx, RxIndication};

pub mod timer;
pub use timer::{ManualTimer, ThreadTimer};

pub struct StdClock(Instant);
impl StdClock { pub fn new() -> Self { Self(Instant::now()) } }
impl Default for StdClock { fn default() -> Self { Self::new() } }
impl PlatformClock for StdClock {
    fn now_us(&self) -> u64 { self.0.elapsed().as_micros() as u64 }
}

/// A payload released by the reorder engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered<P> {
    pub peer: MacAddr,
    pub tid: Tid,
    pub payload: P,
}

/// Forwards deliveries into an mpsc channel. A closed receiver drops them.
pub struct ChannelDispatcher<P> {
    tx: Mutex<Sender<Delivered<P>>>,
}

impl<P: Send> ChannelDispatcher<P> {
    pub fn new() -> (Self, Receiver<Delivered<P>>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl<P: Send> Dispatcher<P> for ChannelDispatcher<P> {
    fn deliver(&self, peer: MacAddr, tid: Tid, payload: P) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.send(Delivered { peer, tid, payload }).is_err() {
            log::trace!("delivery for {}/{} dropped: receiver gone", peer, tid);
        }
    }
}

/// DELBA transmitter that records what it was asked to send.
#[derive(Default)]
pub struct DelbaLog {
    sent: Mutex<Vec<(MacAddr, Tid, bool, DelbaReason)>>,
}

impl DelbaLog {
    pub fn new() -> Self { Self::default() }

    pub fn sent(&self) -> Vec<(MacAddr, Tid, bool, DelbaReason)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl BlockAckTx for DelbaLog {
    fn send_delba(&self, peer: MacAddr, tid: Tid, initiator: bool, reason: DelbaReason) {
        log::info!("DELBA -> {}/{} initiator={} reason={}", peer, tid, initiator, reason.code());
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push((peer, tid, initiator, reason));
    }
}

/// Radio stand-in fed from a channel; `poll_rx` never blocks.
pub struct ChannelRadio<P> {
    rx: Receiver<RxIndication<P>>,
}

impl<P> ChannelRadio<P> {
    pub fn new() -> (Sender<RxIndication<P>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }
}

impl<P> RadioRx<P> for ChannelRadio<P> {
    fn poll_rx(&mut self) -> nb::Result<RxIndication<P>, RxbaError> {
        match self.rx.try_recv() {
            Ok(ind) => Ok(ind),
            Err(mpsc::TryRecvError::Empty) => Err(nb::Error::WouldBlock),
            Err(mpsc::TryRecvError::Disconnected) => Err(nb::Error::WouldBlock),
        }
    }
}
