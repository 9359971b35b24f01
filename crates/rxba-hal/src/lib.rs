#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::time::Duration;

use rxba_core::{BaEvent, DelbaReason, MacAddr, RxFrame, RxbaError, Tid};

/// Upper protocol layer receiving ordered payloads.
///
/// Called without any engine lock held. An implementation may re-enter the
/// engine; such calls only queue further deliveries.
pub trait Dispatcher<P>: Send + Sync {
    fn deliver(&self, peer: MacAddr, tid: Tid, payload: P);
}

/// Opaque identifier of a scheduled timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot timer primitive.
///
/// INVARIANT: `schedule` never runs `on_fire` synchronously, and no
/// implementation lock is held while `on_fire` runs. Callers schedule and
/// cancel while holding their own locks.
pub trait TimerService: Send + Sync {
    fn schedule(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle;

    /// Cancelling an expired or unknown handle is a no-op. A callback that is
    /// already running may still complete.
    fn cancel(&self, handle: TimerHandle);
}

impl<P, D: Dispatcher<P> + ?Sized> Dispatcher<P> for Arc<D> {
    fn deliver(&self, peer: MacAddr, tid: Tid, payload: P) {
        (**self).deliver(peer, tid, payload)
    }
}

impl<T: TimerService + ?Sized> TimerService for Arc<T> {
    fn schedule(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        (**self).schedule(delay, on_fire)
    }

    fn cancel(&self, handle: TimerHandle) {
        (**self).cancel(handle)
    }
}

/// Transmit side for Block-Ack management frames (DELBA).
pub trait BlockAckTx: Send + Sync {
    fn send_delba(&self, peer: MacAddr, tid: Tid, initiator: bool, reason: DelbaReason);
}

impl<T: BlockAckTx + ?Sized> BlockAckTx for Arc<T> {
    fn send_delba(&self, peer: MacAddr, tid: Tid, initiator: bool, reason: DelbaReason) {
        (**self).send_delba(peer, tid, initiator, reason)
    }
}

/// Monotonic time source.
pub trait PlatformClock: Send + Sync {
    fn now_us(&self) -> u64;
}

/// What a radio hands up: a decoded frame or a management notification.
#[derive(Debug)]
pub enum RxIndication<P> {
    Frame(RxFrame<P>),
    Event(BaEvent),
}

/// A non-blocking source of receive indications.
/// INVARIANT: Must be Non-Blocking.
pub trait RadioRx<P> {
    fn poll_rx(&mut self) -> nb::Result<RxIndication<P>, RxbaError>;

    /// Drains up to `max` ready indications into `sink`. Stops at the first
    /// `WouldBlock`; errors are passed to `sink` as well.
    fn poll_batch(
        &mut self,
        max: usize,
        sink: &mut dyn FnMut(Result<RxIndication<P>, RxbaError>),
    ) -> usize {
        let mut count = 0;
        while count < max {
            match self.poll_rx() {
                Ok(ind) => sink(Ok(ind)),
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => sink(Err(e)),
            }
            count += 1;
        }
        count
    }
}
