#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

use rxba_core::{RxbaError, RxbaResult};
use spin::Mutex;
use zeroize::Zeroize;

/// Large enough for an A-MSDU carried in an A-MPDU (IEEE Std 802.11-2016, 9.3.2.1).
pub const RX_BUFFER_SIZE: usize = 8192;

#[derive(Zeroize)]
pub struct RxBuffer {
    pub data: [u8; RX_BUFFER_SIZE],
    pub len: usize,
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self { data: [0u8; RX_BUFFER_SIZE], len: 0 }
    }
}

impl RxBuffer {
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn fill(&mut self, bytes: &[u8]) -> RxbaResult<()> {
        if bytes.len() > RX_BUFFER_SIZE {
            return Err(RxbaError::AllocationFailure);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }
}

/// Fixed pool of receive buffers. Leases go back to the pool on drop.
pub struct RxBufferPool {
    pool: Mutex<Vec<Box<RxBuffer>>>,
}

pub struct RxBufferLease {
    buffer: Option<Box<RxBuffer>>,
    pool: Arc<RxBufferPool>,
}

impl RxBufferPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let mut pool = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            pool.push(Box::new(RxBuffer::default()));
        }
        Arc::new(Self { pool: Mutex::new(pool) })
    }

    pub fn alloc(self: &Arc<Self>) -> Option<RxBufferLease> {
        let mut pool = self.pool.lock();
        let mut buffer = pool.pop()?;
        buffer.len = 0;
        Some(RxBufferLease { buffer: Some(buffer), pool: self.clone() })
    }

    fn release(&self, buffer: Box<RxBuffer>) {
        self.pool.lock().push(buffer);
    }

    pub fn available(&self) -> usize {
        self.pool.lock().len()
    }
}

impl Deref for RxBufferLease {
    type Target = RxBuffer;
    fn deref(&self) -> &Self::Target {
        self.buffer.as_deref().expect("lease holds its buffer until drop")
    }
}

impl DerefMut for RxBufferLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_deref_mut().expect("lease holds its buffer until drop")
    }
}

impl Drop for RxBufferLease {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.zeroize();
            self.pool.release(buffer);
        }
    }
}

impl core::fmt::Debug for RxBufferLease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RxBufferLease").field("len", &self.len).finish()
    }
}

/// Caps the number of reorder slots all sessions may hold at once.
///
/// Reorder buffers are sized by the negotiated window, so the budget is what
/// turns an oversubscribed adapter into an allocation failure instead of
/// unbounded growth.
pub struct SlotBudget {
    capacity: usize,
    in_use: Mutex<usize>,
}

/// Slots held by one session; returned to the budget on drop.
pub struct SlotReservation {
    slots: usize,
    budget: Arc<SlotBudget>,
}

impl SlotBudget {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self { capacity, in_use: Mutex::new(0) })
    }

    pub fn reserve(self: &Arc<Self>, slots: usize) -> RxbaResult<SlotReservation> {
        let mut in_use = self.in_use.lock();
        if slots > self.capacity - *in_use {
            return Err(RxbaError::AllocationFailure);
        }
        *in_use += slots;
        Ok(SlotReservation { slots, budget: self.clone() })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity - *self.in_use.lock()
    }
}

impl SlotReservation {
    pub fn slots(&self) -> usize {
        self.slots
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        let mut in_use = self.budget.in_use.lock();
        *in_use -= self.slots;
    }
}

impl core::fmt::Debug for SlotReservation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlotReservation").field("slots", &self.slots).finish()
    }
}
