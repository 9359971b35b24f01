use alloc::vec::Vec;

use rxba_core::{RxbaError, RxbaResult, SeqNum, WindowSize};

/// Content of an occupied reorder slot.
#[derive(Debug)]
pub enum RxSlot<P> {
    Frame(P),
    /// The radio discarded this sequence number. Holds the slot so the
    /// window can move past it, but never reaches the dispatcher.
    DroppedInFw,
}

impl<P> RxSlot<P> {
    pub fn into_payload(self) -> Option<P> {
        match self {
            RxSlot::Frame(p) => Some(p),
            RxSlot::DroppedInFw => None,
        }
    }
}

/// Fixed-capacity ring of `window_size` slots.
///
/// Offset `i` of the window (sequence `start_win + i`) lives at storage index
/// `(head + i) % window_size`, so sliding the window never moves payloads.
pub struct ReorderBuffer<P> {
    slots: Vec<Option<RxSlot<P>>>,
    head: usize,
    start_win: SeqNum,
    window_size: WindowSize,
    occupied: usize,
}

impl<P> ReorderBuffer<P> {
    pub fn new(window_size: WindowSize, start_win: SeqNum) -> RxbaResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(window_size.slots())
            .map_err(|_| RxbaError::AllocationFailure)?;
        slots.resize_with(window_size.slots(), || None);
        Ok(Self { slots, head: 0, start_win, window_size, occupied: 0 })
    }

    pub fn window_size(&self) -> WindowSize {
        self.window_size
    }

    pub fn start_win(&self) -> SeqNum {
        self.start_win
    }

    /// Last sequence number covered by the window.
    pub fn end_win(&self) -> SeqNum {
        self.start_win.advance(self.window_size.get() - 1)
    }

    pub fn contains(&self, seq: SeqNum) -> bool {
        seq.within(self.start_win, self.window_size.get())
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_occupied(&self, offset: usize) -> bool {
        offset < self.slots.len() && self.slots[self.index(offset)].is_some()
    }

    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }

    /// Stores `slot` at `seq - start_win`.
    pub fn insert(&mut self, seq: SeqNum, slot: RxSlot<P>) -> RxbaResult<()> {
        let offset = seq.distance(self.start_win) as usize;
        if offset >= self.slots.len() {
            return Err(RxbaError::OutOfWindow);
        }
        let idx = self.index(offset);
        if self.slots[idx].is_some() {
            return Err(RxbaError::Duplicate);
        }
        self.slots[idx] = Some(slot);
        self.occupied += 1;
        Ok(())
    }

    /// Releases every slot in `[start_win, new_start)`, at most one full
    /// window, and moves `start_win` to `new_start`. Holes are skipped.
    pub fn drain_until(&mut self, new_start: SeqNum) -> Vec<P> {
        let count = (new_start.distance(self.start_win) as usize).min(self.slots.len());
        let out = self.take_prefix(count);
        self.start_win = new_start;
        out
    }

    /// Releases the run of occupied slots at the head of the window.
    pub fn drain_contiguous_prefix(&mut self) -> Vec<P> {
        let count = (0..self.slots.len()).take_while(|&o| self.is_occupied(o)).count();
        let out = self.take_prefix(count);
        self.start_win = self.start_win.advance(count as u16);
        out
    }

    /// Releases everything still buffered, leaving the window just past it.
    pub fn drain_all(&mut self) -> Vec<P> {
        let end = self.start_win.advance(self.window_size.get());
        self.drain_until(end)
    }

    /// Highest occupied offset.
    pub fn last_occupied_index(&self) -> Option<usize> {
        (0..self.slots.len()).rev().find(|&o| self.is_occupied(o))
    }

    /// Slides the window forward so that `seq` becomes its last slot.
    /// Returns `None` when `seq` is already covered.
    pub fn slide_to_include(&mut self, seq: SeqNum) -> Option<Vec<P>> {
        if self.contains(seq) {
            return None;
        }
        let new_start = seq.retreat(self.window_size.get() - 1);
        Some(self.drain_until(new_start))
    }

    /// Moves `start_win` without releasing anything. Only meaningful while
    /// the buffer is empty.
    pub fn rebase(&mut self, start_win: SeqNum) {
        debug_assert!(self.is_empty());
        self.start_win = start_win;
    }

    /// Removes every buffered slot together with its sequence number, in
    /// window order.
    pub fn take_entries(&mut self) -> Vec<(SeqNum, RxSlot<P>)> {
        let mut out = Vec::with_capacity(self.occupied);
        for offset in 0..self.slots.len() {
            let idx = self.index(offset);
            if let Some(slot) = self.slots[idx].take() {
                out.push((self.start_win.advance(offset as u16), slot));
            }
        }
        self.occupied = 0;
        out
    }

    fn take_prefix(&mut self, count: usize) -> Vec<P> {
        let mut out = Vec::new();
        for offset in 0..count {
            let idx = self.index(offset);
            if let Some(slot) = self.slots[idx].take() {
                self.occupied -= 1;
                if let Some(p) = slot.into_payload() {
                    out.push(p);
                }
            }
        }
        self.head = (self.head + count) % self.slots.len();
        out
    }
}
