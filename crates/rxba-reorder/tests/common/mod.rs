#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rxba_core::{MacAddr, SeqNum, Tid, WindowSize};
use rxba_hal::{BlockAckTx, Dispatcher, TimerCallback, TimerHandle, TimerService};
use rxba_reorder::{EngineConfig, ReorderEngine};
use rxba_std::{DelbaLog, ManualTimer};

pub const PEER: MacAddr = MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const OTHER_PEER: MacAddr = MacAddr([0x02, 0x66, 0x77, 0x88, 0x99, 0xaa]);

pub fn tid(n: u8) -> Tid {
    Tid::new(n).unwrap()
}

pub fn seq(n: u16) -> SeqNum {
    SeqNum::new(n).unwrap()
}

pub fn ws(n: u16) -> WindowSize {
    WindowSize::new(n).unwrap()
}

/// Records every delivery in arrival order.
#[derive(Default)]
pub struct Recorder {
    got: Mutex<Vec<(MacAddr, Tid, u32)>>,
}

impl Recorder {
    pub fn payloads(&self) -> Vec<u32> {
        self.got.lock().unwrap().iter().map(|d| d.2).collect()
    }

    pub fn payloads_for(&self, peer: MacAddr, tid: Tid) -> Vec<u32> {
        self.got
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.0 == peer && d.1 == tid)
            .map(|d| d.2)
            .collect()
    }
}

impl Dispatcher<u32> for Recorder {
    fn deliver(&self, peer: MacAddr, tid: Tid, payload: u32) {
        self.got.lock().unwrap().push((peer, tid, payload));
    }
}

/// Schedules on a `ManualTimer` but ignores cancellation, so callbacks of
/// stopped timers still run.
pub struct UncancellableTimer(pub Arc<ManualTimer>);

impl TimerService for UncancellableTimer {
    fn schedule(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        self.0.schedule(delay, on_fire)
    }

    fn cancel(&self, _handle: TimerHandle) {}
}

pub struct Harness {
    pub engine: ReorderEngine<u32>,
    pub recorder: Arc<Recorder>,
    pub timer: Arc<ManualTimer>,
    pub delba: Arc<DelbaLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let timer = ManualTimer::new();
        Self::build(config, timer.clone(), Box::new(timer))
    }

    pub fn uncancellable() -> Self {
        let timer = ManualTimer::new();
        Self::build(EngineConfig::default(), timer.clone(), Box::new(UncancellableTimer(timer)))
    }

    fn build(config: EngineConfig, timer: Arc<ManualTimer>, service: Box<dyn TimerService>) -> Self {
        let recorder = Arc::new(Recorder::default());
        let delba = Arc::new(DelbaLog::new());
        let tx: Box<dyn BlockAckTx> = Box::new(delba.clone());
        let engine = ReorderEngine::new(config, Box::new(recorder.clone()), service, Some(tx));
        Self { engine, recorder, timer, delba }
    }

    /// Establishes `(PEER, tid)` and takes it out of warm-up by admitting
    /// `ssn` itself.
    pub fn open(&self, t: Tid, window: u16, ssn: u16) {
        self.engine.create_or_reset(PEER, t, ws(window), seq(ssn)).unwrap();
        self.engine.establish(PEER, t, true).unwrap();
        self.data(t, ssn);
    }

    pub fn data(&self, t: Tid, n: u16) -> rxba_reorder::RxVerdict {
        self.engine.admit(rxba_core::RxFrame::data(PEER, t, seq(n), n as u32))
    }

    pub fn delivered(&self) -> Vec<u32> {
        self.recorder.payloads()
    }
}
