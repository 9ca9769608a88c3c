#![allow(dead_code)]
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Mutex,
};

use mcpcan_common::{
    traits::{FrameSink, MonotonicClock, TransmitQueue},
    BitTiming, CanFrame, DriverConfig,
};
use mcpcan_driver::{Callbacks, DriverError, Mcp2515};

use crate::sim_chip::SimChip;

/// 500 kbit/s from an 8 MHz oscillator
pub const TIMING_500K: BitTiming = BitTiming {
    brp: 1,
    prop_seg: 2,
    phase_seg1: 3,
    phase_seg2: 2,
    sjw: 1,
};

pub fn default_config() -> DriverConfig {
    DriverConfig::new(8_000_000, TIMING_500K)
}

/// A frame sink which records every frame, and can be made to refuse them
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<CanFrame>>,
    refuse: AtomicBool,
}

impl RecordingSink {
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Relaxed);
    }

    pub fn take(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.frames.lock().unwrap())
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl FrameSink for RecordingSink {
    fn deliver(&self, frame: CanFrame) -> Result<(), CanFrame> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err(frame);
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}

/// A transmit queue which records its state and the frames reported sent
#[derive(Default)]
pub struct RecordingQueue {
    stopped: AtomicBool,
    wakes: AtomicUsize,
    completed: Mutex<Vec<CanFrame>>,
}

impl RecordingQueue {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn wake_count(&self) -> usize {
        self.wakes.load(Ordering::Relaxed)
    }

    pub fn take_completed(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.completed.lock().unwrap())
    }

    pub fn completed_count(&self) -> usize {
        self.completed.lock().unwrap().len()
    }
}

impl TransmitQueue for RecordingQueue {
    fn stop_queue(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    fn wake_queue(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
        self.stopped.store(false, Ordering::Relaxed);
    }

    fn transmit_complete(&self, frame: CanFrame) {
        self.completed.lock().unwrap().push(frame);
    }
}

/// A clock which advances by a fixed step every time it is read
pub struct StepClock {
    now: AtomicU64,
    step_us: u64,
}

impl StepClock {
    pub fn new(step_us: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            step_us,
        }
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MonotonicClock for StepClock {
    fn now_us(&self) -> u64 {
        self.now.fetch_add(self.step_us, Ordering::Relaxed)
    }
}

/// Records calls to the board hooks
#[derive(Default)]
pub struct BoardLog {
    events: Mutex<Vec<(&'static str, bool)>>,
}

impl BoardLog {
    pub fn push(&self, hook: &'static str, on: bool) {
        self.events.lock().unwrap().push((hook, on));
    }

    pub fn take(&self) -> Vec<(&'static str, bool)> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

/// A simulated chip with a full set of recording collaborators
#[derive(Default)]
pub struct Harness {
    pub chip: SimChip,
    pub sink: RecordingSink,
    pub queue: RecordingQueue,
    pub clock: StepClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self, config: DriverConfig) -> Result<Mcp2515<'_, SimChip>, DriverError> {
        Mcp2515::probe(
            &self.chip,
            config,
            &self.sink,
            &self.queue,
            &self.clock,
            Callbacks::new(),
        )
    }

    /// Probe and open with the default configuration, then settle the kick-off flag read
    pub fn open_default(&self) -> Mcp2515<'_, SimChip> {
        let can = self.probe(default_config()).unwrap();
        can.open().unwrap();
        self.chip.run_until_idle(&can);
        self.chip.take_submitted();
        self.chip.take_submitted_bytes();
        self.chip.take_writes();
        can
    }
}

/// Install a logger for the test binary; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
