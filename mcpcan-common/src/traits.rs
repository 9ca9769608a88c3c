//! Traits for the collaborators of the driver

use crate::messages::CanFrame;

/// Access to the SPI bus the chip is attached to
///
/// The blocking methods are only used while the interface is brought up or down, or to read the
/// error counters. During normal operation every transaction is started with [`SpiBus::submit`]
/// and never waited for.
pub trait SpiBus: Sync {
    /// The error type returned when a transfer cannot be performed or started
    type Error: core::fmt::Debug;

    /// Write `tx` to the chip, blocking until complete
    fn write(&self, tx: &[u8]) -> Result<(), Self::Error>;

    /// Write `tx`, then clock in `rx.len()` bytes, as one chip-select cycle, blocking until complete
    fn write_then_read(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Start a full duplex transfer of `tx` without waiting for it
    ///
    /// The implementation must copy `tx` before returning. When the transfer finishes it must
    /// deliver the bytes clocked in, the same number as were sent, to the driver's
    /// `transfer_complete` method. That call may come from any context, but must not be made from
    /// within `submit` itself.
    ///
    /// Returning an error means the transfer was not started and no completion will follow.
    fn submit(&self, tx: &[u8]) -> Result<(), Self::Error>;
}

/// Receiver for frames read from the chip, usually the host network stack
pub trait FrameSink: Sync {
    /// Pass a received frame up
    ///
    /// Returns the frame back if no buffer could be allocated for it; the frame is then dropped
    /// and counted.
    fn deliver(&self, frame: CanFrame) -> Result<(), CanFrame>;
}

/// Control of the host transmit queue feeding the driver
///
/// The chip has a single transmit buffer in use, so the queue is stopped whenever a frame is
/// accepted, and woken once the chip reports it sent.
pub trait TransmitQueue: Sync {
    /// Stop handing frames to the driver
    fn stop_queue(&self);

    /// Resume handing frames to the driver
    fn wake_queue(&self);

    /// The frame was sent on the bus
    ///
    /// This is the echo of the frame back to the stack, and the end of the driver's ownership of it.
    fn transmit_complete(&self, frame: CanFrame);
}

/// A monotonic time source for the bounded waits of interface start and stop
pub trait MonotonicClock: Sync {
    /// Current time in microseconds
    fn now_us(&self) -> u64;

    /// Called between polls while waiting; may yield to other threads
    fn relax(&self) {}
}

/// A [`MonotonicClock`] based on [`std::time::Instant`]
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Create a new clock counting from now
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl MonotonicClock for StdClock {
    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}
