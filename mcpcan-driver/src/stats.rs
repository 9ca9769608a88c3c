use portable_atomic::{AtomicU32, Ordering};

/// Interface statistics counters, updated from the transaction chain
#[derive(Debug, Default)]
pub(crate) struct DeviceStats {
    rx_packets: AtomicU32,
    rx_bytes: AtomicU32,
    rx_dropped: AtomicU32,
    rx_over_errors: AtomicU32,
    tx_packets: AtomicU32,
    tx_bytes: AtomicU32,
}

/// A copy of the interface statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// Frames delivered to the frame sink
    pub rx_packets: u32,
    /// Data bytes delivered to the frame sink
    pub rx_bytes: u32,
    /// Frames read from the chip but not delivered
    pub rx_dropped: u32,
    /// Receive buffer overflows reported by the chip
    pub rx_over_errors: u32,
    /// Frames reported sent by the chip
    pub tx_packets: u32,
    /// Data bytes reported sent by the chip
    pub tx_bytes: u32,
}

impl DeviceStats {
    pub const fn new() -> Self {
        Self {
            rx_packets: AtomicU32::new(0),
            rx_bytes: AtomicU32::new(0),
            rx_dropped: AtomicU32::new(0),
            rx_over_errors: AtomicU32::new(0),
            tx_packets: AtomicU32::new(0),
            tx_bytes: AtomicU32::new(0),
        }
    }

    pub fn received(&self, dlc: u8) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(dlc as u32, Ordering::Relaxed);
    }

    pub fn dropped(&self) {
        self.rx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overflowed(&self) {
        self.rx_over_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self, dlc: u8) {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(dlc as u32, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            rx_over_errors: self.rx_over_errors.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
        }
    }
}
