//! Interrupt and error flag registers

bitflags::bitflags! {
    /// Flags of the CANINTF register, reporting which event classes fired
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterruptFlags: u8 {
        /// Receive buffer 0 full
        const RX0IF = 1 << 0;
        /// Receive buffer 1 full
        const RX1IF = 1 << 1;
        /// Transmit buffer 0 empty
        const TX0IF = 1 << 2;
        /// Transmit buffer 1 empty
        const TX1IF = 1 << 3;
        /// Transmit buffer 2 empty
        const TX2IF = 1 << 4;
        /// Error interrupt; details are in EFLG
        const ERRIF = 1 << 5;
        /// Wake up interrupt
        const WAKIF = 1 << 6;
        /// Message error interrupt
        const MERRF = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Flags of the EFLG register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrorFlags: u8 {
        /// Error warning: TEC or REC reached 96
        const EWARN = 1 << 0;
        /// Receive error warning: REC reached 96
        const RXWAR = 1 << 1;
        /// Transmit error warning: TEC reached 96
        const TXWAR = 1 << 2;
        /// Receive error passive: REC reached 128
        const RXEP = 1 << 3;
        /// Transmit error passive: TEC reached 128
        const TXEP = 1 << 4;
        /// Bus off: TEC reached 255
        const TXBO = 1 << 5;
        /// Receive buffer 0 overflow
        const RX0OVR = 1 << 6;
        /// Receive buffer 1 overflow
        const RX1OVR = 1 << 7;
    }
}

impl ErrorFlags {
    /// Both receive overflow flags
    pub const RX_OVERFLOW: ErrorFlags = ErrorFlags::RX0OVR.union(ErrorFlags::RX1OVR);

    /// Returns true if either receive overflow flag is set
    ///
    /// With RXB0CTRL.BUKT set the data sheet's receive flow chart says an overflow is reported in
    /// RX1OVR, but the chip actually sets RX0OVR. Either flag is taken to mean a frame was lost.
    pub fn rx_overflow(&self) -> bool {
        self.intersects(Self::RX_OVERFLOW)
    }
}

/// The most recently read values of the CANINTF and EFLG registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// CANINTF
    pub interrupts: InterruptFlags,
    /// EFLG
    pub errors: ErrorFlags,
}

impl StatusSnapshot {
    /// A snapshot with no flags set
    pub const EMPTY: StatusSnapshot = StatusSnapshot {
        interrupts: InterruptFlags::empty(),
        errors: ErrorFlags::empty(),
    };

    /// Create a snapshot from raw CANINTF and EFLG register values
    ///
    /// Bits with no defined flag are kept.
    pub const fn from_raw(canintf: u8, eflg: u8) -> Self {
        Self {
            interrupts: InterruptFlags::from_bits_retain(canintf),
            errors: ErrorFlags::from_bits_retain(eflg),
        }
    }

    /// The CANINTF bits which must be cleared with a BIT MODIFY
    ///
    /// The receive flags are excluded: they are cleared by the chip when the buffer is read.
    pub fn clear_mask(&self) -> u8 {
        self.interrupts
            .difference(InterruptFlags::RX0IF | InterruptFlags::RX1IF)
            .bits()
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::EMPTY
    }
}
