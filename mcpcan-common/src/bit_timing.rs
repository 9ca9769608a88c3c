//! Bit timing parameters and their encoding into the CNF registers
//!
//! Computing timing parameters from a nominal bitrate is left to the caller; this module only
//! checks a given set of parameters against the limits of the chip and packs them.

use snafu::{ensure, Snafu};

use crate::constants::cnf2::{BTLMODE, SAM};

/// Limits of the MCP2515 bit timing logic, in time quanta
pub mod limits {
    /// Minimum TSEG1 (propagation + phase 1 segments)
    pub const TSEG1_MIN: u8 = 2;
    /// Maximum TSEG1 (propagation + phase 1 segments)
    pub const TSEG1_MAX: u8 = 16;
    /// Minimum propagation or phase 1 segment
    pub const SEG_MIN: u8 = 1;
    /// Maximum propagation or phase 1 segment
    pub const SEG_MAX: u8 = 8;
    /// Minimum phase 2 segment
    pub const TSEG2_MIN: u8 = 2;
    /// Maximum phase 2 segment
    pub const TSEG2_MAX: u8 = 8;
    /// Maximum synchronization jump width
    pub const SJW_MAX: u8 = 4;
    /// Minimum baud rate prescaler
    pub const BRP_MIN: u8 = 1;
    /// Maximum baud rate prescaler
    pub const BRP_MAX: u8 = 64;
}

/// Error returned by [`BitTiming::validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitTimingError {
    /// Baud rate prescaler outside 1..=64
    #[snafu(display("Baud rate prescaler {value} is outside 1..=64"))]
    Prescaler {
        /// The offending value
        value: u8,
    },
    /// Propagation segment outside 1..=8
    #[snafu(display("Propagation segment {value} is outside 1..=8"))]
    PropagationSegment {
        /// The offending value
        value: u8,
    },
    /// Phase segment 1 outside 1..=8
    #[snafu(display("Phase segment 1 {value} is outside 1..=8"))]
    PhaseSegment1 {
        /// The offending value
        value: u8,
    },
    /// Propagation plus phase segment 1 outside 2..=16
    #[snafu(display("TSEG1 {value} is outside 2..=16"))]
    Tseg1 {
        /// The offending value
        value: u8,
    },
    /// Phase segment 2 outside 2..=8
    #[snafu(display("Phase segment 2 {value} is outside 2..=8"))]
    PhaseSegment2 {
        /// The offending value
        value: u8,
    },
    /// Synchronization jump width outside 1..=4
    #[snafu(display("Synchronization jump width {value} is outside 1..=4"))]
    JumpWidth {
        /// The offending value
        value: u8,
    },
}

/// Bit timing parameters, all in time quanta except the prescaler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
pub struct BitTiming {
    /// Baud rate prescaler
    pub brp: u8,
    /// Propagation segment
    pub prop_seg: u8,
    /// Phase buffer segment 1
    pub phase_seg1: u8,
    /// Phase buffer segment 2
    pub phase_seg2: u8,
    /// Synchronization jump width
    pub sjw: u8,
}

impl BitTiming {
    /// Check all parameters against the limits of the chip
    pub fn validate(&self) -> Result<(), BitTimingError> {
        use limits::*;
        ensure!(
            (BRP_MIN..=BRP_MAX).contains(&self.brp),
            PrescalerSnafu { value: self.brp }
        );
        ensure!(
            (SEG_MIN..=SEG_MAX).contains(&self.prop_seg),
            PropagationSegmentSnafu {
                value: self.prop_seg
            }
        );
        ensure!(
            (SEG_MIN..=SEG_MAX).contains(&self.phase_seg1),
            PhaseSegment1Snafu {
                value: self.phase_seg1
            }
        );
        let tseg1 = self.prop_seg + self.phase_seg1;
        ensure!(
            (TSEG1_MIN..=TSEG1_MAX).contains(&tseg1),
            Tseg1Snafu { value: tseg1 }
        );
        ensure!(
            (TSEG2_MIN..=TSEG2_MAX).contains(&self.phase_seg2),
            PhaseSegment2Snafu {
                value: self.phase_seg2
            }
        );
        ensure!(
            (1..=SJW_MAX).contains(&self.sjw),
            JumpWidthSnafu { value: self.sjw }
        );
        Ok(())
    }

    /// Number of time quanta in one bit
    pub fn quanta_per_bit(&self) -> u32 {
        1 + self.prop_seg as u32 + self.phase_seg1 as u32 + self.phase_seg2 as u32
    }

    /// Encode the parameters as the values of CNF3, CNF2 and CNF1, in register address order
    ///
    /// The parameters must have been validated.
    pub fn cnf_registers(&self, triple_sampling: bool) -> [u8; 3] {
        let cnf3 = self.phase_seg2 - 1;
        let mut cnf2 = BTLMODE | ((self.phase_seg1 - 1) << 3) | (self.prop_seg - 1);
        if triple_sampling {
            cnf2 |= SAM;
        }
        let cnf1 = ((self.sjw - 1) << 6) | (self.brp - 1);
        [cnf3, cnf2, cnf1]
    }
}
