//! CAN identifier and frame types

use crate::constants::MAX_DLC;

/// A CAN identifier, either an 11-bit standard ID or a 29-bit extended ID
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    /// An 11-bit standard identifier
    Std(u16),
    /// A 29-bit extended identifier
    Extended(u32),
}

impl CanId {
    /// Largest standard identifier
    pub const MAX_STD: u16 = 0x7FF;
    /// Largest extended identifier
    pub const MAX_EXTENDED: u32 = 0x1FFF_FFFF;

    /// Create a standard ID, discarding any bits above the low 11
    pub const fn std(id: u16) -> Self {
        Self::Std(id & Self::MAX_STD)
    }

    /// Create an extended ID, discarding any bits above the low 29
    pub const fn extended(id: u32) -> Self {
        Self::Extended(id & Self::MAX_EXTENDED)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u32 {
        match self {
            CanId::Std(id) => *id as u32,
            CanId::Extended(id) => *id,
        }
    }

    /// Returns true if this is an extended ID
    pub const fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl core::fmt::Display for CanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CanId::Std(id) => write!(f, "{id:03X}"),
            CanId::Extended(id) => write!(f, "{id:08X}"),
        }
    }
}

/// A classic CAN frame with up to eight bytes of data
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    id: CanId,
    rtr: bool,
    dlc: u8,
    data: [u8; 8],
}

impl CanFrame {
    /// Create a data frame
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than 8 bytes
    pub fn new(id: CanId, data: &[u8]) -> Self {
        assert!(data.len() <= MAX_DLC as usize, "CAN frame data too long");
        let mut buf = [0; 8];
        buf[..data.len()].copy_from_slice(data);
        Self {
            id,
            rtr: false,
            dlc: data.len() as u8,
            data: buf,
        }
    }

    /// Create a remote transmission request frame
    ///
    /// A remote frame carries a data length code but no data. `dlc` is clamped to 8.
    pub fn new_rtr(id: CanId, dlc: u8) -> Self {
        Self {
            id,
            rtr: true,
            dlc: dlc.min(MAX_DLC),
            data: [0; 8],
        }
    }

    /// Get the frame identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Returns true if this is a remote transmission request
    pub fn is_rtr(&self) -> bool {
        self.rtr
    }

    /// Get the data length code
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Get the frame payload
    ///
    /// Remote frames always return an empty slice.
    pub fn data(&self) -> &[u8] {
        if self.rtr {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_masking() {
        assert_eq!(CanId::Std(0x7FF), CanId::std(0xFFFF));
        assert_eq!(CanId::Extended(0x1FFF_FFFF), CanId::extended(0xFFFF_FFFF));
        assert!(CanId::extended(1).is_extended());
        assert!(!CanId::std(1).is_extended());
        assert_eq!(0x123, CanId::std(0x123).raw());
    }

    #[test]
    fn test_rtr_frame_has_no_data() {
        let frame = CanFrame::new_rtr(CanId::std(0x10), 12);
        assert_eq!(8, frame.dlc());
        assert!(frame.data().is_empty());
        assert!(frame.is_rtr());
    }

    #[test]
    fn test_data_frame() {
        let frame = CanFrame::new(CanId::extended(0x1234567), &[1, 2, 3]);
        assert_eq!(3, frame.dlc());
        assert_eq!(&[1, 2, 3], frame.data());
    }

    #[test]
    #[should_panic]
    fn test_oversized_data_panics() {
        CanFrame::new(CanId::std(1), &[0; 9]);
    }
}
