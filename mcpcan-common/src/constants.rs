//! Constants defining the MCP2515 SPI instruction set and register map
//!
//! References: Microchip MCP2515 data sheet, DS21801E.

/// SPI instruction opcodes
pub mod instructions {
    /// Write one or more sequential registers
    pub const WRITE: u8 = 0x02;
    /// Read one or more sequential registers
    pub const READ: u8 = 0x03;
    /// Modify the bits selected by a mask in a single register
    pub const BIT_MODIFY: u8 = 0x05;
    /// Reset all registers to their defaults and enter configuration mode
    pub const RESET: u8 = 0xC0;

    /// Load transmit buffer `n`, starting at TXBnSIDH
    pub const fn load_tx_buffer(n: u8) -> u8 {
        0x40 + (n << 1)
    }

    /// Request to send transmit buffer `n`
    pub const fn request_to_send(n: u8) -> u8 {
        0x80 + (1 << n)
    }

    /// Read receive buffer `n`, starting at RXBnSIDH
    ///
    /// Reading a buffer with this instruction clears its RXnIF flag when chip select is released.
    pub const fn read_rx_buffer(n: u8) -> u8 {
        0x90 + (n << 2)
    }
}

/// Register addresses
pub mod registers {
    /// CAN status register; the upper three bits report the current operating mode
    pub const CANSTAT: u8 = 0x0E;
    /// CAN control register; the upper three bits request an operating mode
    pub const CANCTRL: u8 = 0x0F;
    /// Transmit error counter
    pub const TEC: u8 = 0x1C;
    /// Receive error counter
    pub const REC: u8 = 0x1D;
    /// Bit timing configuration 3. CNF2, CNF1 and CANINTE follow sequentially.
    pub const CNF3: u8 = 0x28;
    /// Bit timing configuration 2
    pub const CNF2: u8 = 0x29;
    /// Bit timing configuration 1
    pub const CNF1: u8 = 0x2A;
    /// Interrupt enable register
    pub const CANINTE: u8 = 0x2B;
    /// Interrupt flag register
    pub const CANINTF: u8 = 0x2C;
    /// Error flag register
    pub const EFLG: u8 = 0x2D;
    /// Transmit buffer 0 control register; the buffer contents follow at TXB0SIDH
    pub const TXB0CTRL: u8 = 0x30;
    /// Receive buffer 0 control register
    pub const RXB0CTRL: u8 = 0x60;
    /// Receive buffer 1 control register
    pub const RXB1CTRL: u8 = 0x70;
}

/// CANCTRL register fields
pub mod canctrl {
    /// Mask of the REQOP (requested operating mode) bits
    pub const REQOP_MASK: u8 = 0xE0;
    /// One shot mode: do not retry a failed transmission
    pub const OSM: u8 = 1 << 3;
    /// Abort all pending transmissions
    pub const ABAT: u8 = 1 << 4;
}

/// CNF2 register fields
pub mod cnf2 {
    /// PS2 length is taken from CNF3 instead of being derived from PS1
    pub const BTLMODE: u8 = 1 << 7;
    /// Sample the bus three times per bit
    pub const SAM: u8 = 1 << 6;
}

/// CANINTE register fields
pub mod caninte {
    /// Receive buffer 0 full
    pub const RX0IE: u8 = 1 << 0;
    /// Receive buffer 1 full
    pub const RX1IE: u8 = 1 << 1;
    /// Transmit buffer 0 empty
    pub const TX0IE: u8 = 1 << 2;
    /// Transmit buffer 1 empty
    pub const TX1IE: u8 = 1 << 3;
    /// Transmit buffer 2 empty
    pub const TX2IE: u8 = 1 << 4;
    /// Error (EFLG) interrupt
    pub const ERRIE: u8 = 1 << 5;
    /// Wake up interrupt
    pub const WAKIE: u8 = 1 << 6;
    /// Message error interrupt
    pub const MERRE: u8 = 1 << 7;
    /// All receive interrupts
    pub const RX: u8 = RX0IE | RX1IE;
    /// All transmit interrupts
    pub const TX: u8 = TX0IE | TX1IE | TX2IE;
    /// The error interrupt
    pub const ERR: u8 = ERRIE;
}

/// RXBnCTRL register fields
pub mod rxbctrl {
    /// Roll a message over into RXB1 when RXB0 is full (RXB0CTRL only)
    pub const BUKT: u8 = 1 << 2;
    /// Receive buffer operating mode bit 0
    pub const RXM0: u8 = 1 << 5;
    /// Receive buffer operating mode bit 1
    pub const RXM1: u8 = 1 << 6;
}

/// Receive and transmit buffer layout fields
///
/// A buffer is 13 bytes long: SIDH, SIDL, EID8, EID0, DLC and eight data bytes.
pub mod buffer {
    /// Length of a buffer without its instruction byte
    pub const LEN: usize = 13;
    /// Length of the buffer header (identifier and DLC registers)
    pub const HEADER_LEN: usize = 5;
    /// SIDL: extended identifier enable
    pub const SIDL_IDE: u8 = 1 << 3;
    /// RXBnSIDL: standard frame remote transmit request received
    pub const SIDL_SRR: u8 = 1 << 4;
    /// DLC: remote transmit request
    pub const DLC_RTR: u8 = 1 << 6;
    /// DLC: data length code bits
    pub const DLC_MASK: u8 = 0x0F;
}

/// Power-on detection masks
///
/// After a reset the chip reports configuration mode in CANSTAT and a fixed pattern in CANCTRL.
/// Checking them avoids mistaking an all zeroes or all ones bus for a chip.
pub mod detect {
    /// Bits of CANSTAT compared after reset
    pub const CANSTAT_MASK: u8 = 0xEE;
    /// Expected value of the CANSTAT bits
    pub const CANSTAT_EXPECTED: u8 = 0x80;
    /// Bits of CANCTRL compared after reset
    pub const CANCTRL_MASK: u8 = 0x17;
    /// Expected value of the CANCTRL bits
    pub const CANCTRL_EXPECTED: u8 = 0x07;
}

/// Largest data length of a classic CAN frame
pub const MAX_DLC: u8 = 8;

#[cfg(test)]
mod tests {
    use super::instructions::*;

    #[test]
    fn test_buffer_instructions() {
        assert_eq!(0x40, load_tx_buffer(0));
        assert_eq!(0x42, load_tx_buffer(1));
        assert_eq!(0x44, load_tx_buffer(2));
        assert_eq!(0x81, request_to_send(0));
        assert_eq!(0x82, request_to_send(1));
        assert_eq!(0x84, request_to_send(2));
        assert_eq!(0x90, read_rx_buffer(0));
        assert_eq!(0x94, read_rx_buffer(1));
    }
}
