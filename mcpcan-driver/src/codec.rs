//! Conversion between CAN frames and the chip's transmit/receive buffer layout
//!
//! A buffer is SIDH, SIDL, EID8, EID0, DLC followed by up to eight data bytes. The receive and
//! transmit layouts are not symmetric for remote frames: a received standard frame reports RTR in
//! SIDL.SRR, while extended frames and all transmitted frames carry it in DLC.RTR.
use mcpcan_common::{
    constants::{buffer, MAX_DLC},
    CanFrame, CanId,
};

/// Length of a READ RX BUFFER transaction: instruction, header and eight data bytes
pub const RX_RESPONSE_LEN: usize = 1 + buffer::LEN;

/// Pack an identifier into the SIDH, SIDL, EID8 and EID0 registers
fn encode_id(id: CanId) -> [u8; 4] {
    match id {
        CanId::Extended(id) => [
            (id >> 21) as u8,
            ((id >> 13) & 0xE0) as u8 | buffer::SIDL_IDE | ((id >> 16) & 0x03) as u8,
            (id >> 8) as u8,
            id as u8,
        ],
        CanId::Std(id) => [(id >> 3) as u8, (id << 5) as u8, 0, 0],
    }
}

/// Write `frame` into `buf` in transmit buffer layout, starting at TXBnSIDH
///
/// Returns the number of bytes to load: the header plus one byte per data length code.
pub fn encode_tx_buffer(frame: &CanFrame, buf: &mut [u8; buffer::LEN]) -> usize {
    buf[..4].copy_from_slice(&encode_id(frame.id()));

    let dlc = frame.dlc().min(MAX_DLC);
    buf[4] = dlc;
    if frame.is_rtr() {
        buf[4] |= buffer::DLC_RTR;
    }

    let data = &mut buf[buffer::HEADER_LEN..];
    data.fill(0);
    data[..frame.data().len()].copy_from_slice(frame.data());

    buffer::HEADER_LEN + dlc as usize
}

/// Decode the response of a READ RX BUFFER transaction
///
/// `rx` holds the bytes clocked in during the whole transaction, so index 0 is the (meaningless)
/// byte received while the instruction was sent. Returns None if the response is too short.
pub fn decode_rx_response(rx: &[u8]) -> Option<CanFrame> {
    if rx.len() < RX_RESPONSE_LEN {
        return None;
    }
    let (sidh, sidl, eid8, eid0, dlc) = (rx[1], rx[2], rx[3], rx[4], rx[5]);

    let (id, rtr) = if sidl & buffer::SIDL_IDE != 0 {
        let id = (sidh as u32) << 21
            | ((sidl & 0xE0) as u32) << 13
            | ((sidl & 0x03) as u32) << 16
            | (eid8 as u32) << 8
            | eid0 as u32;
        (CanId::Extended(id), dlc & buffer::DLC_RTR != 0)
    } else {
        let id = (sidh as u16) << 3 | (sidl >> 5) as u16;
        (CanId::Std(id), sidl & buffer::SIDL_SRR != 0)
    };

    let len = (dlc & buffer::DLC_MASK).min(MAX_DLC);
    if rtr {
        Some(CanFrame::new_rtr(id, len))
    } else {
        let start = 1 + buffer::HEADER_LEN;
        Some(CanFrame::new(id, &rx[start..start + len as usize]))
    }
}
