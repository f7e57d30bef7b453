//! J1939 / NMEA 2000 identifier arithmetic
//!
//! A 29-bit identifier is laid out as
//!
//! | Bits 28..26 | Bit 25 | Bit 24 | Bits 23..16 | Bits 15..8   | Bits 7..0      |
//! |-------------|--------|--------|-------------|--------------|----------------|
//! | priority    | EDP    | DP     | PDU format  | PDU specific | source address |
//!
//! When the PDU format is below `0xF0` (PDU1) the PDU specific byte is a destination address and
//! not part of the PGN. Otherwise (PDU2) it's a group extension and belongs to the PGN.

/// Priority used when re-exposing a reassembled broadcast under a synthetic identifier
pub const SYNTHETIC_PRIORITY: u32 = 6;

/// The grouping key that a reassembly sequence lives under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub bus_channel: u8,
    /// Raw identifier, source address, or PGN depending on the protocol
    pub key: u32,
}

#[inline]
#[must_use]
pub fn extract_pgn(identifier: u32) -> u32 {
    // Shift off the src address, and mask off the priority bits, leaving the EDP and DP bits
    let pgn = (identifier >> 8) & 0x3FFFF;
    let pdu_format = (pgn >> 8) & 0xFF;

    // destination-specific range is 00..=EF
    // broadcast range is F0..=FF
    if pdu_format < 0xF0 {
        pgn & 0x3FF00
    } else {
        pgn
    }
}

#[inline]
#[must_use]
pub fn extract_source_address(identifier: u32) -> u8 {
    (identifier & 0xFF) as u8
}

#[inline]
#[must_use]
pub fn reconstruct_j1939_identifier(pgn: u32, source_address: u8) -> u32 {
    (SYNTHETIC_PRIORITY << 26) | ((pgn & 0x3FFFF) << 8) | source_address as u32
}
