//! Transport protocol framing rules
//!
//! Three segmentation schemes are supported. They all split one message into a first frame
//! carrying the declared total length, followed by consecutive frames tagged with a counter in
//! their first byte.
//!
//! # ISO 15765-2 (UDS)
//!
//! | Byte 1 MS Nibble | Byte 1 LS Nibble     | Byte 2     | Bytes 3 .. 8 |
//! |------------------|----------------------|------------|--------------|
//! | `0x0` single     | length               | data ..    |              |
//! | `0x1` first      | length (bits 11..8)  | length     | data         |
//! | `0x2` consec.    | counter              | data ..    |              |
//!
//! # SAE J1939-21 Broadcast Announce Message
//!
//! A TP.CM (PGN `0xEC00`) with control byte `0x20`, whose bytes 2..3 are the little-endian total
//! length and bytes 6..8 the little-endian PGN being transferred, followed by TP.DT frames (PGN
//! `0xEB00`) whose first byte is the sequence number.
//!
//! # NMEA 2000 Fast Packet
//!
//! | Byte 1 bits 4..0 | Byte 1 bits 7..5 | Byte 2     | Bytes 3 .. 8 |
//! |------------------|------------------|------------|--------------|
//! | frame ctr == 0   | sequence id      | length     | data         |
//! | frame ctr        | sequence id      | data ..    |              |
use std::collections::BTreeSet;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::frame::RawFrame;
use crate::ident::{GroupKey, extract_pgn, extract_source_address};

/// TP.CM Connection Management
pub const TP_CM_PGN: u32 = 0xEC00;
/// TP.DT Data Transfer
pub const TP_DT_PGN: u32 = 0xEB00;

/// The protocol tag selecting which framing rules to reassemble with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Pass everything through untouched
    #[default]
    None,
    Uds,
    J1939,
    Nmea,
}

/// A byte-0 test: `byte & mask == value`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMatch {
    pub mask: u8,
    pub value: u8,
}

impl FrameMatch {
    const fn new(mask: u8, value: u8) -> Self {
        Self { mask, value }
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, byte: u8) -> bool {
        byte & self.mask == self.value
    }
}

/// What reassembly sequences are keyed on, within a bus channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grouping {
    Identifier,
    SourceAddress,
    Pgn,
}

/// Where a first frame keeps the declared total message length
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredLength {
    /// 12 bits across the low nibble of byte 0 and all of byte 1
    IsoTp,
    /// byte 1
    FastPacket,
    /// little-endian u16 in bytes 1..3
    Bam,
}

impl DeclaredLength {
    #[must_use]
    pub fn read(&self, data: &[u8]) -> Option<usize> {
        match self {
            DeclaredLength::IsoTp => {
                let high = (*data.first()? & 0x0F) as usize;
                let low = *data.get(1)? as usize;
                Some((high << 8) | low)
            }
            DeclaredLength::FastPacket => data.get(1).map(|b| *b as usize),
            DeclaredLength::Bam => data.get(1..3).map(|b| LittleEndian::read_u16(b) as usize),
        }
    }
}

/// How a single frame was classified by [Framing::classify]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Single,
    First,
    Consecutive,
    /// Connection management that isn't a broadcast announcement
    Control,
    Malformed,
}

/// The constant framing rules for one [Protocol]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Framing {
    pub single: FrameMatch,
    pub first: FrameMatch,
    pub consecutive: FrameMatch,
    /// Whether [Framing::single] is evaluated at all
    pub single_frames: bool,
    /// Bits of byte 0 that hold the consecutive frame counter
    pub counter_mask: u8,
    pub first_payload_offset: usize,
    pub consecutive_payload_offset: usize,
    pub broadcast_pgn: Option<u32>,
    pub grouping: Grouping,
    pub length: DeclaredLength,
}

pub const UDS_FRAMING: Framing = Framing {
    single: FrameMatch::new(0xF0, 0x00),
    first: FrameMatch::new(0xF0, 0x10),
    consecutive: FrameMatch::new(0xF0, 0x20),
    single_frames: true,
    counter_mask: 0x0F,
    first_payload_offset: 2,
    consecutive_payload_offset: 1,
    broadcast_pgn: None,
    grouping: Grouping::Identifier,
    length: DeclaredLength::IsoTp,
};

pub const J1939_FRAMING: Framing = Framing {
    single: FrameMatch::new(0xFF, 0xFF),
    first: FrameMatch::new(0xFF, 0x20),
    consecutive: FrameMatch::new(0x00, 0x00),
    // TP.DT sequence numbers run up to 255, so 0xFF/0xFF would swallow the last packet
    single_frames: false,
    counter_mask: 0xFF,
    first_payload_offset: 8,
    consecutive_payload_offset: 1,
    broadcast_pgn: Some(TP_CM_PGN),
    grouping: Grouping::SourceAddress,
    length: DeclaredLength::Bam,
};

pub const NMEA_FRAMING: Framing = Framing {
    single: FrameMatch::new(0xFF, 0xFF),
    first: FrameMatch::new(0x1F, 0x00),
    consecutive: FrameMatch::new(0x00, 0x00),
    single_frames: false,
    counter_mask: 0x1F,
    first_payload_offset: 2,
    consecutive_payload_offset: 1,
    broadcast_pgn: None,
    grouping: Grouping::Pgn,
    length: DeclaredLength::FastPacket,
};

impl Protocol {
    /// Parse a protocol tag, falling back to [Protocol::None] for anything unrecognized
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "uds" => Protocol::Uds,
            "j1939" => Protocol::J1939,
            "nmea" => Protocol::Nmea,
            "" | "none" => Protocol::None,
            other => {
                tracing::warn!("Unknown protocol tag {other:?}; passing all frames through");
                Protocol::None
            }
        }
    }

    #[must_use]
    pub const fn framing(self) -> Option<&'static Framing> {
        match self {
            Protocol::None => None,
            Protocol::Uds => Some(&UDS_FRAMING),
            Protocol::J1939 => Some(&J1939_FRAMING),
            Protocol::Nmea => Some(&NMEA_FRAMING),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Protocol::None => "none",
            Protocol::Uds => "uds",
            Protocol::J1939 => "j1939",
            Protocol::Nmea => "nmea",
        };
        f.write_str(tag)
    }
}

impl Framing {
    /// The key tested against the response set: the raw identifier, or its PGN
    #[inline]
    #[must_use]
    pub fn match_key(&self, identifier: u32) -> u32 {
        match self.grouping {
            Grouping::Identifier => identifier,
            Grouping::SourceAddress | Grouping::Pgn => extract_pgn(identifier),
        }
    }

    #[inline]
    #[must_use]
    pub fn group_key(&self, frame: &RawFrame) -> GroupKey {
        let key = match self.grouping {
            Grouping::Identifier => frame.identifier,
            Grouping::SourceAddress => extract_source_address(frame.identifier) as u32,
            Grouping::Pgn => extract_pgn(frame.identifier),
        };
        GroupKey {
            bus_channel: frame.bus_channel,
            key,
        }
    }

    #[inline]
    #[must_use]
    fn is_broadcast(&self, frame: &RawFrame) -> bool {
        self.broadcast_pgn == Some(extract_pgn(frame.identifier))
    }

    /// Classify a frame, testing single before first before consecutive
    #[must_use]
    pub fn classify(&self, frame: &RawFrame) -> FrameKind {
        let Some(&byte) = frame.data().first() else {
            return FrameKind::Malformed;
        };

        if self.broadcast_pgn.is_some() {
            // Broadcast protocols announce on one PGN and transfer on another, so the PGN picks
            // the frame kind as much as the first byte does.
            return if !self.is_broadcast(frame) {
                if self.single_frames && self.single.matches(byte) {
                    FrameKind::Single
                } else if self.consecutive.matches(byte) {
                    FrameKind::Consecutive
                } else {
                    FrameKind::Malformed
                }
            } else if self.first.matches(byte) {
                FrameKind::First
            } else {
                FrameKind::Control
            };
        }

        if self.single_frames && self.single.matches(byte) {
            FrameKind::Single
        } else if self.first.matches(byte) {
            FrameKind::First
        } else if self.consecutive.matches(byte) {
            FrameKind::Consecutive
        } else {
            FrameKind::Malformed
        }
    }

    #[inline]
    #[must_use]
    pub fn counter(&self, frame: &RawFrame) -> u8 {
        frame.data().first().copied().unwrap_or_default() & self.counter_mask
    }

    /// The counter value expected after `previous`, wrapping within [Framing::counter_mask]
    #[inline]
    #[must_use]
    pub fn next_counter(&self, previous: u8) -> u8 {
        previous.wrapping_add(1) & self.counter_mask
    }
}

/// A [Protocol] together with the identifiers (or PGNs) that are eligible for reassembly
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProtocolProfile {
    pub protocol: Protocol,
    pub response_ids: BTreeSet<u32>,
}

impl ProtocolProfile {
    /// Build a profile for the given protocol
    ///
    /// J1939 with no response PGNs given defaults to TP.DT, because that's where every BAM
    /// transfers its data.
    pub fn new<I: IntoIterator<Item = u32>>(protocol: Protocol, response_ids: I) -> Self {
        let mut response_ids: BTreeSet<u32> = response_ids.into_iter().collect();
        if protocol == Protocol::J1939 && response_ids.is_empty() {
            response_ids.insert(TP_DT_PGN);
        }
        Self {
            protocol,
            response_ids,
        }
    }

    pub fn from_tag<I: IntoIterator<Item = u32>>(tag: &str, response_ids: I) -> Self {
        Self::new(Protocol::from_tag(tag), response_ids)
    }

    /// The identity profile passes every frame through untouched
    pub fn identity() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.protocol == Protocol::None
    }

    #[inline]
    #[must_use]
    pub fn framing(&self) -> Option<&'static Framing> {
        self.protocol.framing()
    }

    /// Determine if the given frame should be handed to the reassembler
    #[must_use]
    pub fn accepts_frame(&self, frame: &RawFrame) -> bool {
        let Some(framing) = self.framing() else {
            return false;
        };
        let key = framing.match_key(frame.identifier);
        self.response_ids.contains(&key) || framing.broadcast_pgn == Some(key)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frame(identifier: u32, data: &[u8]) -> RawFrame {
        RawFrame::new(0.0, 0, identifier, data.to_vec())
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Protocol::from_tag("uds"), Protocol::Uds);
        assert_eq!(Protocol::from_tag(" J1939 "), Protocol::J1939);
        assert_eq!(Protocol::from_tag("nmea"), Protocol::Nmea);
        assert_eq!(Protocol::from_tag(""), Protocol::None);
        assert_eq!(Protocol::from_tag("kwp2000"), Protocol::None);
        assert_eq!(Protocol::None.framing(), None);
    }

    #[test]
    fn test_j1939_defaults_to_tp_dt() {
        let profile = ProtocolProfile::from_tag("j1939", []);
        assert_eq!(profile.response_ids, BTreeSet::from([TP_DT_PGN]));

        let profile = ProtocolProfile::from_tag("uds", []);
        assert!(profile.response_ids.is_empty());
        assert!(!profile.is_identity());
        assert!(ProtocolProfile::identity().is_identity());
    }

    #[test]
    fn test_accepts_frame() {
        let uds = ProtocolProfile::from_tag("uds", [0x7E9]);
        assert!(uds.accepts_frame(&frame(0x7E9, &[0x10])));
        assert!(!uds.accepts_frame(&frame(0x7E8, &[0x10])));

        let j1939 = ProtocolProfile::from_tag("j1939", []);
        assert!(j1939.accepts_frame(&frame(0x1CECFFA4, &[0x20])));
        assert!(j1939.accepts_frame(&frame(0x1CEBFFA4, &[0x01])));
        assert!(j1939.accepts_frame(&frame(0x18EB1CF5, &[0x01])));
        assert!(!j1939.accepts_frame(&frame(0x18FEDAA4, &[0x01])));

        let nmea = ProtocolProfile::from_tag("nmea", [0x1F805]);
        assert!(nmea.accepts_frame(&frame(0x0DF805FE, &[0xA0])));
        assert!(!nmea.accepts_frame(&frame(0x09F8011C, &[0xA0])));

        let identity = ProtocolProfile::identity();
        assert!(!identity.accepts_frame(&frame(0x7E9, &[0x10])));
    }

    #[test]
    fn test_classify_uds() {
        let f = &UDS_FRAMING;
        assert_eq!(f.classify(&frame(0x7E9, &[0x03, 0x41, 0x0D])), FrameKind::Single);
        assert_eq!(f.classify(&frame(0x7E9, &[0x10, 0x14])), FrameKind::First);
        assert_eq!(f.classify(&frame(0x7E9, &[0x21])), FrameKind::Consecutive);
        assert_eq!(f.classify(&frame(0x7E9, &[0x30, 0x00])), FrameKind::Malformed);
        assert_eq!(f.classify(&frame(0x7E9, &[])), FrameKind::Malformed);
    }

    #[test]
    fn test_classify_j1939() {
        let f = &J1939_FRAMING;
        // TP.CM_BAM
        assert_eq!(f.classify(&frame(0x1CECFFA4, &[0x20, 0x1F, 0x00])), FrameKind::First);
        // TP.CM_RTS
        assert_eq!(f.classify(&frame(0x18ECF9A4, &[0x10, 0x1F, 0x00])), FrameKind::Control);
        // TP.DT, including sequence numbers that look like control bytes
        assert_eq!(f.classify(&frame(0x1CEBFFA4, &[0x01])), FrameKind::Consecutive);
        assert_eq!(f.classify(&frame(0x1CEBFFA4, &[0x20])), FrameKind::Consecutive);
        assert_eq!(f.classify(&frame(0x1CEBFFA4, &[0xFF])), FrameKind::Consecutive);
    }

    #[test]
    fn test_classify_nmea() {
        let f = &NMEA_FRAMING;
        assert_eq!(f.classify(&frame(0x0DF805FE, &[0xA0, 0x2B])), FrameKind::First);
        assert_eq!(f.classify(&frame(0x0DF805FE, &[0x00, 0x2B])), FrameKind::First);
        assert_eq!(f.classify(&frame(0x0DF805FE, &[0xA1])), FrameKind::Consecutive);
        // 0xFF would be a single frame if that test were evaluated
        assert_eq!(f.classify(&frame(0x0DF805FE, &[0xFF])), FrameKind::Consecutive);
    }

    #[test]
    fn test_declared_length() {
        assert_eq!(DeclaredLength::IsoTp.read(&[0x10, 0x14]), Some(20));
        assert_eq!(DeclaredLength::IsoTp.read(&[0x1F, 0xFF]), Some(4095));
        assert_eq!(DeclaredLength::IsoTp.read(&[0x10]), None);
        assert_eq!(DeclaredLength::FastPacket.read(&[0xA0, 0x2B]), Some(43));
        assert_eq!(DeclaredLength::Bam.read(&[0x20, 0x1F, 0x00, 0x05]), Some(31));
        assert_eq!(DeclaredLength::Bam.read(&[0x20, 0x09, 0x01]), Some(265));
        assert_eq!(DeclaredLength::Bam.read(&[0x20, 0x09]), None);
    }

    #[test]
    fn test_counter_wraps_within_mask() {
        assert_eq!(UDS_FRAMING.next_counter(0x0F), 0x00);
        assert_eq!(UDS_FRAMING.next_counter(0x03), 0x04);
        assert_eq!(NMEA_FRAMING.next_counter(0x1F), 0x00);
        assert_eq!(J1939_FRAMING.next_counter(0xFF), 0x00);
        assert_eq!(UDS_FRAMING.counter(&frame(0x7E9, &[0x2F])), 0x0F);
        assert_eq!(NMEA_FRAMING.counter(&frame(0x0DF805FE, &[0xA3])), 0x03);
    }

    #[test]
    fn test_overlapping_single_wins() {
        // first and consecutive match every byte
        let f = Framing {
            first: FrameMatch::new(0x00, 0x00),
            consecutive: FrameMatch::new(0x00, 0x00),
            ..UDS_FRAMING
        };
        assert_eq!(f.classify(&frame(0x7E9, &[0x03, 0x41, 0x0D])), FrameKind::Single);
        assert_eq!(f.classify(&frame(0x7E9, &[0x21, 0x41])), FrameKind::First);
    }

    #[test]
    fn test_overlapping_first_wins_over_consecutive() {
        let f = Framing {
            consecutive: FrameMatch::new(0xF0, 0x10),
            ..UDS_FRAMING
        };
        assert_eq!(f.classify(&frame(0x7E9, &[0x10, 0x14])), FrameKind::First);
        assert_eq!(f.classify(&frame(0x7E9, &[0x02, 0x10])), FrameKind::Single);
    }
}
