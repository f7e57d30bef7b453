use std::io::Write;

use serde::ser::SerializeStruct;

/// One observed CAN frame, or a message reassembled from several of them
///
/// Classic CAN frames carry at most 8 bytes, but reassembled frames are arbitrarily sized. Both
/// share this one shape so that the downstream decoder doesn't need to care which one it got.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFrame {
    pub timestamp: f64,
    pub bus_channel: u8,
    pub identifier: u32,

    payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(timestamp: f64, bus_channel: u8, identifier: u32, payload: Vec<u8>) -> Self {
        Self {
            timestamp,
            bus_channel,
            identifier,
            payload,
        }
    }

    /// Build a new frame using this one as the template for the timestamp and bus channel
    #[must_use]
    pub fn with_payload(&self, identifier: u32, payload: Vec<u8>) -> Self {
        Self {
            timestamp: self.timestamp,
            bus_channel: self.bus_channel,
            identifier,
            payload,
        }
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    #[must_use]
    pub fn data_length(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.payload
    }

    /// Write the frame in `candump -L` format
    ///
    /// Identifiers that fit in 11 bits are written with 3 hex digits, and everything else with 8,
    /// the same way can-utils distinguishes standard and extended frames.
    ///
    /// [RawFrame] doesn't track the extended flag, so a 29-bit identifier at or below `0x7FF` is
    /// written, and read back, as a standard frame.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let canid = if self.identifier <= 0x7FF {
            format!("{:03X}", self.identifier)
        } else {
            format!("{:08X}", self.identifier)
        };
        writeln!(
            writer,
            "({:.6}) can{} {}#{}",
            self.timestamp,
            self.bus_channel,
            canid,
            hex::encode_upper(self.data())
        )
    }
}

impl serde::Serialize for RawFrame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RawFrame", 5)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("bus_channel", &self.bus_channel)?;
        state.serialize_field("identifier", &format!("{:#X}", self.identifier))?;
        state.serialize_field("data_length", &self.data_length())?;
        state.serialize_field("data", &hex::encode_upper(self.data()))?;
        state.end()
    }
}
