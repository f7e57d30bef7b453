//! Utilities for parsing candumps
use std::io::{BufRead, Lines};

use eyre::WrapErr;

use crate::frame::RawFrame;

/// File format of the candump
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CandumpFormat {
    /// Try to auto-negotiate the file format
    ///
    /// Assumes that all lines follow the same format, and will pick the first format to
    /// successfully parse a line.
    Auto,
    /// candump -L/-l format
    CanUtilsFile,
    /// candump -ta format
    CanUtilsCli,
}

/// Parse [RawFrame]s from the given reader
pub struct CandumpParser<R: BufRead> {
    format: CandumpFormat,
    lines: Lines<R>,
}

impl<R: BufRead> CandumpParser<R> {
    /// Create a new [CandumpParser] using [CandumpFormat::Auto]
    pub fn new(reader: R) -> Self {
        Self::with_format(reader, CandumpFormat::Auto)
    }

    pub fn with_format(reader: R, format: CandumpFormat) -> Self {
        Self {
            format,
            lines: reader.lines(),
        }
    }
}

/// There will be one Item for each non-blank input line
impl<R: BufRead> Iterator for CandumpParser<R> {
    type Item = eyre::Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(eyre::eyre!("Failed to read line: {e}"))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(self.format.parse(&line));
        }
    }
}

impl CandumpFormat {
    /// Attempt to parse a [RawFrame] from the given line
    pub fn parse(&mut self, line: &str) -> eyre::Result<RawFrame> {
        match self {
            CandumpFormat::Auto => {
                if let Ok(result) = parse_candump_file_msg(line) {
                    *self = CandumpFormat::CanUtilsFile;
                    Ok(result)
                } else if let Ok(result) = parse_candump_cli_msg(line) {
                    *self = CandumpFormat::CanUtilsCli;
                    Ok(result)
                } else {
                    eyre::bail!("Failed to parse {line:?} with all known candump formats")
                }
            }
            CandumpFormat::CanUtilsFile => parse_candump_file_msg(line),
            CandumpFormat::CanUtilsCli => parse_candump_cli_msg(line),
        }
    }
}

fn strip_outer_brackets(field: &str, first: char, last: char) -> &str {
    let field = field.strip_prefix(first).unwrap_or(field);
    field.strip_suffix(last).unwrap_or(field)
}

fn parse_timestamp(field: &str) -> eyre::Result<f64> {
    strip_outer_brackets(field, '(', ')')
        .parse()
        .wrap_err("Failed to parse timestamp as f64")
}

/// The bus channel is the trailing number of the interface name: `can1` is channel 1
fn parse_bus_channel(interface: &str) -> eyre::Result<u8> {
    let digits = interface.len()
        - interface
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .count();
    let digits = &interface[digits..];
    if digits.is_empty() {
        eyre::bail!("Interface {interface:?} has no channel number");
    }
    digits
        .parse()
        .wrap_err(format!("Failed to parse channel number from {interface:?}"))
}

/// Parse candumps with the format
///
/// ```text
/// $ candump -ta can0
/// (1739136517.221471)  can0  123   [3]  FF FF FF
/// ```
fn parse_candump_cli_msg(line: &str) -> eyre::Result<RawFrame> {
    let mut parts = line.split_ascii_whitespace();

    let Some(maybe_timestamp) = parts.next() else {
        eyre::bail!("Line {line:?} empty");
    };
    let timestamp = parse_timestamp(maybe_timestamp)?;
    let Some(interface) = parts.next() else {
        eyre::bail!("Failed to parse interface from: {line:?}");
    };
    let bus_channel = parse_bus_channel(interface)?;
    let Some(maybe_canid) = parts.next() else {
        eyre::bail!("Failed to parse canid from: {line:?}");
    };
    let identifier =
        u32::from_str_radix(maybe_canid, 16).wrap_err("Failed to parse canid as u32")?;
    let Some(maybe_dlc) = parts.next() else {
        eyre::bail!("Failed to parse dlc from: {line:?}");
    };
    let dlc: usize = strip_outer_brackets(maybe_dlc, '[', ']')
        .parse()
        .wrap_err("Failed to parse dlc as usize")?;
    if dlc > 8 {
        eyre::bail!("dlc {dlc} exceeds maximum dlc of 8 bytes");
    }

    let mut data = Vec::with_capacity(dlc);
    for i in 0..dlc {
        let Some(maybe_byte) = parts.next() else {
            eyre::bail!("Failed to parse data byte {i} from line: {line:?}");
        };
        if maybe_byte.len() != 2 {
            eyre::bail!(
                "Failed to parse data byte {i} from {maybe_byte:?}: incorrect string length"
            );
        }
        data.push(u8::from_str_radix(maybe_byte, 16).wrap_err("Failed to parse data byte")?);
    }
    Ok(RawFrame::new(timestamp, bus_channel, identifier, data))
}

/// Parse candumps with the format
///
/// ```text
/// $ candump -L can0
/// (1739136482.503244) can0 123#FFFFFF
/// ```
///
/// Payloads longer than 8 bytes are accepted, so that reassembled output can be read back in.
fn parse_candump_file_msg(line: &str) -> eyre::Result<RawFrame> {
    let mut parts = line.split_ascii_whitespace();
    let Some(maybe_timestamp) = parts.next() else {
        eyre::bail!("Line {line:?} empty");
    };
    let timestamp = parse_timestamp(maybe_timestamp)?;
    let Some(interface) = parts.next() else {
        eyre::bail!("Failed to parse interface from: {line:?}");
    };
    let bus_channel = parse_bus_channel(interface)?;

    let Some(maybe_frame) = parts.next() else {
        eyre::bail!("Failed to parse frame data from: {line:?}");
    };
    let Some((maybe_canid, maybe_data)) = maybe_frame.split_once('#') else {
        eyre::bail!("Failed to parse canid from: {maybe_frame:?} in line {line:?}");
    };
    let identifier =
        u32::from_str_radix(maybe_canid, 16).wrap_err("Failed to parse canid as u32")?;
    let data = hex::decode(maybe_data)
        .wrap_err(format!("Failed to parse data from: {maybe_data:?}"))?;

    Ok(RawFrame::new(timestamp, bus_channel, identifier, data))
}
