use std::io::{IsTerminal, Write};
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tpjoin_can::stdio::{get_input_reader, get_output_writer};
use tpjoin_can::{CandumpParser, ProtocolProfile, RawFrame, combine_tp_frames};

/// Reassemble transport protocol sequences in a can-utils candump
///
/// UDS (ISO 15765-2), J1939 BAM, and NMEA 2000 Fast Packet sequences are each replaced by a single
/// frame holding the whole message, timestamped with the first frame of the sequence. All other
/// frames are passed through, and the output is sorted by timestamp.
///
/// Examples:
///
///     tpjoin --protocol uds --response-id 7E9 capture.log
///     tpjoin --protocol j1939 < capture.log
///     tpjoin --protocol nmea -r 1F805 -r 1F80E --format csv capture.log frames.csv
#[derive(Debug, Parser)]
#[clap(version, verbatim_doc_comment)]
struct Args {
    #[clap(short, long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    /// Transport protocol: uds, j1939, or nmea. Frames pass through untouched if empty
    #[clap(short, long, default_value = "")]
    protocol: String,

    /// Response CAN ID (uds) or PGN (j1939, nmea) to reassemble, in hex. May be repeated
    ///
    /// J1939 defaults to the TP.DT PGN 0xEB00.
    #[clap(short, long = "response-id", value_parser = parse_hex_id)]
    response_ids: Vec<u32>,

    /// Output format
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Candump)]
    format: OutputFormat,

    /// Path to the input candump. stdin if '-' or if not passed
    input: Option<PathBuf>,

    /// Path to the output. stdout if '-' or if not passed
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    /// candump -L format
    Candump,
    Csv,
}

fn parse_hex_id(s: &str) -> Result<u32, ParseIntError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16)
}

fn write_frames<W: Write>(frames: &[RawFrame], format: OutputFormat, writer: W) -> eyre::Result<()> {
    match format {
        OutputFormat::Candump => {
            let mut writer = writer;
            for frame in frames {
                frame.write(&mut writer)?;
            }
            writer.flush()?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(writer);
            for frame in frames {
                writer.serialize(frame)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn main() -> eyre::Result<()> {
    let use_color = std::io::stderr().is_terminal();
    if use_color {
        color_eyre::install()?;
    }

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(args.log_level.into())
        .with_env_var("TPJOIN_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .init();

    let profile = ProtocolProfile::from_tag(&args.protocol, args.response_ids.iter().copied());
    if !profile.is_identity() && profile.response_ids.is_empty() {
        tracing::warn!(
            "No --response-id given for {}; no frames will be reassembled",
            profile.protocol
        );
    }

    let input = get_input_reader(args.input.as_deref())?;
    let output = get_output_writer(args.output.as_deref())?;

    let start = Instant::now();

    let frames: Vec<RawFrame> = CandumpParser::new(input)
        .filter_map(|f| {
            f.inspect_err(|e| tracing::warn!("Failed to parse frame: {e}"))
                .ok()
        })
        .collect();
    let num_input = frames.len();

    let (frames, stats) = combine_tp_frames(frames, &profile);
    write_frames(&frames, args.format, output)?;

    tracing::info!(
        "Reassembled {} {} sequences and {} single frames; {num_input} frames in, {} out",
        stats.sequences,
        profile.protocol,
        stats.single_frames,
        frames.len(),
    );
    if stats.dropped_frames > 0 || stats.discarded_sequences > 0 {
        tracing::info!(
            "Dropped {} frames and discarded {} incomplete sequences",
            stats.dropped_frames,
            stats.discarded_sequences,
        );
    }
    tracing::info!("Finished in {:?}", start.elapsed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("7E9").unwrap(), 0x7E9);
        assert_eq!(parse_hex_id("0x7e9").unwrap(), 0x7E9);
        assert_eq!(parse_hex_id("0X1F805").unwrap(), 0x1F805);
        assert!(parse_hex_id("0xZZ").is_err());
    }
}
