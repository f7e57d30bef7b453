//! Reassemble multi-frame transport protocol messages out of raw CAN captures
//!
//! ISO 15765-2 (UDS), SAE J1939 BAM, and NMEA 2000 Fast Packet sequences are replaced by one frame
//! each, carrying the concatenated payload. Every other frame passes through untouched, and the
//! output stays in chronological order.
pub mod candump;
pub mod frame;
pub mod ident;
pub mod merge;
pub mod pipeline;
pub mod profile;
pub mod reassemble;
pub mod split;
pub mod stdio;

pub use candump::{CandumpFormat, CandumpParser};
pub use frame::RawFrame;
pub use ident::{GroupKey, extract_pgn, extract_source_address, reconstruct_j1939_identifier};
pub use merge::{group_by_data_length, merge};
pub use pipeline::combine_tp_frames;
pub use profile::{FrameKind, Framing, Protocol, ProtocolProfile};
pub use reassemble::{Reassembler, ReassemblyStats, reassemble_group};
pub use split::{group_candidates, split};

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}
