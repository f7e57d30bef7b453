use std::ops::AddAssign;

use byteorder::{ByteOrder, LittleEndian};

use crate::frame::RawFrame;
use crate::ident::{GroupKey, extract_source_address, reconstruct_j1939_identifier};
use crate::profile::{FrameKind, Framing};

/// Counters describing what happened to the reassembler's input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Multi-frame sequences reassembled into one frame
    pub sequences: usize,
    /// Single frames passed through minus their framing byte
    pub single_frames: usize,
    /// Frames ignored because they were out of order, orphaned, or malformed
    pub dropped_frames: usize,
    /// Connection management frames consumed without output
    pub control_frames: usize,
    /// Sequences abandoned before reaching their declared length
    pub discarded_sequences: usize,
}

impl AddAssign for ReassemblyStats {
    fn add_assign(&mut self, rhs: Self) {
        self.sequences += rhs.sequences;
        self.single_frames += rhs.single_frames;
        self.dropped_frames += rhs.dropped_frames;
        self.control_frames += rhs.control_frames;
        self.discarded_sequences += rhs.discarded_sequences;
    }
}

/// One in-flight multi-frame message
#[derive(Debug)]
struct Sequence {
    origin_timestamp: f64,
    bus_channel: u8,
    identifier: u32,
    expected_length: usize,
    payload: Vec<u8>,
    last_counter: Option<u8>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Accumulating(Sequence),
}

/// Reassembles the frames of one `(bus channel, grouping key)` group
///
/// Frames must be handed over in arrival order. Each group gets its own [Reassembler], and no two
/// reassemblers share any state.
#[derive(Debug)]
pub struct Reassembler {
    framing: &'static Framing,
    key: GroupKey,
    state: State,
    stats: ReassemblyStats,
}

impl Reassembler {
    pub fn new(framing: &'static Framing, key: GroupKey) -> Self {
        Self {
            framing,
            key,
            state: State::Idle,
            stats: ReassemblyStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Handle the next frame of this group
    ///
    /// Returns a frame whenever one is completed. An `Err` means that this one frame was dropped;
    /// the reassembler stays usable, and any in-flight sequence is left as it was.
    pub fn handle_frame(&mut self, frame: RawFrame) -> eyre::Result<Option<RawFrame>> {
        let result = match self.framing.classify(&frame) {
            FrameKind::Single => Ok(Some(self.handle_single_frame(frame))),
            FrameKind::First => self.handle_first_frame(frame),
            FrameKind::Consecutive => self.handle_consecutive_frame(frame),
            FrameKind::Control => {
                self.stats.control_frames += 1;
                tracing::trace!(
                    "Ignoring connection management frame {:#X}#{}",
                    frame.identifier,
                    hex::encode_upper(frame.data())
                );
                Ok(None)
            }
            FrameKind::Malformed => Err(eyre::eyre!(
                "Unrecognized TP frame {:#X}#{}",
                frame.identifier,
                hex::encode_upper(frame.data())
            )),
        };
        if result.is_err() {
            self.stats.dropped_frames += 1;
        }
        result
    }

    /// Give up on any in-flight sequence and report what happened
    pub fn finish(mut self) -> ReassemblyStats {
        if let State::Accumulating(sequence) = std::mem::take(&mut self.state) {
            tracing::warn!(
                "Reassembly ended with an incomplete sequence for {:#X}: {}/{} bytes",
                sequence.identifier,
                sequence.payload.len(),
                sequence.expected_length,
            );
            self.stats.discarded_sequences += 1;
        }
        self.stats
    }

    fn handle_single_frame(&mut self, frame: RawFrame) -> RawFrame {
        // Everything after the PCI byte, padding included
        let body = &frame.data()[1..];

        self.stats.single_frames += 1;
        tracing::trace!("Single frame {:#X} len: {}", frame.identifier, body.len());
        frame.with_payload(frame.identifier, body.to_vec())
    }

    fn handle_first_frame(&mut self, frame: RawFrame) -> eyre::Result<Option<RawFrame>> {
        let data = frame.data();
        let Some(expected_length) = self.framing.length.read(data) else {
            eyre::bail!(
                "First frame {:#X}#{} is too short to declare a length",
                frame.identifier,
                hex::encode_upper(data)
            );
        };
        if expected_length == 0 {
            eyre::bail!("First frame {:#X} declares an empty message", frame.identifier);
        }

        let identifier = if self.framing.broadcast_pgn.is_some() {
            let Some(pgn) = data.get(5..8).map(LittleEndian::read_u24) else {
                eyre::bail!(
                    "Broadcast announcement {:#X}#{} is missing its PGN",
                    frame.identifier,
                    hex::encode_upper(data)
                );
            };
            reconstruct_j1939_identifier(pgn, extract_source_address(frame.identifier))
        } else {
            frame.identifier
        };

        if let State::Accumulating(prior) = std::mem::take(&mut self.state) {
            tracing::debug!(
                "Discarding TP sequence for {:#X} superseded by a new first frame: {}/{} bytes",
                prior.identifier,
                prior.payload.len(),
                prior.expected_length,
            );
            self.stats.discarded_sequences += 1;
        }

        let payload: Vec<u8> = data
            .get(self.framing.first_payload_offset..)
            .unwrap_or_default()
            .into();
        tracing::debug!(
            "Start TP sequence. key: {:#X} id: {identifier:#X} len: {}/{expected_length}",
            self.key.key,
            payload.len(),
        );
        self.state = State::Accumulating(Sequence {
            origin_timestamp: frame.timestamp,
            bus_channel: frame.bus_channel,
            identifier,
            expected_length,
            payload,
            last_counter: None,
        });

        Ok(self.take_finished())
    }

    fn handle_consecutive_frame(&mut self, frame: RawFrame) -> eyre::Result<Option<RawFrame>> {
        let framing = self.framing;
        let ctr = framing.counter(&frame);
        let State::Accumulating(sequence) = &mut self.state else {
            eyre::bail!(
                "Received TP frame ctr {ctr:#X} for {:#X} outside of any sequence",
                frame.identifier
            );
        };

        if let Some(prev) = sequence.last_counter {
            let exp = framing.next_counter(prev);
            if ctr != exp {
                eyre::bail!(
                    "Received TP frame out of order: ctr {ctr:#X} (expected {exp:#X}) for {:#X}",
                    sequence.identifier
                );
            }
        }
        sequence.last_counter = Some(ctr);
        sequence.payload.extend_from_slice(
            frame
                .data()
                .get(framing.consecutive_payload_offset..)
                .unwrap_or_default(),
        );
        tracing::trace!(
            "Received TP frame. ctr: {ctr:#X} id: {:#X} len: {}/{}",
            sequence.identifier,
            sequence.payload.len(),
            sequence.expected_length,
        );

        Ok(self.take_finished())
    }

    /// Emit the in-flight sequence if it has reached its declared length
    fn take_finished(&mut self) -> Option<RawFrame> {
        let State::Accumulating(sequence) = &self.state else {
            return None;
        };
        if sequence.payload.len() < sequence.expected_length {
            return None;
        }

        let State::Accumulating(mut sequence) = std::mem::take(&mut self.state) else {
            return None;
        };
        // The last segment is usually padded out to the full frame
        sequence.payload.truncate(sequence.expected_length);
        self.stats.sequences += 1;
        tracing::debug!(
            "Finished TP sequence. id: {:#X} len: {}",
            sequence.identifier,
            sequence.payload.len()
        );
        Some(RawFrame::new(
            sequence.origin_timestamp,
            sequence.bus_channel,
            sequence.identifier,
            sequence.payload,
        ))
    }
}

/// Run one group's frames through a fresh [Reassembler]
///
/// Dropped frames are logged and counted, but never stop the group.
pub fn reassemble_group(
    framing: &'static Framing,
    key: GroupKey,
    frames: Vec<RawFrame>,
) -> (Vec<RawFrame>, ReassemblyStats) {
    let _span = tracing::debug_span!("tp", bus = key.bus_channel, key = key.key).entered();

    let mut reassembler = Reassembler::new(framing, key);
    let mut output = Vec::new();
    for frame in frames {
        match reassembler.handle_frame(frame) {
            Ok(Some(msg)) => output.push(msg),
            Ok(None) => {}
            Err(e) => tracing::debug!("Dropping frame: {e}"),
        }
    }
    (output, reassembler.finish())
}
