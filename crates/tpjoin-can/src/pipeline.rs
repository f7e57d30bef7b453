use crate::frame::RawFrame;
use crate::merge::merge;
use crate::profile::ProtocolProfile;
use crate::reassemble::{ReassemblyStats, reassemble_group};
use crate::split::{group_candidates, split};

/// Replace transport protocol sequences with the frames they carry
///
/// Frames that aren't part of any sequence pass through untouched. The result is sorted by
/// timestamp, except under the identity profile, which returns the input exactly as given.
pub fn combine_tp_frames(
    frames: Vec<RawFrame>,
    profile: &ProtocolProfile,
) -> (Vec<RawFrame>, ReassemblyStats) {
    let Some(framing) = profile.framing() else {
        return (frames, ReassemblyStats::default());
    };

    let (candidates, pass_through) = split(frames, profile);

    let mut stats = ReassemblyStats::default();
    let mut reassembled = Vec::new();
    for (key, group) in group_candidates(candidates, profile) {
        let (output, group_stats) = reassemble_group(framing, key, group);
        reassembled.extend(output);
        stats += group_stats;
    }

    if stats.discarded_sequences > 0 {
        tracing::warn!(
            "Discarded {} incomplete {} sequences",
            stats.discarded_sequences,
            profile.protocol
        );
    }

    (merge(pass_through, reassembled), stats)
}
