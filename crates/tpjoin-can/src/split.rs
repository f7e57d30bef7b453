use indexmap::IndexMap;

use crate::frame::RawFrame;
use crate::ident::GroupKey;
use crate::profile::ProtocolProfile;

/// Partition frames into reassembly candidates and pass-through frames
///
/// Returns `(candidates, pass_through)`, both in their original relative order. The identity
/// profile returns every frame as pass-through.
pub fn split(frames: Vec<RawFrame>, profile: &ProtocolProfile) -> (Vec<RawFrame>, Vec<RawFrame>) {
    if profile.is_identity() {
        return (Vec::new(), frames);
    }

    let total = frames.len();
    let (candidates, pass_through): (Vec<_>, Vec<_>) =
        frames.into_iter().partition(|f| profile.accepts_frame(f));

    // Each frame goes through a single accepts_frame test, so this only fires if that changes
    if candidates.len() + pass_through.len() != total {
        tracing::warn!(
            "Frame partition is inconsistent: {} candidates + {} pass-through != {total} frames",
            candidates.len(),
            pass_through.len(),
        );
    }
    tracing::debug!(
        "Split {total} frames into {} {} candidates and {} pass-through",
        candidates.len(),
        profile.protocol,
        pass_through.len(),
    );

    (candidates, pass_through)
}

/// Group candidate frames by `(bus channel, grouping key)`
///
/// Groups are ordered by first appearance, and frames within a group keep their arrival order.
pub fn group_candidates(
    candidates: Vec<RawFrame>,
    profile: &ProtocolProfile,
) -> IndexMap<GroupKey, Vec<RawFrame>> {
    let mut groups: IndexMap<GroupKey, Vec<RawFrame>> = IndexMap::new();
    let Some(framing) = profile.framing() else {
        return groups;
    };

    for frame in candidates {
        groups
            .entry(framing.group_key(&frame))
            .or_default()
            .push(frame);
    }
    groups
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frame(timestamp: f64, bus_channel: u8, identifier: u32) -> RawFrame {
        RawFrame::new(timestamp, bus_channel, identifier, vec![0x21])
    }

    #[test]
    fn test_identity_passes_everything_through() {
        let frames = vec![frame(2.0, 0, 0x7E9), frame(1.0, 0, 0x123)];
        let (candidates, pass_through) = split(frames.clone(), &ProtocolProfile::identity());
        assert!(candidates.is_empty());
        assert_eq!(pass_through, frames);
    }

    #[test]
    fn test_split_uds_by_identifier() {
        let profile = ProtocolProfile::from_tag("uds", [0x7E9, 0x7EA]);
        let frames = vec![
            frame(1.0, 0, 0x7E9),
            frame(2.0, 0, 0x7E0),
            frame(3.0, 1, 0x7EA),
            frame(4.0, 0, 0x123),
        ];
        let (candidates, pass_through) = split(frames, &profile);
        assert_eq!(candidates, vec![frame(1.0, 0, 0x7E9), frame(3.0, 1, 0x7EA)]);
        assert_eq!(pass_through, vec![frame(2.0, 0, 0x7E0), frame(4.0, 0, 0x123)]);
    }

    #[test]
    fn test_split_j1939_by_pgn() {
        let profile = ProtocolProfile::from_tag("j1939", []);
        let frames = vec![
            frame(1.0, 0, 0x1CECFFA4),
            frame(2.0, 0, 0x18FEDAA4),
            frame(3.0, 0, 0x1CEBFFA4),
        ];
        let (candidates, pass_through) = split(frames, &profile);
        assert_eq!(
            candidates,
            vec![frame(1.0, 0, 0x1CECFFA4), frame(3.0, 0, 0x1CEBFFA4)]
        );
        assert_eq!(pass_through, vec![frame(2.0, 0, 0x18FEDAA4)]);
    }

    #[test]
    fn test_group_candidates() {
        let profile = ProtocolProfile::from_tag("j1939", []);
        let candidates = vec![
            frame(1.0, 0, 0x1CECFFA4),
            frame(2.0, 0, 0x1CECFF1C),
            frame(3.0, 0, 0x1CEBFFA4),
            frame(4.0, 1, 0x1CEBFFA4),
            frame(5.0, 0, 0x1CEBFF1C),
        ];
        let groups = group_candidates(candidates, &profile);

        let keys: Vec<_> = groups.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                GroupKey {
                    bus_channel: 0,
                    key: 0xA4
                },
                GroupKey {
                    bus_channel: 0,
                    key: 0x1C
                },
                GroupKey {
                    bus_channel: 1,
                    key: 0xA4
                },
            ]
        );
        assert_eq!(
            groups[0],
            vec![frame(1.0, 0, 0x1CECFFA4), frame(3.0, 0, 0x1CEBFFA4)]
        );
        assert_eq!(
            groups[1],
            vec![frame(2.0, 0, 0x1CECFF1C), frame(5.0, 0, 0x1CEBFF1C)]
        );
        assert_eq!(groups[2], vec![frame(4.0, 1, 0x1CEBFFA4)]);
    }
}
