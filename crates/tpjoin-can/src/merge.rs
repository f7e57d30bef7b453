use std::collections::BTreeMap;

use crate::frame::RawFrame;

/// Combine pass-through and reassembled frames into one chronological stream
///
/// The sort is stable, so frames sharing a timestamp keep their relative order, with
/// pass-through frames ahead of reassembled ones.
pub fn merge(mut pass_through: Vec<RawFrame>, reassembled: Vec<RawFrame>) -> Vec<RawFrame> {
    pass_through.extend(reassembled);
    pass_through.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    pass_through
}

/// Bucket frames by their data length, for decoders that need fixed-length input
pub fn group_by_data_length(frames: &[RawFrame]) -> BTreeMap<usize, Vec<&RawFrame>> {
    let mut groups: BTreeMap<usize, Vec<&RawFrame>> = BTreeMap::new();
    for frame in frames {
        groups.entry(frame.data_length()).or_default().push(frame);
    }
    groups
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frame(timestamp: f64, identifier: u32, len: usize) -> RawFrame {
        RawFrame::new(timestamp, 0, identifier, vec![0; len])
    }

    #[test]
    fn test_merge_is_stable() {
        let pass_through = vec![frame(3.0, 0x1, 8), frame(1.0, 0x2, 8), frame(2.0, 0x3, 8)];
        let reassembled = vec![frame(2.0, 0x4, 20), frame(0.5, 0x5, 20), frame(1.0, 0x6, 20)];

        let merged = merge(pass_through, reassembled);
        let ids: Vec<_> = merged.iter().map(|f| f.identifier).collect();
        assert_eq!(ids, vec![0x5, 0x2, 0x6, 0x3, 0x4, 0x1]);
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_merge_keeps_variable_lengths() {
        let merged = merge(vec![frame(1.0, 0x1, 8)], vec![frame(0.0, 0x7E9, 62)]);
        assert_eq!(merged[0].data_length(), 62);
        assert_eq!(merged[1].data_length(), 8);
    }

    #[test]
    fn test_group_by_data_length() {
        let frames = vec![
            frame(1.0, 0x1, 20),
            frame(2.0, 0x2, 8),
            frame(3.0, 0x3, 20),
            frame(4.0, 0x4, 3),
        ];
        let groups = group_by_data_length(&frames);

        let lengths: Vec<_> = groups.keys().copied().collect();
        assert_eq!(lengths, vec![3, 8, 20]);
        let ids: Vec<_> = groups[&20].iter().map(|f| f.identifier).collect();
        assert_eq!(ids, vec![0x1, 0x3]);
    }
}
