//! Channel-visibility bitset.
//!
//! The persisted `ch` field is a base64 byte string where bit
//! `(index - 1) % 8` of byte `(index - 1) / 8` set to 1 means the channel is
//! deactivated (hidden). The encoding is inverted on purpose: an unset bit,
//! a bit past the end of the byte array, or a channel missing entirely all
//! mean "visible", so a stale bitset degrades to showing more, never less.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::model::ChannelDirectory;

/// Encode the set of deactivated channel names against the directory's index
/// assignment. Names the directory does not know are skipped. Returns the
/// empty string when nothing is deactivated — the canonical "all visible"
/// encoding.
pub fn encode(deactivated: impl IntoIterator<Item = impl AsRef<str>>, directory: &ChannelDirectory) -> String {
    let bits: Vec<usize> = deactivated
        .into_iter()
        .filter_map(|name| directory.get(name.as_ref()).map(|ch| ch.index - 1))
        .collect();
    if bits.is_empty() {
        return String::new();
    }
    let max = bits.iter().copied().max().unwrap_or(0);
    let mut bytes = vec![0u8; max / 8 + 1];
    for bit in bits {
        bytes[bit / 8] |= 1 << (bit % 8);
    }
    STANDARD.encode(&bytes)
}

/// Decode a bitset into a per-channel visibility map, defaulting every known
/// channel to active. Empty or malformed input decodes as "nothing
/// deactivated"; a bitset shorter than the channel count leaves the trailing
/// channels active (older encodings stay valid as channels are appended).
pub fn decode(encoded: &str, directory: &ChannelDirectory) -> BTreeMap<String, bool> {
    let mut active: BTreeMap<String, bool> =
        directory.iter().map(|ch| (ch.name.clone(), true)).collect();
    if encoded.is_empty() {
        return active;
    }
    let bytes = match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("malformed channel bitset {encoded:?}: {err}; treating all as active");
            return active;
        }
    };
    for ch in directory.iter() {
        let bit = ch.index - 1;
        let Some(byte) = bytes.get(bit / 8) else {
            continue;
        };
        if byte & (1 << (bit % 8)) != 0 {
            active.insert(ch.name.clone(), false);
        }
    }
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::channel::tests::manifest;

    fn directory(names: &[&str]) -> ChannelDirectory {
        ChannelDirectory::from_manifest(&manifest(names))
    }

    #[test]
    fn empty_set_encodes_as_empty_string() {
        let dir = directory(&["a", "b", "c"]);
        assert_eq!(encode(Vec::<String>::new(), &dir), "");
    }

    #[test]
    fn empty_string_decodes_as_all_active() {
        let dir = directory(&["a", "b", "c"]);
        let active = decode("", &dir);
        assert!(active.values().all(|&v| v));
        assert_eq!(active.len(), 3);
    }

    #[test]
    fn single_deactivated_channel_sets_its_bit() {
        // Channel order [A(1), B(2), C(3)], B hidden: one byte, bit 1 set.
        let dir = directory(&["A", "B", "C"]);
        let encoded = encode(["B"], &dir);
        assert_eq!(encoded, STANDARD.encode([0b0000_0010u8]));

        let active = decode(&encoded, &dir);
        assert!(active["A"]);
        assert!(!active["B"]);
        assert!(active["C"]);
    }

    #[test]
    fn round_trips_arbitrary_subsets() {
        let names: Vec<String> = (0..20).map(|i| format!("ch{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = directory(&refs);

        for mask in [0usize, 1, 0b101, 0b1000_0000_0001, 0xFFFFF] {
            let hidden: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| n.as_str())
                .collect();
            let encoded = encode(hidden.iter().copied(), &dir);
            let decoded = decode(&encoded, &dir);
            for (i, name) in names.iter().enumerate() {
                let expect_hidden = mask & (1 << i) != 0;
                assert_eq!(decoded[name], !expect_hidden, "mask {mask:#x} channel {name}");
            }
        }
    }

    #[test]
    fn short_bitset_leaves_trailing_channels_active() {
        // Encode against a 3-channel series, decode after 10 more appear.
        let small = directory(&["a", "b", "c"]);
        let encoded = encode(["c"], &small);

        let names: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|s| s.to_string())
            .chain((0..10).map(|i| format!("late{i}")))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let grown = directory(&refs);

        let active = decode(&encoded, &grown);
        assert!(!active["c"]);
        assert!((0..10).all(|i| active[&format!("late{i}")]));
    }

    #[test]
    fn unknown_names_are_skipped_on_encode() {
        let dir = directory(&["a", "b"]);
        assert_eq!(encode(["ghost"], &dir), "");
    }

    #[test]
    fn malformed_base64_decodes_as_all_active() {
        let dir = directory(&["a", "b"]);
        let active = decode("!!not-base64!!", &dir);
        assert!(active.values().all(|&v| v));
    }
}
