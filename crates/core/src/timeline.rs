use serde::{Deserialize, Serialize};

/// One currently-rendered content item, as reported by the DOM layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibleItem {
    /// Video timestamp, epoch seconds.
    pub timestamp: i64,
    /// Pixel offset of the item within the scrollable content.
    pub position: f64,
    /// Filtered out by a channel toggle; excluded from the table.
    #[serde(default)]
    pub hidden: bool,
}

/// A (position, timestamp) sample in the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: i64,
    pub position: f64,
}

/// Bidirectional mapping between a scroll offset and a video timestamp.
///
/// The table holds one entry per visible item, sorted by position ascending
/// (which coincides with chronological order, since the feed renders in
/// chronological order). Both lookups are linear scans; the entry count is
/// bounded by how many items the viewport renders, not by catalog size.
#[derive(Debug, Clone, Default)]
pub struct TimelineIndex {
    entries: Vec<TimelineEntry>,
}

impl TimelineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table from the current visible-item set, fully replacing
    /// the previous table. Hidden items are skipped.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = VisibleItem>) {
        self.entries.clear();
        self.entries.extend(items.into_iter().filter(|item| !item.hidden).map(|item| {
            TimelineEntry {
                timestamp: item.timestamp,
                position: item.position,
            }
        }));
        self.entries.sort_by(|a, b| a.position.total_cmp(&b.position));
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert a scroll offset to a video timestamp.
    ///
    /// Position 0 always maps to timestamp 0 (anchored to the top), as does
    /// anything at or before the first entry — there is no extrapolation
    /// below the dataset. Positions past the last entry clamp to the last
    /// entry's timestamp. A zero-height bracket (two entries at the same
    /// position) yields the bracket's earlier timestamp instead of NaN.
    pub fn position_to_timestamp(&self, pos: f64) -> f64 {
        if pos == 0.0 {
            return 0.0;
        }
        for (i, current) in self.entries.iter().enumerate() {
            if current.position < pos {
                continue;
            }
            if i == 0 {
                return 0.0;
            }
            let prev = self.entries[i - 1];
            let span = current.position - prev.position;
            if span == 0.0 {
                return prev.timestamp as f64;
            }
            let offset = (pos - prev.position) / span;
            return offset * (current.timestamp - prev.timestamp) as f64 + prev.timestamp as f64;
        }
        self.entries.last().map(|e| e.timestamp as f64).unwrap_or(0.0)
    }

    /// Convert a stored video timestamp back to a scroll offset.
    ///
    /// Symmetric inverse of [`position_to_timestamp`]: timestamps at or
    /// before the first entry map to the top, timestamps past the last entry
    /// clamp to the last entry's position, and a zero-width bracket (two
    /// entries sharing a timestamp) yields the earlier position.
    ///
    /// [`position_to_timestamp`]: TimelineIndex::position_to_timestamp
    pub fn timestamp_to_position(&self, ts: f64) -> f64 {
        for (i, current) in self.entries.iter().enumerate() {
            if (current.timestamp as f64) < ts {
                continue;
            }
            if i == 0 {
                return 0.0;
            }
            let prev = self.entries[i - 1];
            let span = (current.timestamp - prev.timestamp) as f64;
            if span == 0.0 {
                return prev.position;
            }
            let offset = (ts - prev.timestamp as f64) / span;
            return offset * (current.position - prev.position) + prev.position;
        }
        self.entries.last().map(|e| e.position).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(timestamp: i64, position: f64) -> VisibleItem {
        VisibleItem {
            timestamp,
            position,
            hidden: false,
        }
    }

    fn sample_index() -> TimelineIndex {
        let mut index = TimelineIndex::new();
        index.rebuild([item(100, 0.0), item(200, 50.0), item(300, 100.0)]);
        index
    }

    #[test]
    fn position_zero_is_timestamp_zero() {
        let index = sample_index();
        assert_eq!(index.position_to_timestamp(0.0), 0.0);

        let empty = TimelineIndex::new();
        assert_eq!(empty.position_to_timestamp(0.0), 0.0);
    }

    #[test]
    fn interpolates_between_entries() {
        let index = sample_index();
        assert_eq!(index.position_to_timestamp(25.0), 150.0);
        assert_eq!(index.position_to_timestamp(75.0), 250.0);
    }

    #[test]
    fn clamps_past_the_last_entry() {
        let index = sample_index();
        assert_eq!(index.position_to_timestamp(150.0), 300.0);
        assert_eq!(index.timestamp_to_position(999.0), 100.0);
    }

    #[test]
    fn first_entry_anchors_to_zero() {
        let mut index = TimelineIndex::new();
        index.rebuild([item(100, 40.0), item(200, 90.0)]);
        // Anything before the first visible item is time zero.
        assert_eq!(index.position_to_timestamp(10.0), 0.0);
        assert_eq!(index.timestamp_to_position(50.0), 0.0);
    }

    #[test]
    fn round_trips_through_both_mappings() {
        let index = sample_index();
        let ts = index.position_to_timestamp(30.0);
        assert_eq!(index.timestamp_to_position(ts), 30.0);
    }

    #[test]
    fn monotonic_in_position() {
        let index = sample_index();
        let mut last = 0.0;
        for step in 0..40 {
            let ts = index.position_to_timestamp(step as f64 * 3.0);
            assert!(ts >= last, "not monotonic at step {step}");
            last = ts;
        }
    }

    #[test]
    fn zero_height_bracket_stays_finite() {
        let mut index = TimelineIndex::new();
        index.rebuild([item(100, 0.0), item(200, 50.0), item(300, 50.0)]);
        let ts = index.position_to_timestamp(50.0);
        assert!(ts.is_finite());
        assert_eq!(ts, 200.0);

        let mut index = TimelineIndex::new();
        index.rebuild([item(100, 0.0), item(200, 50.0), item(200, 80.0)]);
        let pos = index.timestamp_to_position(200.0);
        assert!(pos.is_finite());
        assert_eq!(pos, 50.0);
    }

    #[test]
    fn rebuild_replaces_and_is_idempotent() {
        let mut index = sample_index();
        let first = index.entries().to_vec();
        index.rebuild([item(100, 0.0), item(200, 50.0), item(300, 100.0)]);
        assert_eq!(index.entries(), first.as_slice());

        index.rebuild([item(500, 10.0)]);
        assert_eq!(index.entries().len(), 1);
    }

    #[test]
    fn hidden_items_are_excluded_and_order_restored() {
        let mut index = TimelineIndex::new();
        index.rebuild([
            item(300, 100.0),
            VisibleItem {
                timestamp: 250,
                position: 75.0,
                hidden: true,
            },
            item(100, 0.0),
            item(200, 50.0),
        ]);
        assert_eq!(index.entries().len(), 3);
        assert_eq!(index.entries()[0].timestamp, 100);
        assert_eq!(index.entries()[2].timestamp, 300);
    }
}
