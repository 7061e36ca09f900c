//! RAW+JPEG sequence synchronization.
//!
//! Cameras writing RAW+JPEG produce two files per shutter press. When
//! synchronization is enabled the pair must consume exactly one sequence
//! draw, so `IMG_0042.CR2` and `IMG_0042.JPG` end up with the same number
//! in their destination names.
//!
//! Pairing rule: equal base stem (case-insensitive, extension ignored)
//! AND equal capture timestamp, compared at sub-second precision when
//! both sides recorded one.

use super::sequence::SequenceDraw;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Capture-time identity used for pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureKey {
    pub time: Option<DateTime<Utc>>,
    pub sub_second: Option<u32>,
}

impl CaptureKey {
    /// Whether two keys identify the same shutter press.
    ///
    /// Sub-seconds only discriminate when both sides have them.
    fn matches(&self, other: &CaptureKey) -> bool {
        if self.time != other.time {
            return false;
        }
        match (self.sub_second, other.sub_second) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Tracks sequence draws handed to RAW/JPEG pair members
#[derive(Debug, Default)]
pub struct SyncRawJpeg {
    // Keyed by lowercased stem; cameras reuse stems across folders but
    // not within one download session at the same capture time
    seen: HashMap<String, (CaptureKey, SequenceDraw)>,
}

impl SyncRawJpeg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the draw already consumed by this file's pair partner
    pub fn matching_pair(&self, stem: &str, key: &CaptureKey) -> Option<SequenceDraw> {
        self.seen
            .get(&stem.to_lowercase())
            .filter(|(seen_key, _)| seen_key.matches(key))
            .map(|(_, draw)| *draw)
    }

    /// Record the draw consumed by the first member of a potential pair
    pub fn record(&mut self, stem: &str, key: CaptureKey, draw: SequenceDraw) {
        self.seen.insert(stem.to_lowercase(), (key, draw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draw(n: u64) -> SequenceDraw {
        SequenceDraw {
            session: n,
            downloads_today: n,
            stored: n,
        }
    }

    fn key(sub_second: Option<u32>) -> CaptureKey {
        CaptureKey {
            time: Some(Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()),
            sub_second,
        }
    }

    #[test]
    fn pair_with_same_stem_and_time_matches() {
        let mut sync = SyncRawJpeg::new();
        sync.record("IMG_0042", key(Some(170)), draw(7));

        let hit = sync.matching_pair("img_0042", &key(Some(170)));
        assert_eq!(hit, Some(draw(7)));
    }

    #[test]
    fn different_sub_second_does_not_match() {
        let mut sync = SyncRawJpeg::new();
        sync.record("IMG_0042", key(Some(170)), draw(7));

        assert!(sync.matching_pair("IMG_0042", &key(Some(171))).is_none());
    }

    #[test]
    fn missing_sub_second_on_one_side_still_matches() {
        let mut sync = SyncRawJpeg::new();
        sync.record("IMG_0042", key(Some(170)), draw(7));

        assert_eq!(sync.matching_pair("IMG_0042", &key(None)), Some(draw(7)));
    }

    #[test]
    fn different_stem_does_not_match() {
        let mut sync = SyncRawJpeg::new();
        sync.record("IMG_0042", key(None), draw(7));

        assert!(sync.matching_pair("IMG_0043", &key(None)).is_none());
    }

    #[test]
    fn different_time_does_not_match() {
        let mut sync = SyncRawJpeg::new();
        sync.record("IMG_0042", key(None), draw(7));

        let other = CaptureKey {
            time: Some(Utc.with_ymd_and_hms(2024, 6, 15, 10, 31, 0).unwrap()),
            sub_second: None,
        };
        assert!(sync.matching_pair("IMG_0042", &other).is_none());
    }
}
