//! Approximate download progress.
//!
//! Media backends rarely announce a content length up front, so the total
//! size is guessed from the duration and a per-kind bitrate. The resulting
//! percentage is a UX hint only and must never be treated as exact.

use crate::extractor::MediaKind;

pub const AUDIO_BYTES_PER_SECOND: u64 = 32_000;
pub const VIDEO_BYTES_PER_SECOND: u64 = 100_000;

/// Bytes-per-second assumptions used to guess a media size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHeuristic {
    pub audio_bytes_per_second: u64,
    pub video_bytes_per_second: u64,
}

impl Default for SizeHeuristic {
    fn default() -> Self {
        Self {
            audio_bytes_per_second: AUDIO_BYTES_PER_SECOND,
            video_bytes_per_second: VIDEO_BYTES_PER_SECOND,
        }
    }
}

impl SizeHeuristic {
    pub fn bytes_per_second(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Audio => self.audio_bytes_per_second,
            MediaKind::Video => self.video_bytes_per_second,
        }
    }

    /// Estimated total size in bytes. Never zero, so it is always safe to divide by.
    pub fn estimated_size(&self, kind: MediaKind, duration_seconds: u64) -> u64 {
        duration_seconds
            .saturating_mul(self.bytes_per_second(kind))
            .max(1)
    }
}

/// Completion percentage in `[0, 100]`.
pub fn percent(bytes_transferred: u64, estimated_total: u64) -> f64 {
    if estimated_total == 0 {
        return 0.0;
    }
    (bytes_transferred as f64 / estimated_total as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_bounds() {
        assert_eq!(percent(0, 1_000), 0.0);
        assert_eq!(percent(1_000, 1_000), 100.0);
        assert_eq!(percent(5_000, 1_000), 100.0);
        assert_eq!(percent(u64::MAX, 1), 100.0);
    }

    #[test]
    fn test_percent_zero_total() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(42, 0), 0.0);
    }

    #[test]
    fn test_percent_monotonic() {
        let total = 1_920_000;
        let mut last = 0.0;
        for bytes in (0..=2_500_000).step_by(65_536) {
            let p = percent(bytes, total);
            assert!(p >= last, "{} dropped below {}", p, last);
            assert!((0.0..=100.0).contains(&p));
            last = p;
        }
    }

    #[test]
    fn test_audio_estimate_for_one_minute() {
        let heuristic = SizeHeuristic::default();
        let total = heuristic.estimated_size(MediaKind::Audio, 60);
        assert_eq!(total, 1_920_000);
        assert!((percent(960_000, total) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_video_estimate() {
        let heuristic = SizeHeuristic::default();
        assert_eq!(heuristic.estimated_size(MediaKind::Video, 10), 1_000_000);
    }

    #[test]
    fn test_zero_duration_has_floor() {
        let heuristic = SizeHeuristic::default();
        assert_eq!(heuristic.estimated_size(MediaKind::Audio, 0), 1);
        assert_eq!(percent(1, heuristic.estimated_size(MediaKind::Video, 0)), 100.0);
    }
}
