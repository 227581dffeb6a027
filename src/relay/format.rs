//! Track formatter
//!
//! Pure mapping from a [`PlaybackSnapshot`] to the chatbox line. The output
//! doubles as the dedup key, so it must be deterministic.

use crate::playback::PlaybackSnapshot;

/// Prefix of every track line
pub const NOTE_GLYPH: &str = "🎵";

/// Display value when nothing is playing (never starts with [`NOTE_GLYPH`])
pub const NOTHING_PLAYING: &str = "No track playing";

/// Format a snapshot as `🎵 {title} - {artist} [mm:ss / mm:ss]`
pub fn format_track(snapshot: &PlaybackSnapshot) -> String {
    if !snapshot.is_playing {
        return NOTHING_PLAYING.to_string();
    }

    format!(
        "{} {} - {} [{} / {}]",
        NOTE_GLYPH,
        snapshot.track_title,
        snapshot.artist_name,
        format_clock(snapshot.progress_ms),
        format_clock(snapshot.duration_ms)
    )
}

/// Format milliseconds as zero-padded `mm:ss` (minutes are not wrapped at 60)
pub fn format_clock(ms: u64) -> String {
    format!("{:02}:{:02}", ms / 60_000, (ms % 60_000) / 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_playing_track() {
        let snapshot = PlaybackSnapshot::playing("Song A", "Artist X", 125_000, 245_000);
        assert_eq!(
            format_track(&snapshot),
            "🎵 Song A - Artist X [01:05 / 04:05]"
        );
    }

    #[test]
    fn test_format_stopped_is_sentinel() {
        assert_eq!(format_track(&PlaybackSnapshot::stopped()), NOTHING_PLAYING);

        // Title/artist are ignored once playback stops
        let mut paused = PlaybackSnapshot::playing("Song A", "Artist X", 1, 2);
        paused.is_playing = false;
        assert_eq!(format_track(&paused), NOTHING_PLAYING);
    }

    #[test]
    fn test_format_clock_edges() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(999), "00:00");
        assert_eq!(format_clock(59_999), "00:59");
        assert_eq!(format_clock(60_000), "01:00");
        assert_eq!(format_clock(100 * 60_000 + 7_000), "100:07");
    }

    proptest! {
        #[test]
        fn prop_playing_never_equals_sentinel(
            title in ".*",
            artist in ".*",
            progress in 0u64..10_000_000,
            duration in 0u64..10_000_000,
        ) {
            let snapshot = PlaybackSnapshot::playing(title, artist, progress, duration);
            let line = format_track(&snapshot);
            prop_assert!(line.starts_with(NOTE_GLYPH));
            prop_assert_ne!(line, NOTHING_PLAYING);
        }

        #[test]
        fn prop_same_second_formats_identically(
            progress in 0u64..10_000_000,
            offset in 0u64..1_000,
        ) {
            let bucket = progress - progress % 1_000;
            prop_assert_eq!(format_clock(bucket), format_clock(bucket + offset));
        }

        #[test]
        fn prop_seconds_field_below_sixty(ms in any::<u32>()) {
            let clock = format_clock(u64::from(ms));
            let (_, secs) = clock.rsplit_once(':').unwrap();
            prop_assert!(secs.parse::<u64>().unwrap() < 60);
            prop_assert_eq!(secs.len(), 2);
        }
    }
}
