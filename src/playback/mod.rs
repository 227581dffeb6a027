//! Playback sources (Spotify, ...)
//!
//! A playback source is queried on demand for what is currently playing.
//! Failures come back as a [`PlaybackError`] so the poll loop can decide per
//! kind whether to skip the tick, prompt for credentials, or treat the
//! response as "nothing playing".

pub mod spotify;

use async_trait::async_trait;

pub use spotify::SpotifyClient;

/// Point-in-time playback state, created per query and dropped after formatting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub track_title: String,
    pub artist_name: String,
    pub progress_ms: u64,
    pub duration_ms: u64,
}

impl PlaybackSnapshot {
    /// Snapshot of a track that is currently playing
    pub fn playing(
        title: impl Into<String>,
        artist: impl Into<String>,
        progress_ms: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            is_playing: true,
            track_title: title.into(),
            artist_name: artist.into(),
            progress_ms,
            duration_ms,
        }
    }

    /// Snapshot of a stopped or paused player
    pub fn stopped() -> Self {
        Self::default()
    }
}

/// Errors a playback source can report
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// Credential expired or rejected; needs new authorization
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Network failure, timeout or unexpected server status
    #[error("transport error: {0}")]
    Transport(String),

    /// Response arrived but is missing required fields
    #[error("malformed playback state: {0}")]
    Format(String),
}

/// Source of current playback state
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Get the source name (e.g., "spotify")
    fn name(&self) -> &str;

    /// Query current playback; `Ok(None)` means no active device
    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>, PlaybackError>;
}
