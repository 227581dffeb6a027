//! Spotify Web API playback source
//!
//! Wraps an rspotify [`AuthCodeSpotify`] client. rspotify owns the OAuth
//! dance: it refreshes an expired access token before each request and writes
//! every new token to the cache file. This module maps the player state and
//! rspotify's errors onto the crate's playback types.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rspotify::http::HttpError;
use rspotify::model::{AdditionalType, CurrentPlaybackContext, PlayableItem};
use rspotify::prelude::*;
use rspotify::{AuthCodeSpotify, ClientError, Config, Credentials as OAuthCredentials, OAuth, Token};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{PlaybackError, PlaybackSnapshot, PlaybackSource};
use crate::config::{Credentials, SpotifyConfig};

/// OAuth scope needed to read playback state
pub const SCOPE: &str = "user-read-playback-state";

/// Podcasts are requested too so they surface as malformed rather than missing
const ADDITIONAL_TYPES: [AdditionalType; 2] = [AdditionalType::Track, AdditionalType::Episode];

/// Spotify Web API client
pub struct SpotifyClient {
    spotify: AuthCodeSpotify,
}

impl SpotifyClient {
    /// Create a client, loading any cached token from `cache_path`
    pub async fn new(credentials: &Credentials, config: &SpotifyConfig, cache_path: PathBuf) -> Self {
        let creds = OAuthCredentials::new(&credentials.client_id, &credentials.client_secret);
        let oauth = OAuth {
            redirect_uri: credentials.redirect_uri.clone(),
            scopes: HashSet::from([SCOPE.to_string()]),
            ..Default::default()
        };
        let rs_config = Config {
            api_base_url: format!("{}/v1/", config.api_base.trim_end_matches('/')),
            auth_base_url: format!("{}/", config.accounts_base.trim_end_matches('/')),
            cache_path: cache_path.clone(),
            token_cached: true,
            token_refreshing: true,
            ..Default::default()
        };

        let client = Self {
            spotify: AuthCodeSpotify::with_config(creds, oauth, rs_config),
        };

        if !cache_path.exists() {
            info!(
                "No Spotify token cached at {} (run with --authorize)",
                cache_path.display()
            );
            return client;
        }

        match client.spotify.read_token_cache(true).await {
            Ok(Some(token)) => {
                debug!("Loaded cached Spotify token");
                client.set_token(Some(token)).await;
            }
            Ok(None) => warn!(
                "Cached Spotify token lacks the {} scope (run with --authorize)",
                SCOPE
            ),
            Err(e) => warn!("Ignoring unreadable Spotify token cache: {}", e),
        }
        client
    }

    /// URL the user opens to grant access
    pub fn authorize_url(&self) -> Result<String> {
        self.spotify
            .get_authorize_url(false)
            .map_err(|e| anyhow!("Failed to build Spotify authorize URL: {}", e))
    }

    /// Finish authorization from the redirect URL the browser landed on
    ///
    /// The token is stored in memory and written to the cache file.
    pub async fn complete_authorization(&self, redirect_url: &str) -> Result<()> {
        let redirect_url = redirect_url.trim();
        if redirect_url.is_empty() {
            return Err(anyhow!("Nothing pasted"));
        }

        let code = self.spotify.parse_response_code(redirect_url).with_context(|| {
            format!("No valid authorization code in {}", redirect_url)
        })?;

        self.spotify
            .request_token(&code)
            .await
            .map_err(PlaybackError::from)
            .context("Failed to exchange authorization code")
    }

    async fn set_token(&self, token: Option<Token>) {
        match self.spotify.token.lock().await {
            Ok(mut guard) => *guard = token,
            Err(e) => warn!("Spotify token lock unavailable: {:?}", e),
        }
    }

    /// Force the next query to refresh the access token
    async fn expire_token(&self) {
        if let Ok(mut guard) = self.spotify.token.lock().await {
            if let Some(token) = guard.as_mut() {
                token.expires_at = Some(chrono::Utc::now());
            }
        }
    }
}

#[async_trait]
impl PlaybackSource for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>, PlaybackError> {
        let context = match self
            .spotify
            .current_playback(None, Some(&ADDITIONAL_TYPES))
            .await
        {
            Ok(context) => context,
            Err(e) => {
                let err = PlaybackError::from(e);
                if matches!(err, PlaybackError::Auth(_)) {
                    self.expire_token().await;
                }
                return Err(err);
            }
        };

        context.map(snapshot_from_context).transpose()
    }
}

/// Reduce the player state to what the formatter needs
fn snapshot_from_context(context: CurrentPlaybackContext) -> Result<PlaybackSnapshot, PlaybackError> {
    if !context.is_playing {
        return Ok(PlaybackSnapshot::stopped());
    }

    let track = match context.item {
        Some(PlayableItem::Track(track)) => track,
        Some(PlayableItem::Episode(episode)) => {
            return Err(PlaybackError::Format(format!(
                "'{}' is an episode without artists",
                episode.name
            )))
        }
        None => return Err(PlaybackError::Format("playing but no item".to_string())),
    };

    let artist = track
        .artists
        .into_iter()
        .next()
        .map(|a| a.name)
        .ok_or_else(|| PlaybackError::Format(format!("'{}' has no artists", track.name)))?;
    let progress = context
        .progress
        .ok_or_else(|| PlaybackError::Format(format!("'{}' has no progress", track.name)))?;

    Ok(PlaybackSnapshot::playing(
        track.name,
        artist,
        millis(progress),
        millis(track.duration),
    ))
}

fn millis(duration: chrono::Duration) -> u64 {
    u64::try_from(duration.num_milliseconds()).unwrap_or(0)
}

impl From<ClientError> for PlaybackError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InvalidToken => {
                PlaybackError::Auth("no usable Spotify token; run with --authorize".to_string())
            }
            ClientError::Http(http) => match *http {
                HttpError::StatusCode(response) => {
                    let status = response.status();
                    match status.as_u16() {
                        400 | 401 | 403 => {
                            PlaybackError::Auth(format!("Spotify rejected the request ({})", status))
                        }
                        429 => PlaybackError::Transport("rate limited by Spotify".to_string()),
                        _ => PlaybackError::Transport(format!("Spotify returned {}", status)),
                    }
                }
                HttpError::Client(e) if e.is_timeout() => {
                    PlaybackError::Transport(format!("request timed out: {}", e))
                }
                other => PlaybackError::Transport(other.to_string()),
            },
            ClientError::ParseJson(e) => PlaybackError::Format(e.to_string()),
            other => PlaybackError::Transport(other.to_string()),
        }
    }
}
