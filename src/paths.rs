//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds only): `config.yaml` or `.env` in the current
//!   working directory pins everything to that directory.
//! - **Portable mode**: a `.portable` marker file next to the executable keeps
//!   config, credentials, token cache and logs beside it.
//! - **Installed mode** (default): data lives in the platform data directory
//!   (`%APPDATA%\NowPlaying OSC`, `~/.local/share/NowPlaying OSC`, ...).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "NowPlaying OSC";

/// Spotify token cache file name (same layout spotipy writes)
const TOKEN_CACHE_FILE: &str = ".spotify_cache";

/// Application paths for config, credentials, token cache and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the YAML configuration file
    pub config: PathBuf,
    /// Path to the `.env` file holding Spotify credentials
    pub env_file: PathBuf,
    /// Path to the cached OAuth tokens
    pub token_cache: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether everything lives in one user-chosen directory
    pub is_portable: bool,
}

impl AppPaths {
    /// Lay out all paths under one base directory.
    pub fn in_dir(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            env_file: base.join(".env"),
            token_cache: base.join(TOKEN_CACHE_FILE),
            logs_dir: base.join("logs"),
            is_portable,
        }
    }

    /// Detect the appropriate paths based on environment.
    ///
    /// Note: This is called before logging is initialized, so we use eprintln
    /// for early diagnostic output.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() || cwd.join(".env").exists() {
                eprintln!("[paths] Running in DEV mode (cwd: {})", cwd.display());
                return Self::in_dir(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::in_dir(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!(
                    "[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir"
                );
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!(
            "[paths] Running in INSTALLED mode (data dir: {})",
            app_data.display()
        );

        Self::in_dir(&app_data, false)
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the base and logs directories exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [self.base_dir(), self.logs_dir.clone()] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_dir_layout() {
        let paths = AppPaths::in_dir(Path::new("test"), true);

        assert!(paths.is_portable);
        assert_eq!(paths.config, PathBuf::from("test/config.yaml"));
        assert_eq!(paths.env_file, PathBuf::from("test/.env"));
        assert_eq!(paths.token_cache, PathBuf::from("test/.spotify_cache"));
        assert_eq!(paths.logs_dir, PathBuf::from("test/logs"));
        assert_eq!(paths.base_dir(), PathBuf::from("test"));
    }

    #[test]
    fn test_ensure_directories_creates_tree() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("nested").join("app");
        let paths = AppPaths::in_dir(&base, false);

        paths.ensure_directories().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir.is_dir());
    }
}
