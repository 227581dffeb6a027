//! First-run setup
//!
//! Prompts for the Spotify application credentials, stores them in the
//! `.env` file and exports them into the current process. Also hosts the
//! one-time authorization-code exchange that fills the token cache.

use anyhow::{Context, Result};
use colored::*;
use rustyline::DefaultEditor;
use std::path::Path;
use tracing::info;

use crate::config::Credentials;
use crate::playback::SpotifyClient;

/// Redirect URI suggested when none is entered
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Ask for credentials on the terminal and persist them to `env_path`
pub fn run_setup_wizard(env_path: &Path) -> Result<Credentials> {
    println!("\n{}", "=== Spotify setup ===".bold().cyan());
    println!("Create an app at https://developer.spotify.com/dashboard and copy its values.");
    println!(
        "Add {} as a redirect URI in the app settings.\n",
        DEFAULT_REDIRECT_URI.yellow()
    );

    let mut rl = DefaultEditor::new()?;
    let client_id = prompt(&mut rl, "Client ID: ", None)?;
    let client_secret = prompt(&mut rl, "Client secret: ", None)?;
    let redirect_uri = prompt(&mut rl, "Redirect URI: ", Some(DEFAULT_REDIRECT_URI))?;

    let credentials = Credentials {
        client_id,
        client_secret,
        redirect_uri,
    };

    write_env_file(env_path, &credentials)?;
    export_credentials(&credentials);

    println!(
        "{} {}",
        "✅ Credentials saved to".green(),
        env_path.display()
    );
    info!("Spotify credentials written to {}", env_path.display());

    Ok(credentials)
}

fn prompt(rl: &mut DefaultEditor, label: &str, default: Option<&str>) -> Result<String> {
    loop {
        let line = match default {
            Some(default) => rl.readline_with_initial(label, (default, "")),
            None => rl.readline(label),
        }
        .context("Setup cancelled")?;

        let value = line.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
        println!("{}", "A value is required".red());
    }
}

/// Make the credentials visible to the config resolver in this process
fn export_credentials(credentials: &Credentials) {
    std::env::set_var("SPOTIFY_CLIENT_ID", &credentials.client_id);
    std::env::set_var("SPOTIFY_CLIENT_SECRET", &credentials.client_secret);
    std::env::set_var("SPOTIFY_REDIRECT_URI", &credentials.redirect_uri);
}

/// Write the credentials into a `.env` file, keeping unrelated lines
pub fn write_env_file(path: &Path, credentials: &Credentials) -> Result<()> {
    const MANAGED: [&str; 6] = [
        "SPOTIFY_CLIENT_ID",
        "SPOTIFY_CLIENT_SECRET",
        "SPOTIFY_REDIRECT_URI",
        "client_id",
        "client_secret",
        "redirect_uri",
    ];

    let existing = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| {
            let key = line
                .trim_start()
                .trim_start_matches("export ")
                .split('=')
                .next()
                .unwrap_or("")
                .trim();
            !MANAGED.contains(&key)
        })
        .map(str::to_string)
        .collect();

    for (key, value) in [
        ("SPOTIFY_CLIENT_ID", &credentials.client_id),
        ("SPOTIFY_CLIENT_SECRET", &credentials.client_secret),
        ("SPOTIFY_REDIRECT_URI", &credentials.redirect_uri),
    ] {
        lines.push(format!("{}=\"{}\"", key, escape_env_value(value)));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

fn escape_env_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Run the authorization-code flow interactively and fill the token cache
pub async fn run_authorize(client: &SpotifyClient) -> Result<()> {
    let url = client.authorize_url()?;

    println!("\n{}", "=== Spotify authorization ===".bold().cyan());
    println!("1. Open this URL and approve access:\n\n   {}\n", url.yellow());
    println!("2. Paste the address your browser was redirected to.\n");

    let pasted = tokio::task::spawn_blocking(|| -> Result<String> {
        let mut rl = DefaultEditor::new()?;
        Ok(rl.readline("Redirect URL: ")?)
    })
    .await
    .context("Authorization prompt panicked")??;

    client.complete_authorization(&pasted).await?;

    println!("{}", "✅ Spotify authorized".green());
    info!("Spotify token cache created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn credentials() -> Credentials {
        Credentials {
            client_id: "abc".to_string(),
            client_secret: "s3cr\"t".to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }

    fn read_back(path: &Path) -> Vec<(String, String)> {
        dotenvy::from_path_iter(path)
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
    }

    #[test]
    fn test_write_env_file_round_trips_through_dotenvy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");

        write_env_file(&path, &credentials()).unwrap();

        let vars = read_back(&path);
        assert!(vars.contains(&("SPOTIFY_CLIENT_ID".to_string(), "abc".to_string())));
        assert!(vars.contains(&("SPOTIFY_CLIENT_SECRET".to_string(), "s3cr\"t".to_string())));
        assert!(vars.contains(&(
            "SPOTIFY_REDIRECT_URI".to_string(),
            DEFAULT_REDIRECT_URI.to_string()
        )));
    }

    #[test]
    fn test_write_env_file_replaces_old_keys_and_keeps_others() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        std::fs::write(
            &path,
            "LOG_LEVEL=debug\nclient_id=old\nSPOTIFY_CLIENT_SECRET=old\n",
        )
        .unwrap();

        write_env_file(&path, &credentials()).unwrap();

        let vars = read_back(&path);
        assert!(vars.contains(&("LOG_LEVEL".to_string(), "debug".to_string())));
        assert!(!vars.iter().any(|(k, _)| k == "client_id"));
        let secrets: Vec<_> = vars
            .iter()
            .filter(|(k, _)| k == "SPOTIFY_CLIENT_SECRET")
            .collect();
        assert_eq!(secrets.len(), 1);
    }
}
