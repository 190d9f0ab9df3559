//! Command-line checks run instead of starting the bot.
//!
//! ```text
//! perpetua-play --health-check     # yt-dlp is runnable
//! perpetua-play --check-config     # configuration + playlist load
//! perpetua-play --check-playlist   # probe every playlist entry
//! perpetua-play --check-token      # log in with DISCORD_TOKEN
//! ```

use anyhow::{bail, Result};
use async_process::Command;
use serenity::http::Http;
use std::fmt;

use crate::{
    audio::playlist::{Playlist, PlaylistEntry},
    config::{Config, PlaybackMode},
    error::ResolutionError,
    sources::{TrackInfo, TrackResolver},
    storage,
};

/// Chequeo solicitado por línea de comandos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Health,
    Config,
    Playlist,
    Token,
}

impl Check {
    pub fn from_args<I>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        args.into_iter().find_map(|arg| match arg.as_str() {
            "--health-check" => Some(Check::Health),
            "--check-config" => Some(Check::Config),
            "--check-playlist" => Some(Check::Playlist),
            "--check-token" => Some(Check::Token),
            _ => None,
        })
    }
}

/// Versión de yt-dlp instalada.
pub async fn ytdlp_version() -> Result<String> {
    let output = Command::new("yt-dlp").arg("--version").output().await?;
    if !output.status.success() {
        bail!("yt-dlp --version terminó con {}", output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub async fn health_check() -> Result<()> {
    match ytdlp_version().await {
        Ok(version) => {
            println!("OK (yt-dlp {version})");
            Ok(())
        }
        Err(e) => bail!("Dependencias faltantes: {e}"),
    }
}

/// Carga la playlist del modo configurado.
pub async fn load_tracks(config: &Config) -> Result<Playlist> {
    let playlist = match config.playback_mode {
        PlaybackMode::YouTube => storage::load_playlist(&config.playlist_path).await?,
        PlaybackMode::Local => storage::ensure_local_track(&config.local_track_path).await?,
    };
    Ok(playlist)
}

pub async fn check_config(config: &Config) -> Result<()> {
    let playlist = load_tracks(config).await?;

    println!("✅ Configuration is valid");
    println!("  DISCORD_TOKEN: set");
    println!("{}", config.summary());
    println!("  Tracks: {}", playlist.len());
    Ok(())
}

/// Inicia sesión en la API REST de Discord con el token configurado.
pub async fn check_token(config: &Config) -> Result<()> {
    println!("🔑 Checking DISCORD_TOKEN...");

    let http = Http::new(&config.discord_token);
    match http.get_current_user().await {
        Ok(user) => {
            println!("✅ Token is valid");
            println!("  Bot: {} ({})", user.tag(), user.id);
            Ok(())
        }
        Err(e) => bail!("Token rejected by Discord: {e}"),
    }
}

pub async fn check_playlist(config: &Config, resolver: &dyn TrackResolver) -> Result<()> {
    let playlist = load_tracks(config).await?;
    println!(
        "🔍 Checking {} tracks with the {} resolver...\n",
        playlist.len(),
        resolver.source_name()
    );

    let report = inspect_playlist(&playlist, resolver).await;
    println!("{report}");

    if !report.is_healthy() {
        bail!("{} of {} tracks failed", report.failed(), report.entries.len());
    }
    Ok(())
}

/// Resultado de la comprobación de una entrada.
#[derive(Debug)]
pub struct EntryReport {
    pub position: usize,
    pub reference: PlaylistEntry,
    pub outcome: Result<TrackInfo, ResolutionError>,
}

#[derive(Debug, Default)]
pub struct PlaylistReport {
    pub entries: Vec<EntryReport>,
}

impl PlaylistReport {
    pub fn passed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.passed()
    }

    pub fn is_healthy(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for PlaylistReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match &entry.outcome {
                Ok(info) => {
                    let duration = info
                        .duration
                        .map(|d| format!(" [{}s]", d.as_secs()))
                        .unwrap_or_default();
                    writeln!(f, "✅ {}. {}{}", entry.position + 1, info.title, duration)?;
                }
                Err(e) => writeln!(f, "❌ {}. {}: {}", entry.position + 1, entry.reference, e)?,
            }
        }
        write!(f, "\n{}/{} tracks OK", self.passed(), self.entries.len())
    }
}

/// Valida y consulta cada entrada de la playlist, en orden.
pub async fn inspect_playlist(playlist: &Playlist, resolver: &dyn TrackResolver) -> PlaylistReport {
    let mut report = PlaylistReport::default();

    for (position, reference) in playlist.entries().iter().enumerate() {
        let outcome = if resolver.validate(reference.as_str()) {
            resolver.probe(reference.as_str()).await
        } else {
            Err(ResolutionError::InvalidReference(reference.to_string()))
        };

        report.entries.push(EntryReport {
            position,
            reference: reference.clone(),
            outcome,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockTrackResolver;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_flags_are_recognised() {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(Check::from_args(args(&["bot", "--health-check"])), Some(Check::Health));
        assert_eq!(Check::from_args(args(&["bot", "--check-config"])), Some(Check::Config));
        assert_eq!(Check::from_args(args(&["bot", "--check-playlist"])), Some(Check::Playlist));
        assert_eq!(Check::from_args(args(&["bot", "--check-token"])), Some(Check::Token));
        assert_eq!(Check::from_args(args(&["bot"])), None);
    }

    #[tokio::test]
    async fn test_report_marks_invalid_and_failing_entries() {
        let playlist = Playlist::new(vec![
            PlaylistEntry::new("https://youtu.be/good"),
            PlaylistEntry::new("not-a-url"),
            PlaylistEntry::new("https://youtu.be/gone"),
        ])
        .unwrap();

        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_validate()
            .returning(|reference| reference.starts_with("https://"));
        resolver
            .expect_probe()
            .with(eq("https://youtu.be/good"))
            .times(1)
            .returning(|_| {
                Ok(TrackInfo {
                    title: "Good song".into(),
                    duration: Some(Duration::from_secs(200)),
                })
            });
        resolver
            .expect_probe()
            .with(eq("https://youtu.be/gone"))
            .times(1)
            .returning(|_| Err(ResolutionError::Extraction("Video unavailable".into())));

        let report = inspect_playlist(&playlist, &resolver).await;

        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 2);
        assert!(!report.is_healthy());
        assert_eq!(
            report.entries[1].outcome.as_ref().unwrap_err(),
            &ResolutionError::InvalidReference("not-a-url".into())
        );

        let text = report.to_string();
        assert!(text.contains("✅ 1. Good song [200s]"));
        assert!(text.contains("❌ 3. https://youtu.be/gone"));
        assert!(text.ends_with("1/3 tracks OK"));
    }
}
