use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{audio::connection::ReconnectPolicy, error::ConfigError};

/// Origen de las pistas que reproduce el bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Recorre la playlist de YouTube en bucle.
    YouTube,
    /// Repite un único archivo local.
    Local,
}

impl PlaybackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::YouTube => "youtube",
            PlaybackMode::Local => "local",
        }
    }

    /// Solo el modo YouTube depende de yt-dlp.
    pub fn needs_extractor(&self) -> bool {
        matches!(self, PlaybackMode::YouTube)
    }
}

impl FromStr for PlaybackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" | "yt" | "1" => Ok(Self::YouTube),
            "local" | "file" | "2" => Ok(Self::Local),
            other => Err(format!("expected `youtube` or `local`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Reproducción
    pub playback_mode: PlaybackMode,
    pub playlist_path: PathBuf,
    pub local_track_path: PathBuf,
    pub default_volume: f32,

    // Reconexión
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub resume_timeout_ms: u64,

    // Extractor
    pub ytdlp_cookies: Option<PathBuf>,
    pub metadata_cache_ttl: u64, // En segundos

    // Presentación
    pub logo_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una fuente clave/valor.
    ///
    /// `load` usa el entorno del proceso; los tests pasan un mapa.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let discord_token = lookup("DISCORD_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let config = Self {
            discord_token,

            playback_mode: parse_or(&lookup, "PLAYBACK_MODE", defaults.playback_mode)?,
            playlist_path: lookup("PLAYLIST_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.playlist_path),
            local_track_path: lookup("LOCAL_TRACK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.local_track_path),
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,

            auto_reconnect: parse_or(&lookup, "AUTO_RECONNECT", defaults.auto_reconnect)?,
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
            reconnect_delay_ms: parse_or(&lookup, "RECONNECT_DELAY", defaults.reconnect_delay_ms)?,
            backoff_multiplier: parse_or(
                &lookup,
                "BACKOFF_MULTIPLIER",
                defaults.backoff_multiplier,
            )?,
            resume_timeout_ms: parse_or(&lookup, "RESUME_TIMEOUT", defaults.resume_timeout_ms)?,

            ytdlp_cookies: lookup("YTDLP_COOKIES")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            metadata_cache_ttl: parse_or(
                &lookup,
                "METADATA_CACHE_TTL",
                defaults.metadata_cache_ttl,
            )?,

            logo_path: lookup("LOGO_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.logo_path),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Backoff multiplier must be at least 1.0
    /// - Reconnect delays must be positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_VOLUME",
                reason: format!("must be between 0.0 and 2.0, got {}", self.default_volume),
            });
        }

        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(ConfigError::Invalid {
                key: "BACKOFF_MULTIPLIER",
                reason: format!("must be >= 1.0, got {}", self.backoff_multiplier),
            });
        }

        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "RECONNECT_DELAY",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.resume_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "RESUME_TIMEOUT",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Política de reconexión derivada de la configuración.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.auto_reconnect,
            max_attempts: self.max_reconnect_attempts,
            resume_timeout: Duration::from_millis(self.resume_timeout_ms),
            rejoin_delay: Duration::from_millis(self.reconnect_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Mode: {} (playlist: {}, local: {})\n  \
            Audio: {}% vol\n  \
            Reconnect: enabled={}, {} attempts, {}ms delay, x{} backoff, {}ms resume wait\n  \
            Extractor: cookies={}, metadata TTL {}s",
            self.playback_mode.as_str(),
            self.playlist_path.display(),
            self.local_track_path.display(),
            (self.default_volume * 100.0) as u32,
            self.auto_reconnect,
            self.max_reconnect_attempts,
            self.reconnect_delay_ms,
            self.backoff_multiplier,
            self.resume_timeout_ms,
            self.ytdlp_cookies.is_some(),
            self.metadata_cache_ttl,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valor por defecto, debe proporcionarse)
            discord_token: String::new(),

            playback_mode: PlaybackMode::YouTube,
            playlist_path: "config/playlist.json".into(),
            local_track_path: "local/song.mp3".into(),
            default_volume: 0.5,

            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 5000,
            backoff_multiplier: 1.0,
            resume_timeout_ms: 5000,

            ytdlp_cookies: None,
            metadata_cache_ttl: 3600, // 1 hora

            logo_path: "logo/logo.png".into(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}
