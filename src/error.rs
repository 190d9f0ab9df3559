use std::path::PathBuf;
use thiserror::Error;

/// Errores de configuración. Son fatales durante el arranque.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("playlist not found at {0}")]
    PlaylistMissing(PathBuf),

    #[error("playlist at {path} is malformed: {source}")]
    PlaylistMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("playlist at {0} is empty")]
    PlaylistEmpty(PathBuf),

    #[error("local track not found at {0}")]
    LocalTrackMissing(PathBuf),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A track reference could not be turned into a playable stream.
///
/// Always recoverable: the player notifies, advances and retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("invalid track reference: {0}")]
    InvalidReference(String),

    #[error("bot detection challenge: {0}")]
    BotDetection(String),

    #[error("video is still being processed: {0}")]
    Processing(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("extraction failed: {0}")]
    Extraction(String),
}

impl ResolutionError {
    /// Clasifica la salida de error del extractor.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let detail = message.trim().to_string();

        if lower.contains("sign in to confirm") || lower.contains("not a bot") {
            Self::BotDetection(detail)
        } else if lower.contains("processing this video") {
            Self::Processing(detail)
        } else if lower.contains("unsupported url")
            || lower.contains("is not a valid url")
            || lower.contains("incomplete youtube id")
            || lower.contains("video unavailable")
        {
            Self::InvalidReference(detail)
        } else if lower.contains("timed out")
            || lower.contains("connection reset")
            || lower.contains("connection refused")
            || lower.contains("temporary failure in name resolution")
            || lower.contains("unable to download")
        {
            Self::Network(detail)
        } else {
            Self::Extraction(detail)
        }
    }
}

/// Fallo del transporte de voz.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("voice client is not initialised")]
    VoiceClientMissing,

    #[error("failed to join voice channel: {0}")]
    Join(#[from] songbird::error::JoinError),
}

/// Fallo de decodificación o salida durante la reproducción.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("track playback failed: {0}")]
    Track(String),

    #[error("no voice connection to play on")]
    NoConnection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bot_detection() {
        let err = ResolutionError::classify(
            "ERROR: [youtube] abc: Sign in to confirm you're not a bot",
        );
        assert!(matches!(err, ResolutionError::BotDetection(_)));
    }

    #[test]
    fn test_classify_processing_and_network() {
        assert!(matches!(
            ResolutionError::classify("We're processing this video. Check back later."),
            ResolutionError::Processing(_)
        ));
        assert!(matches!(
            ResolutionError::classify("ERROR: Unable to download webpage: timed out"),
            ResolutionError::Network(_)
        ));
        assert!(matches!(
            ResolutionError::classify("ERROR: Unsupported URL: https://example.com"),
            ResolutionError::InvalidReference(_)
        ));
        assert!(matches!(
            ResolutionError::classify("something odd happened"),
            ResolutionError::Extraction(_)
        ));
    }
}
