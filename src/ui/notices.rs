use std::fmt;

use crate::{
    audio::playlist::PlaylistEntry,
    config::PlaybackMode,
    error::{PlaybackError, ResolutionError},
};

/// Mensajes de chat que producen las máquinas de estado y el despachador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    AlreadyPlaying,
    JoinVoiceChannel,
    JoinFailed,
    Started { tracks: usize, mode: PlaybackMode },
    Joined,
    Stopped,
    Left,
    Skipped { position: usize, total: usize },
    Restarting,
    NothingPlaying,
    NowPlaying { title: String, reference: PlaylistEntry },
    TrackFailed {
        reference: PlaylistEntry,
        position: usize,
        error: ResolutionError,
    },
    PlaybackFailed {
        reference: PlaylistEntry,
        position: usize,
        error: PlaybackError,
    },
    ConnectionLost { attempt: u32, max_attempts: u32 },
    ReconnectAbandoned { attempts: u32 },
}

impl Notice {
    /// Los avisos de error se registran con nivel `warn`.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notice::JoinFailed
                | Notice::TrackFailed { .. }
                | Notice::PlaybackFailed { .. }
                | Notice::ConnectionLost { .. }
                | Notice::ReconnectAbandoned { .. }
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::AlreadyPlaying => write!(f, "🎵 Already playing and looping the playlist!"),
            Notice::JoinVoiceChannel => write!(f, "❌ Join a voice channel first!"),
            Notice::JoinFailed => write!(f, "❌ Failed to join voice channel or start playback."),
            Notice::Started { tracks, mode } => match mode {
                PlaybackMode::YouTube => {
                    write!(f, "🎵 Started playing the playlist! ({tracks} songs)")
                }
                PlaybackMode::Local => write!(f, "🎵 Started playing the local file on repeat!"),
            },
            Notice::Joined => write!(f, "✅ Joined your voice channel!"),
            Notice::Stopped => write!(f, "⏹️ Stopped playback and left the voice channel."),
            Notice::Left => write!(f, "👋 Left the voice channel."),
            Notice::Skipped { position, total } => write!(
                f,
                "⏭️ Skipped to the next song. ({}/{})",
                position + 1,
                total
            ),
            Notice::Restarting => write!(f, "🔄 Restarting local file..."),
            Notice::NothingPlaying => write!(f, "❌ Nothing is playing!"),
            Notice::NowPlaying { title, reference } => {
                write!(f, "🎵 Now playing: **{title}**\n{reference}")
            }
            Notice::TrackFailed {
                reference,
                position,
                error,
            } => match error {
                ResolutionError::Processing(_) => write!(
                    f,
                    "⏳ Video is being processed by YouTube, skipping song {}: {reference}",
                    position + 1
                ),
                ResolutionError::BotDetection(_) => write!(
                    f,
                    "🤖 Bot detection error, skipping song {}: {reference}\n\
                     💡 Consider setting up YouTube cookies (YTDLP_COOKIES)",
                    position + 1
                ),
                ResolutionError::InvalidReference(_) => write!(
                    f,
                    "❌ Invalid track reference at song {}: {reference}\nSkipping to next song...",
                    position + 1
                ),
                ResolutionError::Network(_) | ResolutionError::Extraction(_) => write!(
                    f,
                    "❌ Failed to play song {}: {reference}\nSkipping to next song...",
                    position + 1
                ),
            },
            Notice::PlaybackFailed {
                reference,
                position,
                error,
            } => write!(
                f,
                "❌ Playback error on song {}: {reference} ({error})\nSkipping to next song...",
                position + 1
            ),
            Notice::ConnectionLost {
                attempt,
                max_attempts,
            } => write!(
                f,
                "⚠️ Voice connection lost. Attempting to reconnect... ({attempt}/{max_attempts})"
            ),
            Notice::ReconnectAbandoned { attempts } => write!(
                f,
                "❌ Lost connection to voice channel after {attempts} attempts. Use `!play` to restart."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_notices_reference_track() {
        let notice = Notice::TrackFailed {
            reference: PlaylistEntry::new("https://youtu.be/b"),
            position: 1,
            error: ResolutionError::Network("timed out".into()),
        };
        let text = notice.to_string();
        assert!(text.contains("https://youtu.be/b"));
        assert!(text.contains("song 2"));
        assert!(notice.is_failure());
    }

    #[test]
    fn test_bot_detection_hints_cookies() {
        let notice = Notice::TrackFailed {
            reference: PlaylistEntry::new("https://youtu.be/x"),
            position: 0,
            error: ResolutionError::BotDetection("sign in".into()),
        };
        assert!(notice.to_string().contains("cookies"));
    }
}
