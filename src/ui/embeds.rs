use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::{path::Path, time::Duration};

use crate::{audio::player::NowPlaying, config::PlaybackMode};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Perpetua Play · 24/7";

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(track: &NowPlaying, duration: Option<Duration>) -> CreateEmbed {
    let reference = track.reference.as_str();

    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field(
            "📋 Position",
            format!("Song {} of {}", track.position + 1, track.total),
            true,
        );

    embed = match duration {
        Some(duration) => embed.field("⏱️ Duration", format_duration(duration), true),
        None => embed.field("⏱️ Duration", "🔴 Unknown", true),
    };

    if reference.starts_with("http") {
        embed = embed.url(reference);
    }

    embed
        .field("🔗 Source", reference, false)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de ayuda con el estado actual del guild
pub fn help_embed(mode: PlaybackMode, playing: bool) -> CreateEmbed {
    let status = if playing { "▶️ Playing" } else { "⏹️ Stopped" };
    let color = if playing {
        colors::INFO_BLUE
    } else {
        colors::NEUTRAL_GRAY
    };

    CreateEmbed::default()
        .title("🎵 24/7 Music Bot Commands")
        .color(color)
        .description("Plays the configured playlist on a loop in your voice channel.")
        .field(
            "🎵 Music",
            "• `!play` - Start playing the playlist\n\
            • `!stop` - Stop and leave the voice channel\n\
            • `!skip` - Skip to the next song\n\
            • `!nowplaying` / `!np` - Show the current song",
            false,
        )
        .field(
            "🔊 Voice",
            "• `!join` - Join your voice channel\n\
            • `!leave` - Leave the voice channel",
            false,
        )
        .field(
            "📊 Status",
            format!("Mode: {}\n{}", mode.as_str(), status),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Usa el logo adjunto al mensaje como miniatura del embed.
pub fn with_logo(embed: CreateEmbed, logo: &Path) -> CreateEmbed {
    match logo.file_name() {
        Some(name) => embed.thumbnail(format!("attachment://{}", name.to_string_lossy())),
        None => embed,
    }
}

/// Formatea duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_logo_becomes_attachment_thumbnail() {
        let embed = with_logo(
            help_embed(PlaybackMode::YouTube, false),
            Path::new("logo/logo.png"),
        );
        let json = serde_json::to_value(&embed).unwrap();
        assert_eq!(json["thumbnail"]["url"], "attachment://logo.png");
    }
}
