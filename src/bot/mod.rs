//! # Bot Module
//!
//! Discord gateway side of the bot.
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] trait. It does very
//! little itself:
//!
//! - `message`: parses chat commands and hands them to the guild's worker
//! - `voice_state_update`: reports the bot's own voice state changes
//! - `ready`: sets the avatar and starts background maintenance
//! - `shard_stage_update` / `resume`: gateway connection logging
//!
//! All playback and voice state lives in the per-guild workers of
//! [`session::SessionRegistry`].

use anyhow::Result;
use serenity::{
    all::{
        ChannelId, Context, CreateAttachment, EditProfile, EventHandler, GuildId, Message, Ready,
        ResumedEvent, ShardStageUpdateEvent, UserId, VoiceState,
    },
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod session;

use crate::{
    audio::connection::{ConnectionEvent, LinkState},
    cache::TrackInfoCache,
    config::Config,
    error::ConnectionError,
    preflight,
};
use commands::Command;
use session::{CommandRequest, GuildEvent, SessionRegistry};

/// Intervalo de las tareas de mantenimiento.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: bot configuration
/// - `cache`: track metadata cache shared with the resolver
/// - `sessions`: per-guild workers
pub struct MusicBot {
    config: Arc<Config>,
    cache: TrackInfoCache,
    sessions: Arc<SessionRegistry>,
    maintenance_started: AtomicBool,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, cache: TrackInfoCache, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            cache,
            sessions,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Envía un comando de chat al worker del guild.
    async fn dispatch(&self, ctx: &Context, msg: &Message, guild_id: GuildId, command: Command) -> Result<()> {
        let voice = songbird::get(ctx)
            .await
            .ok_or(ConnectionError::VoiceClientMissing)?;

        let voice_channel = if command.needs_voice_channel() {
            user_voice_channel(ctx, guild_id, msg.author.id)
        } else {
            None
        };

        let handle = self.sessions.get_or_spawn(guild_id, &ctx.http, &voice);
        handle.send(GuildEvent::Command {
            command,
            request: CommandRequest {
                text_channel: msg.channel_id,
                message_id: msg.id,
                voice_channel,
            },
        });

        Ok(())
    }

    /// Usa el logo como avatar si la cuenta todavía tiene el avatar por defecto.
    async fn apply_logo(&self, ctx: &Context) -> Result<()> {
        let mut user = ctx.cache.current_user().clone();
        if user.avatar.is_some() {
            debug!("El bot ya tiene avatar personalizado");
            return Ok(());
        }

        if !self.config.logo_path.is_file() {
            debug!("Logo no encontrado en {}", self.config.logo_path.display());
            return Ok(());
        }

        let avatar = CreateAttachment::path(&self.config.logo_path).await?;
        user.edit(&ctx.http, EditProfile::new().avatar(&avatar)).await?;
        info!("🖼️ Avatar actualizado desde {}", self.config.logo_path.display());
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("🎵 Modo de reproducción: {}", self.config.playback_mode.as_str());

        if let Err(e) = self.apply_logo(&ctx).await {
            warn!("⚠️ No se pudo establecer el avatar: {:?}", e);
        }

        // `ready` se repite tras reconexiones del gateway
        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let cache = self.cache.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                maintenance_tasks(config, cache).await;
            });
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&msg.content) else {
            return;
        };

        if let Err(e) = self.dispatch(&ctx, &msg, guild_id, command).await {
            error!("Error manejando comando {}: {:?}", command, e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(handle) = self.sessions.get(guild_id) else {
            return;
        };

        let old_channel = old.and_then(|state| state.channel_id);
        match (old_channel, new.channel_id) {
            (_, None) => info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id),
            (Some(from), Some(to)) if from != to => {
                info!("↪️ Bot movido de {} a {} en guild {}", from, to, guild_id)
            }
            _ => {}
        }

        if let Some(state) = own_voice_transition(old_channel, new.channel_id) {
            handle.send(GuildEvent::Connection(ConnectionEvent::StateChanged(state)));
        }
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        info!(
            "🛰️ Shard {}: {:?} -> {:?}",
            event.shard_id.0, event.old, event.new
        );
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        info!("🔁 Sesión del gateway reanudada");
    }
}

/// Estado de enlace que implica un cambio de canal del propio bot.
///
/// La primera unión no produce nada: el worker ya aplica `Ready` cuando
/// `Songbird::join` vuelve, y este aviso llega después.
fn own_voice_transition(from: Option<ChannelId>, to: Option<ChannelId>) -> Option<LinkState> {
    match (from, to) {
        (_, None) => Some(LinkState::Destroyed),
        (Some(from), Some(to)) if from != to => Some(LinkState::Connecting),
        _ => None,
    }
}

/// Canal de voz en el que está el usuario, según la caché.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Runs periodic maintenance tasks in the background.
///
/// Every hour:
/// 1. **Cache cleanup**: drops expired track metadata
/// 2. **yt-dlp check**: warns early if the extractor stopped working
async fn maintenance_tasks(config: Arc<Config>, cache: TrackInfoCache) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        cache.cleanup_old_entries();

        if config.playback_mode.needs_extractor() {
            if let Err(e) = preflight::ytdlp_version().await {
                warn!("Error verificando yt-dlp: {:?}", e);
            }
        }

        info!("🧹 Tareas de mantenimiento completadas");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_join_does_not_report_connecting() {
        let channel = ChannelId::new(1);
        assert_eq!(own_voice_transition(None, Some(channel)), None);
        assert_eq!(own_voice_transition(Some(channel), Some(channel)), None);
    }

    #[test]
    fn test_move_and_disconnect_are_reported() {
        let from = ChannelId::new(1);
        let to = ChannelId::new(2);
        assert_eq!(
            own_voice_transition(Some(from), Some(to)),
            Some(LinkState::Connecting)
        );
        assert_eq!(own_voice_transition(Some(from), None), Some(LinkState::Destroyed));
    }
}
