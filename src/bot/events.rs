use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent,
    tracks::{PlayMode, TrackHandle},
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use tracing::{error, info, warn};

use crate::{
    audio::{
        connection::{ConnectionEvent, LinkState},
        player::PlayerEvent,
    },
    bot::session::{GuildEvent, GuildHandle},
    error::PlaybackError,
};

/// Handler para cuando un track termina
pub struct TrackEndNotifier {
    pub guild_id: GuildId,
    pub epoch: u64,
    pub events: GuildHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        info!("🎵 Track terminó en guild {}", self.guild_id);

        self.events
            .send(GuildEvent::Player(PlayerEvent::TrackEnded { epoch: self.epoch }));

        None
    }
}

/// Handler para errores de tracks
pub struct TrackErrorNotifier {
    pub guild_id: GuildId,
    pub epoch: u64,
    pub events: GuildHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let mut reason = String::from("unknown playback error");

        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    reason = e.to_string();
                }
            }
        }

        error!("❌ Error en track para guild {}: {}", self.guild_id, reason);

        self.events.send(GuildEvent::Player(PlayerEvent::TrackFailed {
            epoch: self.epoch,
            error: PlaybackError::Track(reason),
        }));

        None
    }
}

/// Traduce los eventos del driver de voz a cambios de estado de la conexión.
pub struct DriverStateNotifier {
    pub guild_id: GuildId,
    pub events: GuildHandle,
}

#[async_trait]
impl VoiceEventHandler for DriverStateNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let state = match ctx {
            EventContext::DriverConnect(data) => {
                info!(
                    "🔗 Driver de voz conectado en guild {} (canal {:?})",
                    self.guild_id, data.channel_id
                );
                LinkState::Ready
            }
            EventContext::DriverReconnect(_) => {
                info!("🔄 Driver de voz reconectado en guild {}", self.guild_id);
                LinkState::Ready
            }
            EventContext::DriverDisconnect(data) => {
                warn!(
                    "🔌 Driver de voz desconectado en guild {}: {:?} ({:?})",
                    self.guild_id, data.kind, data.reason
                );
                LinkState::Disconnected
            }
            _ => return None,
        };

        self.events
            .send(GuildEvent::Connection(ConnectionEvent::StateChanged(state)));

        None
    }
}

/// Registra los handlers del driver en la llamada de un guild.
pub fn register_driver_events(call: &mut Call, guild_id: GuildId, events: GuildHandle) {
    for event in [
        CoreEvent::DriverConnect,
        CoreEvent::DriverReconnect,
        CoreEvent::DriverDisconnect,
    ] {
        call.add_global_event(
            VoiceEvent::Core(event),
            DriverStateNotifier {
                guild_id,
                events: events.clone(),
            },
        );
    }
}

/// Registra fin y error de la pista bajo el epoch con que se inició.
pub fn register_track_events(
    track: &TrackHandle,
    guild_id: GuildId,
    epoch: u64,
    events: GuildHandle,
) -> songbird::tracks::TrackResult<()> {
    track.add_event(
        VoiceEvent::Track(TrackEvent::End),
        TrackEndNotifier {
            guild_id,
            epoch,
            events: events.clone(),
        },
    )?;

    track.add_event(
        VoiceEvent::Track(TrackEvent::Error),
        TrackErrorNotifier {
            guild_id,
            epoch,
            events,
        },
    )
}
