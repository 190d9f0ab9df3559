//! # Guild sessions
//!
//! Every guild gets one [`GuildWorker`]: a tokio task that owns the guild's
//! [`PlayerSession`] and [`ConnectionSession`] and consumes a queue of
//! [`GuildEvent`]s one at a time. Chat commands, songbird callbacks, resolver
//! results and timers all arrive through that queue, so the state machines are
//! never touched concurrently.
//!
//! The state machines only describe side effects; the worker executes them:
//!
//! - **Timers and resolves** are spawned tasks guarded by a
//!   [`CancellationToken`]. A `CancelPending` effect cancels the token, so a
//!   superseded resolve can never feed a stream into a newer session.
//! - **Resolved streams** are parked together with their epoch and only played
//!   when the player emits `Play` for that same epoch.
//! - **Voice** operations go through songbird's [`Songbird`] manager.
//!
//! The [`SessionRegistry`] maps guild ids to worker handles. Workers persist
//! for the lifetime of the process; stopping a guild resets its sessions.

use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::{
    builder::{CreateAttachment, CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use songbird::{tracks::TrackHandle, Call, Songbird};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        connection::{ConnectionEffect, ConnectionEvent, ConnectionSession, LinkState},
        player::{PlayerEffect, PlayerEvent, PlayerSession, PlayerState, PlayerTimings},
        playlist::{Playlist, PlaylistEntry},
    },
    bot::{commands::Command, events},
    config::Config,
    error::{ConnectionError, PlaybackError, ResolutionError},
    sources::{ResolvedTrack, TrackInfo, TrackResolver},
    ui::{embeds, notices::Notice},
};

/// Datos del mensaje que originó un comando.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    pub text_channel: ChannelId,
    pub message_id: MessageId,
    /// Canal de voz del autor, si está en uno.
    pub voice_channel: Option<ChannelId>,
}

/// Eventos que consume el worker de un guild.
#[derive(Debug)]
pub enum GuildEvent {
    Command {
        command: Command,
        request: CommandRequest,
    },
    Player(PlayerEvent),
    Connection(ConnectionEvent),
    ResolveFinished {
        epoch: u64,
        result: Result<ResolvedTrack, ResolutionError>,
    },
}

/// Instantánea del estado de un guild, legible sin pasar por el worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub player: PlayerState,
    pub link: LinkState,
    pub position: usize,
    pub reconnect_attempts: u32,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            player: PlayerState::Stopped,
            link: LinkState::Destroyed,
            position: 0,
            reconnect_attempts: 0,
        }
    }
}

/// Handle clonable hacia el worker de un guild.
#[derive(Debug, Clone)]
pub struct GuildHandle {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<GuildEvent>,
    status: Arc<RwLock<SessionStatus>>,
}

impl GuildHandle {
    /// Encola un evento. Devuelve `false` si el worker ya no existe.
    pub fn send(&self, event: GuildEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!("⚠️ Worker del guild {} no disponible", self.guild_id);
                false
            }
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }
}

/// Recursos compartidos por todos los workers.
struct Shared {
    config: Arc<Config>,
    resolver: Arc<dyn TrackResolver>,
    playlist: Playlist,
}

/// Mapa de guild a worker.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, GuildHandle>,
    shared: Arc<Shared>,
}

impl SessionRegistry {
    pub fn new(config: Arc<Config>, resolver: Arc<dyn TrackResolver>, playlist: Playlist) -> Self {
        Self {
            sessions: DashMap::new(),
            shared: Arc::new(Shared {
                config,
                resolver,
                playlist,
            }),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildHandle> {
        self.sessions.get(&guild_id).map(|handle| handle.clone())
    }

    /// Devuelve el worker del guild, creándolo si no existe.
    pub fn get_or_spawn(
        &self,
        guild_id: GuildId,
        http: &Arc<Http>,
        voice: &Arc<Songbird>,
    ) -> GuildHandle {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Creando sesión para guild {}", guild_id);
                GuildWorker::spawn(guild_id, self.shared.clone(), http.clone(), voice.clone())
            })
            .clone()
    }

    /// Guilds con reproducción activa.
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.status().player != PlayerState::Stopped)
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Transición pendiente dentro de un mismo evento.
enum Step {
    Player(PlayerEvent),
    Connection(ConnectionEvent),
}

struct GuildWorker {
    guild_id: GuildId,
    shared: Arc<Shared>,
    http: Arc<Http>,
    voice: Arc<Songbird>,
    handle: GuildHandle,
    player: PlayerSession,
    connection: ConnectionSession,
    player_pending: CancellationToken,
    connection_pending: CancellationToken,
    /// Stream resuelto esperando el `Play` de su epoch.
    parked: Option<(u64, ResolvedTrack)>,
    track: Option<TrackHandle>,
    track_info: Option<TrackInfo>,
    driver_hooks: bool,
    text_channel: Option<ChannelId>,
    /// Mensaje al que responder mientras se procesa un comando.
    reply_to: Option<MessageId>,
}

impl GuildWorker {
    fn spawn(
        guild_id: GuildId,
        shared: Arc<Shared>,
        http: Arc<Http>,
        voice: Arc<Songbird>,
    ) -> GuildHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = GuildHandle {
            guild_id,
            tx,
            status: Arc::new(RwLock::new(SessionStatus::default())),
        };

        let player = PlayerSession::new(
            shared.playlist.fresh(),
            shared.config.playback_mode,
            PlayerTimings::default(),
        );
        let connection = ConnectionSession::new(shared.config.reconnect_policy());

        let worker = Self {
            guild_id,
            shared,
            http,
            voice,
            handle: handle.clone(),
            player,
            connection,
            player_pending: CancellationToken::new(),
            connection_pending: CancellationToken::new(),
            parked: None,
            track: None,
            track_info: None,
            driver_hooks: false,
            text_channel: None,
            reply_to: None,
        };

        tokio::spawn(worker.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GuildEvent>) {
        debug!("▶️ Worker iniciado para guild {}", self.guild_id);

        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
            self.publish_status();
        }

        debug!("⏹️ Worker finalizado para guild {}", self.guild_id);
    }

    async fn handle_event(&mut self, event: GuildEvent) {
        match event {
            GuildEvent::Command { command, request } => {
                self.text_channel = Some(request.text_channel);
                self.reply_to = Some(request.message_id);
                self.handle_command(command, request.voice_channel).await;
                self.reply_to = None;
            }
            GuildEvent::Player(event) => self.drive(Step::Player(event)).await,
            GuildEvent::Connection(event) => self.drive(Step::Connection(event)).await,
            GuildEvent::ResolveFinished { epoch, result } => match result {
                Ok(track) => {
                    let title = track.info.title.clone();
                    self.parked = Some((epoch, track));
                    self.drive(Step::Player(PlayerEvent::Resolved { epoch, title }))
                        .await;
                }
                Err(error) => {
                    self.drive(Step::Player(PlayerEvent::ResolveFailed { epoch, error }))
                        .await;
                }
            },
        }
    }

    async fn handle_command(&mut self, command: Command, voice_channel: Option<ChannelId>) {
        info!("📨 {} en guild {}", command, self.guild_id);

        match command {
            Command::Play => {
                if self.player.is_active() {
                    self.notify(Notice::AlreadyPlaying).await;
                    return;
                }
                if !self.ensure_connected(voice_channel).await {
                    return;
                }

                self.notify(Notice::Started {
                    tracks: self.player.track_count(),
                    mode: self.player.mode(),
                })
                .await;
                self.drive(Step::Player(PlayerEvent::Start)).await;
            }
            Command::Join => {
                if self.ensure_connected(voice_channel).await {
                    self.notify(Notice::Joined).await;
                }
            }
            Command::Stop => {
                self.drive(Step::Player(PlayerEvent::Stop)).await;
                self.notify(Notice::Stopped).await;
            }
            Command::Leave => {
                self.drive(Step::Player(PlayerEvent::Stop)).await;
                self.notify(Notice::Left).await;
            }
            Command::Skip => self.drive(Step::Player(PlayerEvent::Skip)).await,
            Command::NowPlaying => match self.player.now_playing() {
                Some(now_playing) => {
                    let duration = self.track_info.as_ref().and_then(|info| info.duration);
                    self.send_embed(embeds::now_playing_embed(&now_playing, duration))
                        .await;
                }
                None => self.notify(Notice::NothingPlaying).await,
            },
            Command::Help => {
                let embed = embeds::help_embed(self.player.mode(), self.player.is_playing());
                self.send_embed(embed).await;
            }
        }
    }

    /// Une al bot al canal de voz del autor. Responde el error si no es posible.
    async fn ensure_connected(&mut self, voice_channel: Option<ChannelId>) -> bool {
        let Some(channel) = voice_channel else {
            self.notify(Notice::JoinVoiceChannel).await;
            return false;
        };

        self.drive(Step::Connection(ConnectionEvent::Join(channel)))
            .await;

        if self.connection.is_established() {
            true
        } else {
            self.notify(Notice::JoinFailed).await;
            false
        }
    }

    /// Aplica un evento y todos los que se deriven de sus efectos.
    async fn drive(&mut self, first: Step) {
        let mut queue = VecDeque::from([first]);

        while let Some(step) = queue.pop_front() {
            match step {
                Step::Player(event) => {
                    for effect in self.player.handle(event) {
                        self.run_player_effect(effect, &mut queue).await;
                    }
                }
                Step::Connection(event) => {
                    for effect in self.connection.handle(event) {
                        self.run_connection_effect(effect, &mut queue).await;
                    }
                }
            }
        }
    }

    async fn run_player_effect(&mut self, effect: PlayerEffect, queue: &mut VecDeque<Step>) {
        match effect {
            PlayerEffect::Resolve { epoch, reference } => self.spawn_resolve(epoch, reference),
            PlayerEffect::Play { epoch } => {
                if let Err(error) = self.play(epoch).await {
                    queue.push_back(Step::Player(PlayerEvent::TrackFailed { epoch, error }));
                }
            }
            PlayerEffect::StopAudio => self.stop_audio(),
            PlayerEffect::CancelPending => {
                self.player_pending.cancel();
                self.player_pending = CancellationToken::new();
                self.parked = None;
            }
            PlayerEffect::Schedule { epoch, delay } => self.spawn_timer(
                self.player_pending.clone(),
                delay,
                GuildEvent::Player(PlayerEvent::RetryElapsed { epoch }),
            ),
            PlayerEffect::Notify(notice) => self.notify(notice).await,
            PlayerEffect::ReleaseConnection => {
                queue.push_back(Step::Connection(ConnectionEvent::Teardown));
            }
        }
    }

    async fn run_connection_effect(
        &mut self,
        effect: ConnectionEffect,
        queue: &mut VecDeque<Step>,
    ) {
        match effect {
            ConnectionEffect::Join { channel } => match self.join(channel).await {
                Ok(()) => queue.push_back(Step::Connection(ConnectionEvent::StateChanged(
                    LinkState::Ready,
                ))),
                Err(e) => {
                    error!("❌ No se pudo unir al canal {} en guild {}: {}", channel, self.guild_id, e);
                    queue.push_back(Step::Connection(ConnectionEvent::JoinFailed));
                }
            },
            ConnectionEffect::Rejoin { channel } => {
                info!("🔄 Reconectando al canal {} en guild {}", channel, self.guild_id);
                match self.join(channel).await {
                    Ok(()) => queue.push_back(Step::Connection(ConnectionEvent::StateChanged(
                        LinkState::Ready,
                    ))),
                    Err(e) => {
                        warn!("⚠️ Reconexión fallida en guild {}: {}", self.guild_id, e);
                        queue.push_back(Step::Connection(ConnectionEvent::StateChanged(
                            LinkState::Disconnected,
                        )));
                    }
                }
            }
            ConnectionEffect::AwaitResume { epoch, timeout } => self.spawn_timer(
                self.connection_pending.clone(),
                timeout,
                GuildEvent::Connection(ConnectionEvent::ResumeWaitElapsed { epoch }),
            ),
            ConnectionEffect::ScheduleRejoin { epoch, delay } => self.spawn_timer(
                self.connection_pending.clone(),
                delay,
                GuildEvent::Connection(ConnectionEvent::RejoinDelayElapsed { epoch }),
            ),
            ConnectionEffect::CancelPending => {
                self.connection_pending.cancel();
                self.connection_pending = CancellationToken::new();
            }
            ConnectionEffect::Notify(notice) => self.notify(notice).await,
            ConnectionEffect::StopPlayback => queue.push_back(Step::Player(PlayerEvent::Stop)),
            ConnectionEffect::Destroy => self.destroy_call().await,
        }
    }

    /// Une (o vuelve a unir) el bot al canal.
    ///
    /// songbird reutiliza la misma `Call` al volver a unirse, así que el
    /// reproductor y los hooks del driver siguen suscritos tras un rejoin.
    async fn join(&mut self, channel: ChannelId) -> Result<(), ConnectionError> {
        let call = self.voice.join(self.guild_id, channel).await?;
        self.install_driver_hooks(&call).await;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel, self.guild_id);
        Ok(())
    }

    async fn install_driver_hooks(&mut self, call: &Arc<Mutex<Call>>) {
        if self.driver_hooks {
            return;
        }

        let mut call = call.lock().await;
        events::register_driver_events(&mut call, self.guild_id, self.handle.clone());
        self.driver_hooks = true;
    }

    async fn destroy_call(&mut self) {
        self.driver_hooks = false;
        self.track = None;
        self.track_info = None;

        if self.voice.get(self.guild_id).is_none() {
            return;
        }

        match self.voice.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => debug!("Llamada ya cerrada en guild {}: {:?}", self.guild_id, e),
        }
    }

    fn spawn_resolve(&self, epoch: u64, reference: PlaylistEntry) {
        let resolver = self.shared.resolver.clone();
        let token = self.player_pending.clone();
        let events = self.handle.clone();
        let guild_id = self.guild_id;

        debug!("🔍 Resolviendo {} (epoch {}) en guild {}", reference, epoch, guild_id);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("🚫 Resolución de {} cancelada en guild {}", reference, guild_id);
                }
                result = resolver.resolve(reference.as_str()) => {
                    events.send(GuildEvent::ResolveFinished { epoch, result });
                }
            }
        });
    }

    fn spawn_timer(&self, token: CancellationToken, delay: Duration, event: GuildEvent) {
        let events = self.handle.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    events.send(event);
                }
            }
        });
    }

    async fn play(&mut self, epoch: u64) -> Result<(), PlaybackError> {
        let track = match self.parked.take() {
            Some((parked_epoch, track)) if parked_epoch == epoch => track,
            _ => return Err(PlaybackError::Track("resolved stream is missing".into())),
        };

        let call = self
            .voice
            .get(self.guild_id)
            .ok_or(PlaybackError::NoConnection)?;

        let handle = {
            let mut call = call.lock().await;
            call.play_input(track.input)
        };

        self.track = Some(handle.clone());

        if let Err(e) = handle.set_volume(self.shared.config.default_volume) {
            warn!("⚠️ No se pudo ajustar el volumen en guild {}: {:?}", self.guild_id, e);
        }
        events::register_track_events(&handle, self.guild_id, epoch, self.handle.clone())
            .map_err(|e| PlaybackError::Track(e.to_string()))?;

        info!(
            "▶️ Reproduciendo: {} ({}/{}) en guild {}",
            track.info.title,
            self.player.position() + 1,
            self.player.track_count(),
            self.guild_id
        );

        self.track_info = Some(track.info);
        Ok(())
    }

    fn stop_audio(&mut self) {
        self.track_info = None;
        if let Some(track) = self.track.take() {
            if let Err(e) = track.stop() {
                debug!("Pista ya detenida en guild {}: {:?}", self.guild_id, e);
            }
        }
    }

    async fn notify(&mut self, notice: Notice) {
        if notice.is_failure() {
            warn!("⚠️ [guild {}] {}", self.guild_id, notice);
        } else {
            info!("💬 [guild {}] {}", self.guild_id, notice);
        }

        self.send(CreateMessage::new().content(notice.to_string()))
            .await;
    }

    /// Envía un embed con el logo como miniatura cuando el archivo existe.
    async fn send_embed(&mut self, embed: CreateEmbed) {
        let logo = &self.shared.config.logo_path;
        if logo.is_file() {
            match CreateAttachment::path(logo).await {
                Ok(attachment) => {
                    let message = CreateMessage::new()
                        .embed(embeds::with_logo(embed, logo))
                        .add_file(attachment);
                    self.send(message).await;
                    return;
                }
                Err(e) => debug!("No se pudo adjuntar el logo {}: {:?}", logo.display(), e),
            }
        }

        self.send(CreateMessage::new().embed(embed)).await;
    }

    async fn send(&mut self, message: CreateMessage) {
        let Some(channel) = self.text_channel else {
            debug!("Sin canal de texto para guild {}", self.guild_id);
            return;
        };

        let message = match self.reply_to {
            Some(message_id) => message.reference_message((channel, message_id)),
            None => message,
        };

        if let Err(e) = channel.send_message(self.http.as_ref(), message).await {
            error!("Error al enviar mensaje en guild {}: {:?}", self.guild_id, e);
        }
    }

    fn publish_status(&self) {
        *self.handle.status.write() = SessionStatus {
            player: self.player.state(),
            link: self.connection.state(),
            position: self.player.position(),
            reconnect_attempts: self.connection.reconnect_attempts(),
        };
    }
}
