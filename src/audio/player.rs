//! Player state machine.
//!
//! One [`PlayerSession`] exists per guild. It never performs I/O: every
//! transition returns the side effects the guild worker must execute.
//! Asynchronous work (track resolution, retry timers, track events) carries the
//! epoch it was started under; results from an older epoch are discarded.

use std::time::Duration;
use tracing::debug;

use crate::{
    audio::playlist::{Playlist, PlaylistEntry},
    config::PlaybackMode,
    error::{PlaybackError, ResolutionError},
    ui::notices::Notice,
};

/// Retardos entre pistas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerTimings {
    /// Tras un `!skip` manual.
    pub manual_skip: Duration,
    /// Tras fin de pista o error (evita saturar el extractor).
    pub auto_skip: Duration,
    /// Reinicio del archivo en modo local.
    pub local_restart: Duration,
}

impl Default for PlayerTimings {
    fn default() -> Self {
        Self {
            manual_skip: Duration::from_millis(500),
            auto_skip: Duration::from_millis(2000),
            local_restart: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    /// Resolviendo la pista actual.
    Starting,
    Playing,
    /// Pista terminada o saltada; esperando el reinicio programado.
    Idle,
    /// La pista falló; esperando el reintento programado.
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Start,
    Skip,
    Stop,
    Resolved { epoch: u64, title: String },
    ResolveFailed { epoch: u64, error: ResolutionError },
    RetryElapsed { epoch: u64 },
    TrackEnded { epoch: u64 },
    TrackFailed { epoch: u64, error: PlaybackError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEffect {
    /// Resolver la referencia en un stream.
    Resolve { epoch: u64, reference: PlaylistEntry },
    /// Reproducir el stream resuelto bajo este epoch.
    Play { epoch: u64 },
    /// Detener el audio en curso.
    StopAudio,
    /// Cancelar resoluciones y temporizadores pendientes.
    CancelPending,
    /// Emitir `RetryElapsed { epoch }` tras `delay`.
    Schedule { epoch: u64, delay: Duration },
    Notify(Notice),
    /// Pedir al supervisor de conexión que cierre el canal de voz.
    ReleaseConnection,
}

/// Datos mostrados por `!nowplaying`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub reference: PlaylistEntry,
    pub position: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct PlayerSession {
    state: PlayerState,
    playlist: Playlist,
    mode: PlaybackMode,
    epoch: u64,
    title: Option<String>,
    timings: PlayerTimings,
}

impl PlayerSession {
    pub fn new(playlist: Playlist, mode: PlaybackMode, timings: PlayerTimings) -> Self {
        Self {
            state: PlayerState::Stopped,
            playlist,
            mode,
            epoch: 0,
            title: None,
            timings,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn position(&self) -> usize {
        self.playlist.position()
    }

    pub fn track_count(&self) -> usize {
        self.playlist.len()
    }

    pub fn current(&self) -> &PlaylistEntry {
        self.playlist.current()
    }

    /// `true` en cualquier estado salvo `Stopped`.
    pub fn is_active(&self) -> bool {
        self.state != PlayerState::Stopped
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        if !self.is_playing() {
            return None;
        }

        Some(NowPlaying {
            title: self
                .title
                .clone()
                .unwrap_or_else(|| self.current().to_string()),
            reference: self.current().clone(),
            position: self.position(),
            total: self.track_count(),
        })
    }

    /// Aplica un evento y devuelve los efectos a ejecutar.
    pub fn handle(&mut self, event: PlayerEvent) -> Vec<PlayerEffect> {
        match event {
            PlayerEvent::Start => self.start(),
            PlayerEvent::Skip => self.skip(),
            PlayerEvent::Stop => self.stop(),
            PlayerEvent::Resolved { epoch, title } => self.on_resolved(epoch, title),
            PlayerEvent::ResolveFailed { epoch, error } => {
                if !self.is_current(epoch, &[PlayerState::Starting]) {
                    return Vec::new();
                }
                let notice = Notice::TrackFailed {
                    reference: self.current().clone(),
                    position: self.position(),
                    error,
                };
                self.fail(notice, false)
            }
            PlayerEvent::RetryElapsed { epoch } => {
                if !self.is_current(epoch, &[PlayerState::Idle, PlayerState::Errored]) {
                    return Vec::new();
                }
                self.begin_resolve()
            }
            PlayerEvent::TrackEnded { epoch } => self.on_track_end(epoch),
            PlayerEvent::TrackFailed { epoch, error } => {
                if !self.is_current(epoch, &[PlayerState::Playing]) {
                    return Vec::new();
                }
                let notice = Notice::PlaybackFailed {
                    reference: self.current().clone(),
                    position: self.position(),
                    error,
                };
                self.fail(notice, true)
            }
        }
    }

    fn start(&mut self) -> Vec<PlayerEffect> {
        if self.is_active() {
            return vec![PlayerEffect::Notify(Notice::AlreadyPlaying)];
        }

        self.playlist.reset();
        self.begin_resolve()
    }

    fn skip(&mut self) -> Vec<PlayerEffect> {
        if !self.is_playing() {
            return vec![PlayerEffect::Notify(Notice::NothingPlaying)];
        }

        let notice = match self.mode {
            PlaybackMode::YouTube => {
                self.playlist.advance();
                Notice::Skipped {
                    position: self.position(),
                    total: self.track_count(),
                }
            }
            PlaybackMode::Local => Notice::Restarting,
        };

        let epoch = self.bump(PlayerState::Idle);
        vec![
            PlayerEffect::CancelPending,
            PlayerEffect::StopAudio,
            PlayerEffect::Notify(notice),
            PlayerEffect::Schedule {
                epoch,
                delay: self.timings.manual_skip,
            },
        ]
    }

    fn stop(&mut self) -> Vec<PlayerEffect> {
        self.bump(PlayerState::Stopped);
        self.playlist.reset();

        vec![
            PlayerEffect::CancelPending,
            PlayerEffect::StopAudio,
            PlayerEffect::ReleaseConnection,
        ]
    }

    fn on_resolved(&mut self, epoch: u64, title: String) -> Vec<PlayerEffect> {
        if !self.is_current(epoch, &[PlayerState::Starting]) {
            debug!("Descartando resolución obsoleta (epoch {})", epoch);
            return Vec::new();
        }

        self.state = PlayerState::Playing;
        self.title = Some(title.clone());

        vec![
            PlayerEffect::Play { epoch },
            PlayerEffect::Notify(Notice::NowPlaying {
                title,
                reference: self.current().clone(),
            }),
        ]
    }

    fn on_track_end(&mut self, epoch: u64) -> Vec<PlayerEffect> {
        if !self.is_current(epoch, &[PlayerState::Playing]) {
            return Vec::new();
        }

        let delay = match self.mode {
            PlaybackMode::YouTube => {
                self.playlist.advance();
                self.timings.auto_skip
            }
            PlaybackMode::Local => self.timings.local_restart,
        };

        let epoch = self.bump(PlayerState::Idle);
        vec![
            PlayerEffect::CancelPending,
            PlayerEffect::Schedule { epoch, delay },
        ]
    }

    /// Notifica, avanza y programa el reintento largo.
    fn fail(&mut self, notice: Notice, stop_audio: bool) -> Vec<PlayerEffect> {
        if self.mode == PlaybackMode::YouTube {
            self.playlist.advance();
        }

        let epoch = self.bump(PlayerState::Errored);
        let mut effects = vec![PlayerEffect::CancelPending];
        if stop_audio {
            effects.push(PlayerEffect::StopAudio);
        }
        effects.push(PlayerEffect::Notify(notice));
        effects.push(PlayerEffect::Schedule {
            epoch,
            delay: self.timings.auto_skip,
        });
        effects
    }

    fn begin_resolve(&mut self) -> Vec<PlayerEffect> {
        let epoch = self.bump(PlayerState::Starting);
        vec![
            PlayerEffect::CancelPending,
            PlayerEffect::Resolve {
                epoch,
                reference: self.current().clone(),
            },
        ]
    }

    fn bump(&mut self, state: PlayerState) -> u64 {
        self.epoch += 1;
        self.state = state;
        self.title = None;
        self.epoch
    }

    fn is_current(&self, epoch: u64, states: &[PlayerState]) -> bool {
        epoch == self.epoch && states.contains(&self.state)
    }
}
