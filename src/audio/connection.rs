//! Connection supervisor.
//!
//! Tracks the voice link of one guild and decides what to do when it drops:
//! wait briefly for the voice library to resume on its own, otherwise rejoin
//! the same channel after a delay, and give up after `max_attempts`
//! consecutive failed cycles. Like the player, this module is pure; the guild
//! worker executes the returned [`ConnectionEffect`]s.

use serenity::model::id::ChannelId;
use std::time::Duration;
use tracing::debug;

use crate::ui::notices::Notice;

/// Techo del retardo entre reintentos con backoff.
pub const MAX_REJOIN_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Espera a que la conexión vuelva a Signalling/Connecting por sí sola.
    pub resume_timeout: Duration,
    /// Retardo antes de volver a unirse activamente.
    pub rejoin_delay: Duration,
    pub backoff_multiplier: f64,
}

impl ReconnectPolicy {
    /// Retardo para el intento `attempt` (empezando en 1), acotado a
    /// [`MAX_REJOIN_DELAY`].
    pub fn rejoin_delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.rejoin_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let ceiling = MAX_REJOIN_DELAY.max(self.rejoin_delay);

        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(ceiling))
            .unwrap_or(ceiling)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            resume_timeout: Duration::from_secs(5),
            rejoin_delay: Duration::from_secs(5),
            backoff_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Signalling,
    Connecting,
    Ready,
    /// Sin conexión: estado inicial y tras un cierre.
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Join(ChannelId),
    /// La unión inicial falló.
    JoinFailed,
    StateChanged(LinkState),
    ResumeWaitElapsed { epoch: u64 },
    RejoinDelayElapsed { epoch: u64 },
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEffect {
    Join { channel: ChannelId },
    Rejoin { channel: ChannelId },
    /// Emitir `ResumeWaitElapsed { epoch }` si no hay progreso en `timeout`.
    AwaitResume { epoch: u64, timeout: Duration },
    /// Emitir `RejoinDelayElapsed { epoch }` tras `delay`.
    ScheduleRejoin { epoch: u64, delay: Duration },
    CancelPending,
    Notify(Notice),
    /// Detener la sesión de reproducción del guild.
    StopPlayback,
    /// Destruir la llamada de voz.
    Destroy,
}

#[derive(Debug, Clone)]
pub struct ConnectionSession {
    state: LinkState,
    reconnect_attempts: u32,
    channel: Option<ChannelId>,
    epoch: u64,
    policy: ReconnectPolicy,
}

impl ConnectionSession {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: LinkState::Destroyed,
            reconnect_attempts: 0,
            channel: None,
            epoch: 0,
            policy,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Conexión activa o en curso.
    pub fn is_established(&self) -> bool {
        self.channel.is_some() && self.state != LinkState::Destroyed
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<ConnectionEffect> {
        match event {
            ConnectionEvent::Join(channel) => self.join(channel),
            ConnectionEvent::JoinFailed => {
                // Sin canal no puede quedar una reproducción activa.
                self.reset(LinkState::Destroyed);
                vec![
                    ConnectionEffect::CancelPending,
                    ConnectionEffect::StopPlayback,
                    ConnectionEffect::Destroy,
                ]
            }
            ConnectionEvent::StateChanged(state) => self.on_state(state),
            ConnectionEvent::ResumeWaitElapsed { epoch } => {
                if !self.awaiting_recovery(epoch) {
                    return Vec::new();
                }
                let attempt = self.reconnect_attempts;
                vec![
                    ConnectionEffect::Notify(Notice::ConnectionLost {
                        attempt,
                        max_attempts: self.policy.max_attempts,
                    }),
                    ConnectionEffect::ScheduleRejoin {
                        epoch,
                        delay: self.policy.rejoin_delay_for(attempt),
                    },
                ]
            }
            ConnectionEvent::RejoinDelayElapsed { epoch } => {
                if !self.awaiting_recovery(epoch) {
                    return Vec::new();
                }
                match self.channel {
                    Some(channel) => {
                        self.state = LinkState::Signalling;
                        vec![ConnectionEffect::Rejoin { channel }]
                    }
                    None => Vec::new(),
                }
            }
            ConnectionEvent::Teardown => {
                self.reset(LinkState::Destroyed);
                vec![ConnectionEffect::CancelPending, ConnectionEffect::Destroy]
            }
        }
    }

    fn join(&mut self, channel: ChannelId) -> Vec<ConnectionEffect> {
        let linked = matches!(
            self.state,
            LinkState::Signalling | LinkState::Connecting | LinkState::Ready
        );
        if linked && self.channel == Some(channel) {
            debug!("Ya conectado al canal {}", channel);
            return Vec::new();
        }

        self.reset(LinkState::Signalling);
        self.channel = Some(channel);
        vec![
            ConnectionEffect::CancelPending,
            ConnectionEffect::Join { channel },
        ]
    }

    fn on_state(&mut self, state: LinkState) -> Vec<ConnectionEffect> {
        // Eventos tardíos tras un cierre no reviven la sesión.
        if self.state == LinkState::Destroyed && state != LinkState::Destroyed {
            return Vec::new();
        }

        match state {
            LinkState::Ready => {
                let was_recovering = self.state != LinkState::Ready;
                self.state = LinkState::Ready;
                self.reconnect_attempts = 0;
                if was_recovering {
                    self.epoch += 1;
                    vec![ConnectionEffect::CancelPending]
                } else {
                    Vec::new()
                }
            }
            LinkState::Signalling | LinkState::Connecting => {
                // Un aviso de voz que llega tras Ready no degrada la conexión.
                if self.state == LinkState::Ready {
                    return Vec::new();
                }
                let resumed = self.state == LinkState::Disconnected;
                self.state = state;
                if resumed {
                    // La conexión se recupera sola: cancelar la espera y el reintento.
                    self.epoch += 1;
                    vec![ConnectionEffect::CancelPending]
                } else {
                    Vec::new()
                }
            }
            LinkState::Disconnected => self.on_drop(),
            LinkState::Destroyed => {
                if self.state == LinkState::Destroyed {
                    return Vec::new();
                }
                self.reset(LinkState::Destroyed);
                vec![
                    ConnectionEffect::CancelPending,
                    ConnectionEffect::StopPlayback,
                    ConnectionEffect::Destroy,
                ]
            }
        }
    }

    fn on_drop(&mut self) -> Vec<ConnectionEffect> {
        if self.state == LinkState::Disconnected || self.channel.is_none() {
            return Vec::new();
        }

        if self.policy.enabled && self.reconnect_attempts < self.policy.max_attempts {
            self.reconnect_attempts += 1;
            self.epoch += 1;
            self.state = LinkState::Disconnected;
            return vec![
                ConnectionEffect::CancelPending,
                ConnectionEffect::AwaitResume {
                    epoch: self.epoch,
                    timeout: self.policy.resume_timeout,
                },
            ];
        }

        let attempts = self.reconnect_attempts;
        self.reset(LinkState::Destroyed);
        vec![
            ConnectionEffect::CancelPending,
            ConnectionEffect::Notify(Notice::ReconnectAbandoned { attempts }),
            ConnectionEffect::StopPlayback,
            ConnectionEffect::Destroy,
        ]
    }

    fn awaiting_recovery(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.state == LinkState::Disconnected
    }

    fn reset(&mut self, state: LinkState) {
        self.epoch += 1;
        self.state = state;
        self.reconnect_attempts = 0;
        if state == LinkState::Destroyed {
            self.channel = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CHANNEL: ChannelId = ChannelId::new(42);

    fn connected(policy: ReconnectPolicy) -> ConnectionSession {
        let mut conn = ConnectionSession::new(policy);
        let effects = conn.handle(ConnectionEvent::Join(CHANNEL));
        assert!(effects.contains(&ConnectionEffect::Join { channel: CHANNEL }));
        conn.handle(ConnectionEvent::StateChanged(LinkState::Ready));
        assert_eq!(conn.state(), LinkState::Ready);
        conn
    }

    fn await_epoch(effects: &[ConnectionEffect]) -> u64 {
        effects
            .iter()
            .find_map(|effect| match effect {
                ConnectionEffect::AwaitResume { epoch, .. } => Some(*epoch),
                _ => None,
            })
            .expect("expected AwaitResume")
    }

    /// Recorre un ciclo de reconexión fallido completo hasta `Rejoin`.
    fn failed_cycle(conn: &mut ConnectionSession) -> Vec<ConnectionEffect> {
        let effects = conn.handle(ConnectionEvent::StateChanged(LinkState::Disconnected));
        let Some(epoch) = effects.iter().find_map(|effect| match effect {
            ConnectionEffect::AwaitResume { epoch, .. } => Some(*epoch),
            _ => None,
        }) else {
            return effects;
        };

        let effects = conn.handle(ConnectionEvent::ResumeWaitElapsed { epoch });
        assert!(effects
            .iter()
            .any(|effect| matches!(effect, ConnectionEffect::Notify(Notice::ConnectionLost { .. }))));

        conn.handle(ConnectionEvent::RejoinDelayElapsed { epoch })
    }

    #[test]
    fn test_drop_waits_then_rejoins_same_channel() {
        let mut conn = connected(ReconnectPolicy::default());

        let effects = conn.handle(ConnectionEvent::StateChanged(LinkState::Disconnected));
        assert_eq!(conn.reconnect_attempts(), 1);
        assert_eq!(
            effects,
            vec![
                ConnectionEffect::CancelPending,
                ConnectionEffect::AwaitResume {
                    epoch: conn.epoch(),
                    timeout: Duration::from_secs(5),
                },
            ]
        );

        let epoch = await_epoch(&effects);
        let effects = conn.handle(ConnectionEvent::ResumeWaitElapsed { epoch });
        assert_eq!(
            effects,
            vec![
                ConnectionEffect::Notify(Notice::ConnectionLost {
                    attempt: 1,
                    max_attempts: 5,
                }),
                ConnectionEffect::ScheduleRejoin {
                    epoch,
                    delay: Duration::from_secs(5),
                },
            ]
        );

        let effects = conn.handle(ConnectionEvent::RejoinDelayElapsed { epoch });
        assert_eq!(effects, vec![ConnectionEffect::Rejoin { channel: CHANNEL }]);
        assert_eq!(conn.state(), LinkState::Signalling);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut conn = connected(ReconnectPolicy::default());
        let mut rejoins = 0;

        for _ in 0..5 {
            let effects = failed_cycle(&mut conn);
            assert!(conn.reconnect_attempts() <= 5);
            if effects
                .iter()
                .any(|effect| matches!(effect, ConnectionEffect::Rejoin { .. }))
            {
                rejoins += 1;
            }
        }
        assert_eq!(rejoins, 5);
        assert_eq!(conn.reconnect_attempts(), 5);

        let effects = failed_cycle(&mut conn);
        assert_eq!(
            effects,
            vec![
                ConnectionEffect::CancelPending,
                ConnectionEffect::Notify(Notice::ReconnectAbandoned { attempts: 5 }),
                ConnectionEffect::StopPlayback,
                ConnectionEffect::Destroy,
            ]
        );
        assert_eq!(conn.state(), LinkState::Destroyed);
        assert_eq!(conn.channel(), None);

        // Ningún evento posterior provoca otra reconexión.
        assert!(conn
            .handle(ConnectionEvent::StateChanged(LinkState::Disconnected))
            .is_empty());
        assert!(conn
            .handle(ConnectionEvent::RejoinDelayElapsed { epoch: conn.epoch() })
            .is_empty());
    }

    #[test]
    fn test_ready_resets_retry_budget() {
        let mut conn = connected(ReconnectPolicy::default());

        for _ in 0..4 {
            failed_cycle(&mut conn);
        }
        assert_eq!(conn.reconnect_attempts(), 4);

        conn.handle(ConnectionEvent::StateChanged(LinkState::Ready));
        assert_eq!(conn.reconnect_attempts(), 0);

        // Un nuevo corte dispone otra vez de los cinco intentos.
        let mut rejoins = 0;
        for _ in 0..5 {
            let effects = failed_cycle(&mut conn);
            if effects
                .iter()
                .any(|effect| matches!(effect, ConnectionEffect::Rejoin { .. }))
            {
                rejoins += 1;
            }
        }
        assert_eq!(rejoins, 5);
        assert_eq!(conn.state(), LinkState::Signalling);
    }

    #[test]
    fn test_resume_within_wait_cancels_rejoin() {
        let mut conn = connected(ReconnectPolicy::default());
        let effects = conn.handle(ConnectionEvent::StateChanged(LinkState::Disconnected));
        let epoch = await_epoch(&effects);

        let effects = conn.handle(ConnectionEvent::StateChanged(LinkState::Connecting));
        assert_eq!(effects, vec![ConnectionEffect::CancelPending]);
        assert_eq!(conn.state(), LinkState::Connecting);

        assert!(conn
            .handle(ConnectionEvent::ResumeWaitElapsed { epoch })
            .is_empty());
        assert!(conn
            .handle(ConnectionEvent::RejoinDelayElapsed { epoch })
            .is_empty());

        // El contador solo se reinicia al llegar a Ready.
        assert_eq!(conn.reconnect_attempts(), 1);
        conn.handle(ConnectionEvent::StateChanged(LinkState::Ready));
        assert_eq!(conn.reconnect_attempts(), 0);
    }

    #[test]
    fn test_destroyed_tears_down_playback() {
        let mut conn = connected(ReconnectPolicy::default());
        failed_cycle(&mut conn);

        let effects = conn.handle(ConnectionEvent::StateChanged(LinkState::Destroyed));
        assert_eq!(
            effects,
            vec![
                ConnectionEffect::CancelPending,
                ConnectionEffect::StopPlayback,
                ConnectionEffect::Destroy,
            ]
        );
        assert_eq!(conn.reconnect_attempts(), 0);
        assert!(!conn.is_established());

        // Late Ready after teardown is ignored.
        assert!(conn
            .handle(ConnectionEvent::StateChanged(LinkState::Ready))
            .is_empty());
        assert_eq!(conn.state(), LinkState::Destroyed);
    }

    #[test]
    fn test_disabled_reconnect_tears_down_immediately() {
        let policy = ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        };
        let mut conn = connected(policy);

        let effects = conn.handle(ConnectionEvent::StateChanged(LinkState::Disconnected));
        assert!(effects.contains(&ConnectionEffect::StopPlayback));
        assert!(effects.contains(&ConnectionEffect::Destroy));
        assert_eq!(conn.state(), LinkState::Destroyed);
    }

    #[test]
    fn test_join_failure_and_explicit_teardown() {
        let mut conn = ConnectionSession::new(ReconnectPolicy::default());
        conn.handle(ConnectionEvent::Join(CHANNEL));
        let effects = conn.handle(ConnectionEvent::JoinFailed);
        assert!(effects.contains(&ConnectionEffect::Destroy));
        assert_eq!(conn.channel(), None);

        let mut conn = connected(ReconnectPolicy::default());
        let effects = conn.handle(ConnectionEvent::Teardown);
        assert_eq!(
            effects,
            vec![ConnectionEffect::CancelPending, ConnectionEffect::Destroy]
        );
        // Teardown explícito no vuelve a detener la reproducción.
        assert!(!effects.contains(&ConnectionEffect::StopPlayback));
    }

    #[test]
    fn test_failed_move_stops_playback() {
        let mut conn = connected(ReconnectPolicy::default());
        let other = ChannelId::new(7);
        conn.handle(ConnectionEvent::Join(other));

        let effects = conn.handle(ConnectionEvent::JoinFailed);
        assert_eq!(
            effects,
            vec![
                ConnectionEffect::CancelPending,
                ConnectionEffect::StopPlayback,
                ConnectionEffect::Destroy,
            ]
        );
        assert!(!conn.is_established());
    }

    #[test]
    fn test_voice_state_after_ready_keeps_link_ready() {
        let mut conn = connected(ReconnectPolicy::default());

        // La actualización de voz del propio bot llega después del join.
        assert!(conn
            .handle(ConnectionEvent::StateChanged(LinkState::Connecting))
            .is_empty());
        assert!(conn
            .handle(ConnectionEvent::StateChanged(LinkState::Signalling))
            .is_empty());
        assert_eq!(conn.state(), LinkState::Ready);
    }

    #[test]
    fn test_rejoin_same_channel_is_noop() {
        let mut conn = connected(ReconnectPolicy::default());
        assert!(conn.handle(ConnectionEvent::Join(CHANNEL)).is_empty());

        let other = ChannelId::new(7);
        let effects = conn.handle(ConnectionEvent::Join(other));
        assert!(effects.contains(&ConnectionEffect::Join { channel: other }));
    }

    #[test]
    fn test_backoff_multiplier_scales_delay() {
        let policy = ReconnectPolicy {
            backoff_multiplier: 1.5,
            rejoin_delay: Duration::from_millis(1000),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.rejoin_delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.rejoin_delay_for(2), Duration::from_millis(1500));
        assert_eq!(
            ReconnectPolicy::default().rejoin_delay_for(4),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_backoff_is_capped_instead_of_overflowing() {
        let policy = ReconnectPolicy {
            backoff_multiplier: 10.0,
            max_attempts: 30,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.rejoin_delay_for(30), MAX_REJOIN_DELAY);
        assert_eq!(policy.rejoin_delay_for(u32::MAX), MAX_REJOIN_DELAY);

        let huge = ReconnectPolicy {
            backoff_multiplier: f64::MAX,
            ..ReconnectPolicy::default()
        };
        assert_eq!(huge.rejoin_delay_for(3), MAX_REJOIN_DELAY);
    }
}
