//! Connection Manager
//!
//! Owns the transport lifecycle as a pure state machine:
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Live
//!                    ↑                           │ abnormal close
//!                    └──── Reconnecting(backoff) ←┘
//! ```
//!
//! Every input is a [`ConnectionSignal`]; `process` mutates the phase and
//! returns the effects to apply. The reconnect timer is a value owned here
//! and is cancelled by every transition that supersedes it.
//!
//! A normal close (code 1000) is terminal. Any other close while connecting,
//! authenticating or live schedules a retry after
//! `min(base * 2^attempt, max)`; once `max_attempts` retries have been
//! scheduled the next close gives up and lands in
//! `Disconnected(GaveUp)`, which the UI can tell apart from a user logout.

use std::time::Duration;

use convo_wire::ClientCommand;
use tracing::{debug, info, warn};

use crate::effect::{ClientUpdate, Effect, TimerKind, TimerToken, TimerTokens};
use crate::transport::CloseCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Never connected in this process.
    Initial,
    UserInitiated,
    AuthRejected,
    MissingCredential,
    /// Reconnect attempts exhausted.
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected(DisconnectReason),
    Connecting,
    Authenticating,
    Live,
    Reconnecting {
        /// Number of retries scheduled so far, including this one.
        attempt: u32,
        delay: Duration,
    },
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Disconnected(DisconnectReason::Initial) => write!(f, "disconnected"),
            Phase::Disconnected(DisconnectReason::UserInitiated) => write!(f, "disconnected"),
            Phase::Disconnected(DisconnectReason::AuthRejected) => {
                write!(f, "disconnected (credential rejected)")
            }
            Phase::Disconnected(DisconnectReason::MissingCredential) => {
                write!(f, "disconnected (not logged in)")
            }
            Phase::Disconnected(DisconnectReason::GaveUp) => {
                write!(f, "disconnected (cannot reconnect)")
            }
            Phase::Connecting => write!(f, "connecting"),
            Phase::Authenticating => write!(f, "authenticating"),
            Phase::Live => write!(f, "live"),
            Phase::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {} in {}ms)", attempt, delay.as_millis())
            }
        }
    }
}

/// Reconnect backoff: `min(base * 2^attempt, max)`, at most `max_attempts` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30000),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionSignal {
    Connect { has_credential: bool },
    /// The transport opened; carries the credential to authenticate with.
    Opened { credential: Option<String> },
    Authenticated,
    Rejected { reason: String },
    Closed(CloseCode),
    TimerFired(TimerToken),
    /// The host environment became visible again.
    Foreground { has_credential: bool },
    Disconnect,
}

#[derive(Debug)]
pub struct ConnectionManager {
    phase: Phase,
    attempt: u32,
    reconnect_timer: Option<TimerToken>,
    observing_foreground: bool,
    tokens: TimerTokens,
    policy: BackoffPolicy,
}

impl ConnectionManager {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            phase: Phase::Disconnected(DisconnectReason::Initial),
            attempt: 0,
            reconnect_timer: None,
            observing_foreground: false,
            tokens: TimerTokens::default(),
            policy,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_observing_foreground(&self) -> bool {
        self.observing_foreground
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn process(&mut self, signal: ConnectionSignal) -> Vec<Effect> {
        match signal {
            ConnectionSignal::Connect { has_credential } => self.connect(has_credential),
            ConnectionSignal::Opened { credential } => self.opened(credential),
            ConnectionSignal::Authenticated => self.authenticated(),
            ConnectionSignal::Rejected { reason } => self.rejected(reason),
            ConnectionSignal::Closed(code) => self.closed(code),
            ConnectionSignal::TimerFired(token) => self.timer_fired(token),
            ConnectionSignal::Foreground { has_credential } => self.foreground(has_credential),
            ConnectionSignal::Disconnect => self.disconnect(),
        }
    }

    fn connect(&mut self, has_credential: bool) -> Vec<Effect> {
        match self.phase {
            Phase::Connecting | Phase::Authenticating | Phase::Live => {
                debug!("connect() ignored while {}", self.phase);
                return Vec::new();
            }
            Phase::Disconnected(_) => self.attempt = 0,
            Phase::Reconnecting { .. } => {}
        }

        let mut effects = self.cancel_reconnect_timer();
        if !has_credential {
            info!("No stored credential, login required");
            self.phase = Phase::Disconnected(DisconnectReason::MissingCredential);
            effects.push(Effect::Notify(ClientUpdate::LoginRequired {
                reason: "no stored credential".to_string(),
            }));
            return effects;
        }

        self.observing_foreground = true;
        self.phase = Phase::Connecting;
        effects.push(Effect::Open);
        effects
    }

    fn opened(&mut self, credential: Option<String>) -> Vec<Effect> {
        if self.phase != Phase::Connecting {
            warn!("Transport opened while {}, ignoring", self.phase);
            return Vec::new();
        }
        match credential {
            Some(token) => {
                debug!("Transport open, authenticating");
                self.phase = Phase::Authenticating;
                vec![Effect::Send(ClientCommand::Authenticate { token })]
            }
            None => {
                info!("Credential disappeared before authentication");
                self.phase = Phase::Disconnected(DisconnectReason::MissingCredential);
                vec![
                    Effect::Close(CloseCode::NORMAL),
                    Effect::Notify(ClientUpdate::LoginRequired {
                        reason: "no stored credential".to_string(),
                    }),
                ]
            }
        }
    }

    fn authenticated(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Authenticating {
            debug!("Unexpected authenticated event while {}", self.phase);
            return Vec::new();
        }
        info!("Authenticated, connection live");
        self.attempt = 0;
        self.phase = Phase::Live;
        Vec::new()
    }

    fn rejected(&mut self, reason: String) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Authenticating | Phase::Live) {
            debug!("Ignoring authentication failure while {}", self.phase);
            return Vec::new();
        }
        warn!("Authentication rejected: {}", reason);
        let mut effects = self.cancel_reconnect_timer();
        self.phase = Phase::Disconnected(DisconnectReason::AuthRejected);
        effects.extend([
            Effect::ClearCredential,
            Effect::Close(CloseCode::NORMAL),
            Effect::Notify(ClientUpdate::LoginRequired { reason }),
        ]);
        effects
    }

    fn closed(&mut self, code: CloseCode) -> Vec<Effect> {
        match self.phase {
            Phase::Disconnected(_) | Phase::Reconnecting { .. } => {
                debug!("Late close {:?} while {}, ignoring", code, self.phase);
                Vec::new()
            }
            _ if code.is_user_initiated() => {
                info!("Connection closed normally");
                self.phase = Phase::Disconnected(DisconnectReason::UserInitiated);
                Vec::new()
            }
            _ => self.schedule_retry(code),
        }
    }

    fn schedule_retry(&mut self, code: CloseCode) -> Vec<Effect> {
        if self.attempt >= self.policy.max_attempts {
            warn!(
                "Connection lost ({:?}), giving up after {} attempts",
                code, self.attempt
            );
            self.phase = Phase::Disconnected(DisconnectReason::GaveUp);
            return vec![Effect::Notify(ClientUpdate::ReconnectGaveUp)];
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt += 1;
        let token = self.tokens.issue(TimerKind::Reconnect);
        self.reconnect_timer = Some(token);
        self.phase = Phase::Reconnecting {
            attempt: self.attempt,
            delay,
        };
        info!(
            "Connection lost ({:?}), retry {} in {}ms",
            code,
            self.attempt,
            delay.as_millis()
        );
        vec![Effect::Schedule(token, delay)]
    }

    fn timer_fired(&mut self, token: TimerToken) -> Vec<Effect> {
        if self.reconnect_timer != Some(token) {
            debug!("Stale reconnect timer {:?}", token);
            return Vec::new();
        }
        self.reconnect_timer = None;
        if !matches!(self.phase, Phase::Reconnecting { .. }) {
            return Vec::new();
        }
        debug!("Reconnect timer fired, reconnecting");
        self.phase = Phase::Connecting;
        vec![Effect::Open]
    }

    fn foreground(&mut self, has_credential: bool) -> Vec<Effect> {
        if !self.observing_foreground || self.phase == Phase::Live {
            return Vec::new();
        }
        info!("Returned to foreground while {}, reconnecting now", self.phase);
        self.attempt = 0;
        self.connect(has_credential)
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        let mut effects = self.cancel_reconnect_timer();
        self.observing_foreground = false;
        if matches!(
            self.phase,
            Phase::Connecting | Phase::Authenticating | Phase::Live
        ) {
            effects.push(Effect::Close(CloseCode::NORMAL));
        }
        info!("Disconnected by user");
        self.phase = Phase::Disconnected(DisconnectReason::UserInitiated);
        effects
    }

    fn cancel_reconnect_timer(&mut self) -> Vec<Effect> {
        self.reconnect_timer
            .take()
            .map(Effect::Cancel)
            .into_iter()
            .collect()
    }
}
