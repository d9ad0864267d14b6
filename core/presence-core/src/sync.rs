//! Presence-sync state machine.
//!
//! One tick is `probe -> poll -> at most one connect and one round-trip`.
//! The sync loop owns the link exclusively; other threads only flip flags on
//! [`OperatorControls`].
//!
//! ```text
//!            target seen, connect ok
//!   Idle ─────────────────────────────► ActiveConnected
//!    ▲  \                                   │      ▲
//!    │   \ target seen, connect failed      │ send │ connect ok
//!    │    ▼                                 ▼ fail │
//!    │   ActiveDisconnected ◄───────────────┘──────┘
//!    │          │
//!    └──────────┘ target gone (clear + close when Ready)
//! ```

use crate::activity::{build_activity, starting_up_activity};
use crate::channel::{PresenceConnector, PresenceLink};
use crate::controls::OperatorControls;
use crate::error::ChannelError;
use crate::probe::ProcessProbe;
use crate::status::{DisplayKey, StatusSource};
use chrono::Utc;
use flrp_presence_protocol::{ActivityPayload, PresenceMessage};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SHUTDOWN_POLL_SLICE: Duration = Duration::from_millis(50);

/// How a single SET_ACTIVITY round-trip ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    /// Discord or the encoder refused this payload; the link is still usable.
    Refused,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    ActiveConnected,
    ActiveDisconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

/// What the frontend shows the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncStatus {
    Stopped = 0,
    WaitingForTarget = 1,
    Connected = 2,
    DiscordDisconnected = 3,
    Suppressed = 4,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Stopped => "Stopped",
            SyncStatus::WaitingForTarget => "Waiting for FL Studio",
            SyncStatus::Connected => "Connected - Monitoring FL Studio",
            SyncStatus::DiscordDisconnected => "Monitoring FL Studio (Discord disconnected)",
            SyncStatus::Suppressed => "Disconnected by operator",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncStatus::WaitingForTarget,
            2 => SyncStatus::Connected,
            3 => SyncStatus::DiscordDisconnected,
            4 => SyncStatus::Suppressed,
            _ => SyncStatus::Stopped,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub phase: SyncPhase,
    pub connection: ConnectionState,
    /// Number of SET_ACTIVITY round-trips attempted this tick.
    pub sends: u8,
    pub connected: bool,
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

pub struct PresenceSync<P, S, C>
where
    P: ProcessProbe,
    S: StatusSource,
    C: PresenceConnector,
{
    probe: P,
    source: S,
    connector: C,
    controls: Arc<OperatorControls>,
    link: Option<C::Link>,
    phase: SyncPhase,
    connection: ConnectionState,
    session_started_at: Option<i64>,
    last_sent: Option<DisplayKey>,
    last_connect_error: Option<String>,
    pid: u32,
    clock: fn() -> i64,
}

impl<P, S, C> PresenceSync<P, S, C>
where
    P: ProcessProbe,
    S: StatusSource,
    C: PresenceConnector,
{
    pub fn new(probe: P, source: S, connector: C, controls: Arc<OperatorControls>) -> Self {
        Self {
            probe,
            source,
            connector,
            controls,
            link: None,
            phase: SyncPhase::Idle,
            connection: ConnectionState::Disconnected,
            session_started_at: None,
            last_sent: None,
            last_connect_error: None,
            pid: std::process::id(),
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn session_started_at(&self) -> Option<i64> {
        self.session_started_at
    }

    pub fn controls(&self) -> &Arc<OperatorControls> {
        &self.controls
    }

    pub fn status(&self) -> SyncStatus {
        if !self.controls.is_monitoring() {
            return SyncStatus::Stopped;
        }
        if self.controls.is_suppressed() && self.link.is_none() {
            return SyncStatus::Suppressed;
        }
        match self.phase {
            SyncPhase::Idle => SyncStatus::WaitingForTarget,
            SyncPhase::ActiveConnected => SyncStatus::Connected,
            SyncPhase::ActiveDisconnected => SyncStatus::DiscordDisconnected,
        }
    }

    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport {
            phase: self.phase,
            connection: self.connection,
            sends: 0,
            connected: false,
        };

        if self.controls.take_refresh() && self.link.is_some() {
            tracing::info!("Refresh requested; reconnecting on next tick");
            report.sends += self.clear_and_close();
            self.phase = SyncPhase::ActiveDisconnected;
            return self.finish(report);
        }

        let running = self.controls.is_monitoring() && self.probe.is_running();
        if !running {
            if self.link.is_some() {
                tracing::info!("FL Studio no longer running; clearing presence");
                report.sends += self.clear_and_close();
            }
            self.phase = SyncPhase::Idle;
            self.session_started_at = None;
            return self.finish(report);
        }

        if self.controls.is_suppressed() {
            if self.link.is_some() {
                tracing::info!("Disconnect requested by operator; clearing presence");
                report.sends += self.clear_and_close();
            }
            self.phase = SyncPhase::ActiveDisconnected;
            return self.finish(report);
        }

        let snapshot = self.source.poll();

        if self.link.is_none() {
            if !self.connect() {
                self.phase = SyncPhase::ActiveDisconnected;
                return self.finish(report);
            }
            report.connected = true;
            self.phase = SyncPhase::ActiveConnected;

            // The first frame of a session: the current snapshot if there is
            // one, the placeholder otherwise.
            let (activity, key) = match &snapshot {
                Some(snapshot) => (
                    build_activity(snapshot, self.session_started_at),
                    Some(snapshot.display_key()),
                ),
                None => (starting_up_activity(self.session_started_at), None),
            };
            report.sends += 1;
            if self.send_activity(activity) != Delivery::Lost {
                self.last_sent = key;
            }
            return self.finish(report);
        }

        if let Some(snapshot) = snapshot {
            let key = snapshot.display_key();
            if self.last_sent.as_ref() != Some(&key) {
                tracing::debug!(
                    state = %snapshot.state_label,
                    tempo = snapshot.tempo,
                    plugin = ?snapshot.plugin_name,
                    project = ?snapshot.project_name,
                    "Status changed; updating presence"
                );
                let activity = build_activity(&snapshot, self.session_started_at);
                report.sends += 1;
                // A refused payload is not retried until the display changes.
                if self.send_activity(activity) != Delivery::Lost {
                    self.last_sent = Some(key);
                }
            }
        }
        self.finish(report)
    }

    /// Best-effort clear and close. Used on exit.
    pub fn shutdown(&mut self) {
        if self.link.is_some() {
            self.clear_and_close();
        }
        self.phase = SyncPhase::Idle;
        self.session_started_at = None;
        self.controls.publish_status(SyncStatus::Stopped);
        tracing::info!("Presence sync stopped");
    }

    /// Ticks every `interval` until shutdown is requested, then shuts down.
    pub fn run(&mut self, interval: Duration) {
        tracing::info!(interval_ms = interval.as_millis() as u64, "Presence sync started");
        while !self.controls.shutdown_requested() {
            let report = self.tick();
            tracing::trace!(?report, "Tick complete");

            let deadline = Instant::now() + interval;
            while !self.controls.shutdown_requested() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(SHUTDOWN_POLL_SLICE));
            }
        }
        self.shutdown();
    }

    fn finish(&mut self, mut report: TickReport) -> TickReport {
        report.phase = self.phase;
        report.connection = self.connection;
        self.controls.publish_status(self.status());
        report
    }

    fn connect(&mut self) -> bool {
        self.connection = ConnectionState::Connecting;
        match self.connector.connect() {
            Ok(link) => {
                tracing::info!("Connected to Discord");
                self.link = Some(link);
                self.connection = ConnectionState::Ready;
                self.session_started_at = Some((self.clock)());
                self.last_sent = None;
                self.last_connect_error = None;
                true
            }
            Err(err) => {
                let message = err.to_string();
                if self.last_connect_error.as_deref() != Some(message.as_str()) {
                    tracing::warn!(error = %message, "Discord connection failed; retrying each tick");
                } else {
                    tracing::debug!(error = %message, "Discord connection still unavailable");
                }
                self.last_connect_error = Some(message);
                self.connection = ConnectionState::Disconnected;
                false
            }
        }
    }

    fn nonce(&self) -> String {
        (self.clock)().to_string()
    }

    fn send_activity(&mut self, activity: ActivityPayload) -> Delivery {
        let message = PresenceMessage::set_activity(self.nonce(), self.pid, activity);
        self.send(&message)
    }

    /// Any failure other than a refused payload drops the link.
    fn send(&mut self, message: &PresenceMessage) -> Delivery {
        let Some(link) = self.link.as_mut() else {
            return Delivery::Lost;
        };
        match link.send(message) {
            Ok(_) => Delivery::Delivered,
            Err(ChannelError::Rejected(reason)) => {
                tracing::warn!(reason = %reason, "Discord rejected activity update");
                Delivery::Refused
            }
            Err(ChannelError::Unencodable(err)) => {
                tracing::warn!(error = %err, "Activity update too large to send");
                Delivery::Refused
            }
            Err(err) => {
                tracing::warn!(error = %err, "Presence channel lost");
                self.drop_link();
                self.phase = SyncPhase::ActiveDisconnected;
                Delivery::Lost
            }
        }
    }

    /// Sends clear-activity then closes. Returns the number of sends attempted.
    fn clear_and_close(&mut self) -> u8 {
        let message = PresenceMessage::clear_activity(self.nonce(), self.pid);
        self.send(&message);
        self.drop_link();
        1
    }

    fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.connection = ConnectionState::Disconnected;
        self.session_started_at = None;
        self.last_sent = None;
    }
}
