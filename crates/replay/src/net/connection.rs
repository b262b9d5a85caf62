use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::endpoint::{Endpoint, random_start_index};
use super::params::ConnectionParams;
use super::transport::{Socket, SocketState, Transport, TransportError};

pub const STATUS_DISCONNECTED: &str = "Disconnected!";
pub const STATUS_SERVER_BUSY: &str = "Server is busy!";
pub const STATUS_ALL_SERVERS_BUSY: &str = "All servers are busy!";
pub const STATUS_UNREACHABLE: &str = "Unable to reach server!";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_secs: f32,
    /// Extra wait granted once when the attempt is still handshaking at the timeout.
    pub connect_extension_secs: f32,
    pub poll_interval_secs: f32,
    pub disconnected_backoff_secs: f32,
    /// Split evenly over the candidates when servers turn the client away.
    pub busy_backoff_total_secs: f32,
    pub busy_backoff_min_secs: f32,
    /// Sessions that received fewer messages than this are treated as rejections.
    pub session_message_threshold: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 2.0,
            connect_extension_secs: 4.0,
            poll_interval_secs: 1.0,
            disconnected_backoff_secs: 15.0,
            busy_backoff_total_secs: 10.0,
            busy_backoff_min_secs: 2.0,
            session_message_threshold: 10,
        }
    }
}

/// Longest delay accepted from config, in seconds.
const MAX_DELAY_SECS: f32 = 3600.0;

impl ConnectionConfig {
    /// Replaces delays that are negative, non-finite or longer than an hour with their
    /// defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let delays = [
            ("connect_timeout_secs", &mut self.connect_timeout_secs, defaults.connect_timeout_secs),
            ("connect_extension_secs", &mut self.connect_extension_secs, defaults.connect_extension_secs),
            ("poll_interval_secs", &mut self.poll_interval_secs, defaults.poll_interval_secs),
            (
                "disconnected_backoff_secs",
                &mut self.disconnected_backoff_secs,
                defaults.disconnected_backoff_secs,
            ),
            ("busy_backoff_total_secs", &mut self.busy_backoff_total_secs, defaults.busy_backoff_total_secs),
            ("busy_backoff_min_secs", &mut self.busy_backoff_min_secs, defaults.busy_backoff_min_secs),
        ];
        for (name, value, default) in delays {
            if !(0.0..=MAX_DELAY_SECS).contains(&*value) {
                log::warn!("Invalid connection.{} {}, using {}", name, value, default);
                *value = default;
            }
        }
        self
    }

    pub fn busy_backoff(&self, candidates: usize) -> Duration {
        let per_candidate = self.busy_backoff_total_secs / candidates.max(1) as f32;
        Duration::from_secs_f32(per_candidate.max(self.busy_backoff_min_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed an established session.
    SessionEnded,
    /// The server closed the socket before the session got going.
    ServerBusy,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::SessionEnded => "session ended",
            DisconnectReason::ServerBusy => "server busy",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected {
        endpoint: Endpoint,
    },
    /// First message of a session; precedes the corresponding `Message`.
    SessionStarted,
    Message(String),
    Disconnected {
        endpoint: Endpoint,
        reason: DisconnectReason,
        messages_received: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Disconnected {
        next_poll: Option<Instant>,
    },
    Connecting {
        attempt: u64,
        deadline: Instant,
        extended: bool,
    },
    Connected,
    Backoff {
        until: Instant,
        status: &'static str,
    },
    Shutdown,
}

struct Attempt<S> {
    id: u64,
    endpoint: Endpoint,
    socket: S,
    /// Set once another connection became main; the socket is closed when it opens.
    aborted: bool,
}

struct MainConnection<S> {
    endpoint: Endpoint,
    socket: S,
    messages_received: usize,
}

#[derive(Serialize)]
struct Handshake<'a> {
    #[serde(rename = "isClientReady")]
    is_client_ready: bool,
    connection_params_dict: &'a ConnectionParams,
}

/// Keeps at most one main connection to one of several candidate servers.
///
/// Purely polled: [`ConnectionManager::update`] advances attempts, timeouts and backoff,
/// and queues [`ConnectionEvent`]s for the caller to drain.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    config: ConnectionConfig,
    candidates: Vec<Endpoint>,
    candidate_index: usize,
    params: ConnectionParams,
    phase: Phase,
    attempts: Vec<Attempt<T::Socket>>,
    main: Option<MainConnection<T::Socket>>,
    next_attempt_id: u64,
    failed_attempts: usize,
    status: Option<String>,
    pending_events: VecDeque<ConnectionEvent>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        candidates: Vec<Endpoint>,
        params: ConnectionParams,
        config: ConnectionConfig,
    ) -> Self {
        let candidate_index = random_start_index(candidates.len());
        Self {
            transport,
            config: config.sanitized(),
            candidates,
            candidate_index,
            params,
            phase: Phase::Disconnected { next_poll: None },
            attempts: Vec::new(),
            main: None,
            next_attempt_id: 1,
            failed_attempts: 0,
            status: None,
            pending_events: VecDeque::new(),
        }
    }

    pub fn with_start_index(mut self, index: usize) -> Self {
        if !self.candidates.is_empty() {
            self.candidate_index = index % self.candidates.len();
        }
        self
    }

    pub fn update(&mut self, now: Instant) {
        if self.phase == Phase::Shutdown {
            return;
        }
        self.poll_attempts(now);
        self.poll_main(now);
        self.advance_phase(now);
    }

    fn poll_attempts(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.attempts.len() {
            match self.attempts[i].socket.state() {
                SocketState::Connecting => i += 1,
                SocketState::Closed => {
                    let attempt = self.attempts.remove(i);
                    if self.is_current_attempt(attempt.id) {
                        log::warn!("Unable to connect to {}", attempt.endpoint);
                        self.attempt_failed(now, now + self.poll_interval());
                    } else {
                        log::debug!("Stale attempt to {} closed", attempt.endpoint);
                    }
                }
                SocketState::Open => {
                    let mut attempt = self.attempts.remove(i);
                    if attempt.aborted || self.main.is_some() {
                        log::info!("Discarding superseded connection to {}", attempt.endpoint);
                        attempt.socket.close();
                    } else {
                        self.promote(attempt);
                    }
                }
            }
        }
    }

    fn promote(&mut self, attempt: Attempt<T::Socket>) {
        for other in &mut self.attempts {
            other.aborted = true;
        }

        log::info!("Connected to {}", attempt.endpoint);
        let mut main = MainConnection {
            endpoint: attempt.endpoint,
            socket: attempt.socket,
            messages_received: 0,
        };

        match serde_json::to_string(&Handshake {
            is_client_ready: true,
            connection_params_dict: &self.params,
        }) {
            Ok(handshake) => {
                if let Err(e) = main.socket.send(&handshake) {
                    log::warn!("Failed to send handshake to {}: {}", main.endpoint, e);
                }
            }
            Err(e) => log::error!("Failed to encode handshake: {}", e),
        }

        self.pending_events.push_back(ConnectionEvent::Connected {
            endpoint: main.endpoint.clone(),
        });
        self.main = Some(main);
        self.phase = Phase::Connected;
        self.status = None;
        self.failed_attempts = 0;
    }

    fn poll_main(&mut self, now: Instant) {
        let Some(main) = self.main.as_mut() else {
            return;
        };

        while let Some(text) = main.socket.try_recv() {
            main.messages_received += 1;
            if main.messages_received == 1 {
                self.pending_events.push_back(ConnectionEvent::SessionStarted);
            }
            self.pending_events.push_back(ConnectionEvent::Message(text));
        }

        if main.socket.state() == SocketState::Closed {
            self.on_main_closed(now);
        }
    }

    fn on_main_closed(&mut self, now: Instant) {
        let Some(main) = self.main.take() else {
            return;
        };

        let (reason, backoff, status) =
            if main.messages_received >= self.config.session_message_threshold {
                (
                    DisconnectReason::SessionEnded,
                    Duration::from_secs_f32(self.config.disconnected_backoff_secs),
                    STATUS_DISCONNECTED,
                )
            } else {
                self.advance_candidate();
                let status = if self.candidates.len() > 1 {
                    STATUS_ALL_SERVERS_BUSY
                } else {
                    STATUS_SERVER_BUSY
                };
                (
                    DisconnectReason::ServerBusy,
                    self.config.busy_backoff(self.candidates.len()),
                    status,
                )
            };

        log::info!(
            "Connection to {} closed ({}) after {} messages, retrying in {:.1}s",
            main.endpoint,
            reason.as_str(),
            main.messages_received,
            backoff.as_secs_f32()
        );

        self.status = Some(countdown(status, backoff));
        self.phase = Phase::Backoff {
            until: now + backoff,
            status,
        };
        self.pending_events.push_back(ConnectionEvent::Disconnected {
            endpoint: main.endpoint,
            reason,
            messages_received: main.messages_received,
        });
    }

    fn advance_phase(&mut self, now: Instant) {
        match self.phase {
            Phase::Disconnected { next_poll } => {
                if next_poll.is_none_or(|at| now >= at) {
                    self.start_attempt(now);
                }
            }
            Phase::Connecting {
                attempt,
                deadline,
                extended,
            } => {
                if now < deadline {
                    return;
                }
                let handshaking = self
                    .attempts
                    .iter()
                    .any(|a| a.id == attempt && a.socket.state() == SocketState::Connecting);
                if handshaking && !extended {
                    log::debug!("Connection attempt still handshaking, extending timeout");
                    self.phase = Phase::Connecting {
                        attempt,
                        deadline: deadline
                            + Duration::from_secs_f32(self.config.connect_extension_secs),
                        extended: true,
                    };
                } else {
                    log::warn!("Connection attempt timed out");
                    self.attempt_failed(now, now);
                }
            }
            Phase::Connected | Phase::Shutdown => {}
            Phase::Backoff { until, status } => {
                if now >= until {
                    self.status = None;
                    self.phase = Phase::Disconnected { next_poll: None };
                    self.start_attempt(now);
                } else {
                    self.status = Some(countdown(status, until - now));
                }
            }
        }
    }

    fn start_attempt(&mut self, now: Instant) {
        let Some(endpoint) = self.candidates.get(self.candidate_index).cloned() else {
            if self.status.is_none() {
                log::error!("No server candidates to connect to");
            }
            self.status = Some(STATUS_UNREACHABLE.to_string());
            self.phase = Phase::Disconnected {
                next_poll: Some(now + self.poll_interval()),
            };
            return;
        };

        log::info!("Connecting to {}", endpoint);
        match self.transport.open(&endpoint) {
            Ok(socket) => {
                let id = self.next_attempt_id;
                self.next_attempt_id += 1;
                self.attempts.push(Attempt {
                    id,
                    endpoint,
                    socket,
                    aborted: false,
                });
                self.phase = Phase::Connecting {
                    attempt: id,
                    deadline: now + Duration::from_secs_f32(self.config.connect_timeout_secs),
                    extended: false,
                };
            }
            Err(e) => {
                log::warn!("{}", e);
                self.attempt_failed(now, now + self.poll_interval());
            }
        }
    }

    fn attempt_failed(&mut self, now: Instant, next_poll: Instant) {
        self.failed_attempts += 1;
        self.advance_candidate();
        if self.failed_attempts >= self.candidates.len() {
            self.failed_attempts = 0;
            self.status = Some(STATUS_UNREACHABLE.to_string());
        }
        self.phase = Phase::Disconnected {
            next_poll: Some(next_poll.max(now)),
        };
    }

    fn advance_candidate(&mut self) {
        if !self.candidates.is_empty() {
            self.candidate_index = (self.candidate_index + 1) % self.candidates.len();
        }
    }

    fn is_current_attempt(&self, id: u64) -> bool {
        matches!(self.phase, Phase::Connecting { attempt, .. } if attempt == id)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs_f32(self.config.poll_interval_secs)
    }

    pub fn send(&mut self, text: &str) -> Result<(), TransportError> {
        match self.main.as_mut() {
            Some(main) if main.socket.state() == SocketState::Open => main.socket.send(text),
            _ => Err(TransportError::NotOpen),
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ConnectionEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn is_connected(&self) -> bool {
        self.main
            .as_ref()
            .is_some_and(|main| main.socket.state() == SocketState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.phase, Phase::Connecting { .. })
    }

    pub fn in_backoff(&self) -> bool {
        matches!(self.phase, Phase::Backoff { .. })
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.main.as_ref().map(|main| &main.endpoint)
    }

    pub fn messages_received(&self) -> usize {
        self.main.as_ref().map_or(0, |main| main.messages_received)
    }

    pub fn candidates(&self) -> &[Endpoint] {
        &self.candidates
    }

    pub fn candidate_index(&self) -> usize {
        self.candidate_index
    }

    pub fn pending_attempts(&self) -> usize {
        self.attempts.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn shutdown(&mut self) {
        if let Some(mut main) = self.main.take() {
            log::info!("Closing connection to {}", main.endpoint);
            main.socket.close();
        }
        for mut attempt in self.attempts.drain(..) {
            attempt.socket.close();
        }
        self.phase = Phase::Shutdown;
        self.status = None;
    }
}

fn countdown(status: &str, remaining: Duration) -> String {
    let seconds = remaining.as_secs_f32().ceil() as u64;
    format!("{} Reconnecting in {}s.", status, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_backoff_scales_with_candidates() {
        let config = ConnectionConfig::default();
        assert_eq!(config.busy_backoff(1), Duration::from_secs(10));
        assert_eq!(config.busy_backoff(2), Duration::from_secs(5));
        assert_eq!(config.busy_backoff(10), Duration::from_secs(2));
        assert_eq!(config.busy_backoff(0), Duration::from_secs(10));
    }

    #[test]
    fn test_countdown_rounds_up() {
        assert_eq!(
            countdown(STATUS_DISCONNECTED, Duration::from_millis(14_200)),
            "Disconnected! Reconnecting in 15s."
        );
        assert_eq!(
            countdown(STATUS_SERVER_BUSY, Duration::from_secs(2)),
            "Server is busy! Reconnecting in 2s."
        );
    }
}
