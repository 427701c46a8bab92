// Board connection agent: WebSocket client with reconnection.
//
// Maintains the peer side of a board session: connection state, an outbound
// queue while the socket is down, a heartbeat, and reconnection advice that
// distinguishes "credential rejected" from "network dropped."
//
// Transport is abstracted via `BoardTransport` for testability. The actual
// WS transport implementation lives in a separate module.

pub mod transport;

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use corkboard_common::protocol::ws::{
    ClientMessage, ServerMessage, CLOSE_CODE_NORMAL, CLOSE_CODE_POLICY_VIOLATION,
};
use corkboard_common::types::UserPublic;

// ── Configuration ───────────────────────────────────────────────────

/// Connection parameters for the board server.
#[derive(Debug, Clone)]
pub struct BoardClientConfig {
    /// Server WebSocket endpoint (e.g. "wss://board.example.com/ws").
    pub ws_url: String,
    /// Access token appended to the handshake query string.
    pub access_token: String,
}

/// Reconnection and heartbeat parameters.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub ping_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            ping_interval: Duration::from_secs(30),
        }
    }
}

// ── Transport trait ─────────────────────────────────────────────────

/// One item read off the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(ServerMessage),
    /// The server closed the socket. `code` is None when the connection
    /// dropped without a close frame.
    Closed { code: Option<u16>, reason: String },
}

/// Abstraction over the network transport for testability.
///
/// In production this is tokio-tungstenite (see `transport`). In tests it
/// can be a mock that records messages.
pub trait BoardTransport {
    /// Open a WebSocket connection to the given URL.
    fn connect(&mut self, ws_url: &str) -> Result<()>;

    /// Send a message over the socket.
    fn send(&mut self, message: &ClientMessage) -> Result<()>;

    /// Receive the next inbound item (blocking).
    fn recv(&mut self) -> Result<Incoming>;

    /// Close the socket.
    fn close(&mut self);
}

// ── Connection state ────────────────────────────────────────────────

/// Current state of the board connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

// ── Events ──────────────────────────────────────────────────────────

/// Events emitted by the agent for its driver to handle.
///
/// The agent never sleeps on its own: `retry_in` fields are advice, and the
/// driver owns the actual timer.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Handshake completed and the server acknowledged the session.
    Connected { connection_id: Uuid, user: UserPublic },
    /// An ordinary server frame.
    Message(ServerMessage),
    /// The server rejected the credential (close code 1008). `retry_in` is
    /// the fixed delay for one retry after an external token refresh; None
    /// once that retry is spent.
    AuthRejected { reason: String, retry_in: Option<Duration> },
    /// The connection is down. `retry_in` is backoff advice; None means do
    /// not reconnect automatically (normal close, or the attempt cap).
    Disconnected { reason: String, retry_in: Option<Duration> },
}

// ── Agent ───────────────────────────────────────────────────────────

/// Manages the board connection lifecycle.
pub struct BoardClient<T: BoardTransport> {
    config: BoardClientConfig,
    policy: ReconnectPolicy,
    transport: T,
    state: ConnectionState,
    outbox: VecDeque<ClientMessage>,
    consecutive_failures: u32,
    auth_retry_used: bool,
    last_ping_at: Option<Instant>,
}

impl<T: BoardTransport> BoardClient<T> {
    pub fn new(config: BoardClientConfig, transport: T) -> Self {
        Self {
            config,
            policy: ReconnectPolicy::default(),
            transport,
            state: ConnectionState::Disconnected,
            outbox: VecDeque::new(),
            consecutive_failures: 0,
            auth_retry_used: false,
            last_ping_at: None,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn queued_messages(&self) -> usize {
        self.outbox.len()
    }

    /// Swap in a fresh access token before retrying after an auth rejection.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.config.access_token = token.into();
    }

    /// Attempt to connect (or reconnect) to the board server.
    ///
    /// A no-op returning `None` when the socket is already open or a
    /// handshake is in flight. Otherwise runs the handshake to completion:
    /// open the socket, wait for the server's `connected` acknowledgement,
    /// flush the outbound queue, and return the resulting event.
    pub fn connect(&mut self) -> Result<Option<BoardEvent>> {
        if self.state != ConnectionState::Disconnected {
            return Ok(None);
        }

        let mut handshake_url = validate_ws_url(&self.config.ws_url)?;
        handshake_url.query_pairs_mut().append_pair("token", &self.config.access_token);

        self.state = ConnectionState::Connecting;
        if let Err(error) = self.transport.connect(handshake_url.as_str()) {
            return Ok(Some(self.abnormal_drop(format!("connection failed: {error}"))));
        }

        // The server answers a successful handshake with `connected` and a
        // failed one with an immediate close frame.
        self.state = ConnectionState::Authenticating;
        match self.transport.recv() {
            Ok(Incoming::Message(ServerMessage::Connected(session))) => {
                self.state = ConnectionState::Connected;
                self.consecutive_failures = 0;
                self.auth_retry_used = false;
                self.last_ping_at = None;
                info!(
                    connection_id = %session.connection_id,
                    user_id = session.user.id,
                    "board connection established"
                );
                if let Some(event) = self.flush_outbox() {
                    return Ok(Some(event));
                }
                Ok(Some(BoardEvent::Connected {
                    connection_id: session.connection_id,
                    user: session.user,
                }))
            }
            Ok(Incoming::Message(_)) => Ok(Some(
                self.abnormal_drop("unexpected frame before the session acknowledgement".into()),
            )),
            Ok(Incoming::Closed { code, reason }) => Ok(Some(self.close_event(code, reason))),
            Err(error) => Ok(Some(self.abnormal_drop(format!("handshake failed: {error}")))),
        }
    }

    /// Send a message now, or queue it FIFO while the socket is down.
    pub fn send(&mut self, message: ClientMessage) -> Result<()> {
        if self.state == ConnectionState::Connected {
            self.transport.send(&message)
        } else {
            self.outbox.push_back(message);
            warn!(queued = self.outbox.len(), "socket is down, queueing message");
            Ok(())
        }
    }

    /// Process the next inbound frame. Valid only while connected.
    pub fn recv_event(&mut self) -> Result<BoardEvent> {
        if self.state != ConnectionState::Connected {
            return Err(anyhow!("cannot receive: not connected"));
        }

        match self.transport.recv()? {
            Incoming::Message(message) => Ok(BoardEvent::Message(message)),
            Incoming::Closed { code, reason } => Ok(self.close_event(code, reason)),
        }
    }

    /// Drive the heartbeat. Callers invoke this on their own tick; a `ping`
    /// goes out once `ping_interval` has elapsed since the last one. Returns
    /// whether a ping was sent.
    pub fn maybe_send_ping(&mut self, now: Instant) -> Result<bool> {
        if self.state != ConnectionState::Connected {
            return Ok(false);
        }

        match self.last_ping_at {
            None => {
                self.last_ping_at = Some(now);
                Ok(false)
            }
            Some(last) if now.duration_since(last) >= self.policy.ping_interval => {
                self.transport.send(&ClientMessage::Ping)?;
                self.last_ping_at = Some(now);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Disconnect from the board server. Queued messages are kept for the
    /// next connection.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }

    /// Compute the backoff delay for the next reconnection attempt.
    pub fn reconnect_delay(&self) -> Duration {
        let exp = self.consecutive_failures.min(7);
        let delay = DurationSaturatingMul::saturating_mul(self.policy.base_delay, 1u64 << exp);
        delay.min(self.policy.max_delay)
    }

    /// Whether we should attempt reconnection (under max_attempts).
    pub fn should_reconnect(&self) -> bool {
        self.consecutive_failures < self.policy.max_attempts
    }

    /// Deliver everything queued while disconnected, in order. If the
    /// transport drops mid-flush the unsent remainder is dropped, not
    /// re-queued.
    fn flush_outbox(&mut self) -> Option<BoardEvent> {
        let mut queued = std::mem::take(&mut self.outbox);
        while let Some(message) = queued.pop_front() {
            if let Err(error) = self.transport.send(&message) {
                warn!(
                    lost = queued.len() + 1,
                    %error,
                    "transport dropped during queue flush, unsent messages are lost"
                );
                return Some(
                    self.abnormal_drop("connection dropped while flushing queued messages".into()),
                );
            }
        }
        None
    }

    /// Turn a close frame into the event the driver acts on. 1000 means
    /// stay down, 1008 means refresh the credential, anything else is a
    /// network-style drop with backoff advice.
    fn close_event(&mut self, code: Option<u16>, reason: String) -> BoardEvent {
        match code {
            Some(CLOSE_CODE_NORMAL) => {
                self.transport.close();
                self.state = ConnectionState::Disconnected;
                BoardEvent::Disconnected { reason, retry_in: None }
            }
            Some(CLOSE_CODE_POLICY_VIOLATION) => {
                self.transport.close();
                self.state = ConnectionState::Disconnected;
                let retry_in = if self.auth_retry_used {
                    None
                } else {
                    self.auth_retry_used = true;
                    Some(self.policy.base_delay)
                };
                BoardEvent::AuthRejected { reason, retry_in }
            }
            _ => self.abnormal_drop(reason),
        }
    }

    /// Record an abnormal drop: advice is computed before the failure is
    /// counted, so the first retry waits `base_delay` and each later one
    /// doubles.
    fn abnormal_drop(&mut self, reason: String) -> BoardEvent {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        let retry_in = self.should_reconnect().then(|| self.reconnect_delay());
        self.consecutive_failures += 1;
        BoardEvent::Disconnected { reason, retry_in }
    }
}

fn validate_ws_url(value: &str) -> Result<Url> {
    let parsed = Url::parse(value).map_err(|error| anyhow!("invalid ws_url `{value}`: {error}"))?;
    match parsed.scheme() {
        "wss" => Ok(parsed),
        "ws" if is_loopback_host(parsed.host_str()) => Ok(parsed),
        _ => Err(anyhow!("ws_url must use wss (ws is allowed only for localhost testing)")),
    }
}

fn is_loopback_host(host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|addr| addr.is_loopback())
}

// ── Backoff helper (for Duration::saturating_mul with u64) ──────────

trait DurationSaturatingMul {
    fn saturating_mul(self, rhs: u64) -> Self;
}

impl DurationSaturatingMul for Duration {
    fn saturating_mul(self, rhs: u64) -> Self {
        let nanos = self.as_nanos().saturating_mul(rhs as u128);
        if nanos > u64::MAX as u128 {
            Duration::from_secs(u64::MAX)
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corkboard_common::protocol::ws::ConnectedPayload;

    // ── Mock transport ──────────────────────────────────────────────

    #[derive(Debug, Default)]
    struct MockTransport {
        /// Items to be returned by recv() in order.
        recv_queue: VecDeque<Incoming>,
        /// Messages sent via send().
        sent: Vec<ClientMessage>,
        /// URLs passed to connect().
        connected_to: Vec<String>,
        /// Whether close was called.
        closed: bool,
        /// If set, connect returns this error.
        connect_error: Option<String>,
        /// If set, send fails once this many messages have gone through.
        fail_sends_after: Option<usize>,
    }

    impl MockTransport {
        fn queue_message(&mut self, message: ServerMessage) {
            self.recv_queue.push_back(Incoming::Message(message));
        }

        fn queue_close(&mut self, code: Option<u16>, reason: &str) {
            self.recv_queue
                .push_back(Incoming::Closed { code, reason: reason.to_string() });
        }

        fn queue_ack(&mut self) {
            self.queue_message(ServerMessage::Connected(ConnectedPayload {
                connection_id: Uuid::new_v4(),
                user: UserPublic { id: 1, display_name: "alex".to_string() },
            }));
        }
    }

    impl BoardTransport for MockTransport {
        fn connect(&mut self, ws_url: &str) -> Result<()> {
            if let Some(error) = &self.connect_error {
                return Err(anyhow!("{error}"));
            }
            self.connected_to.push(ws_url.to_string());
            Ok(())
        }

        fn send(&mut self, message: &ClientMessage) -> Result<()> {
            if let Some(limit) = self.fail_sends_after {
                if self.sent.len() >= limit {
                    return Err(anyhow!("broken pipe"));
                }
            }
            self.sent.push(message.clone());
            Ok(())
        }

        fn recv(&mut self) -> Result<Incoming> {
            self.recv_queue.pop_front().ok_or_else(|| anyhow!("recv queue exhausted"))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn test_config() -> BoardClientConfig {
        BoardClientConfig {
            ws_url: "wss://board.test/ws".to_string(),
            access_token: "token-abc".to_string(),
        }
    }

    fn connected_client(mut transport: MockTransport) -> BoardClient<MockTransport> {
        transport.queue_ack();
        let mut client = BoardClient::new(test_config(), transport);
        let event = client.connect().expect("connect should succeed").expect("connect should act");
        assert!(matches!(event, BoardEvent::Connected { .. }), "expected Connected, got {event:?}");
        client
    }

    fn note(content: &str) -> ClientMessage {
        ClientMessage::NewNote { board_id: 7, content: content.to_string() }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    #[test]
    fn connect_happy_path() {
        let mut transport = MockTransport::default();
        transport.queue_ack();

        let mut client = BoardClient::new(test_config(), transport);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let event = client.connect().expect("connect should succeed").expect("should act");
        match event {
            BoardEvent::Connected { user, .. } => assert_eq!(user.display_name, "alex"),
            other => panic!("expected Connected, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_appends_the_access_token() {
        let client = connected_client(MockTransport::default());
        assert_eq!(client.transport.connected_to, vec!["wss://board.test/ws?token=token-abc"]);
    }

    #[test]
    fn connect_is_a_noop_while_open() {
        let mut client = connected_client(MockTransport::default());

        let second = client.connect().expect("connect should succeed");
        assert!(second.is_none());
        assert_eq!(client.transport.connected_to.len(), 1);
    }

    #[test]
    fn connect_rejects_non_tls_url() {
        let mut config = test_config();
        config.ws_url = "ws://board.test/ws".to_string();

        let mut client = BoardClient::new(config, MockTransport::default());
        let error = client.connect().expect_err("insecure url should be rejected");
        assert!(error.to_string().contains("ws_url must use wss"));
    }

    #[test]
    fn loopback_ws_url_is_allowed_for_testing() {
        let mut config = test_config();
        config.ws_url = "ws://127.0.0.1:8080/ws".to_string();
        let mut transport = MockTransport::default();
        transport.queue_ack();

        let mut client = BoardClient::new(config, transport);
        let event = client.connect().expect("connect should succeed").expect("should act");
        assert!(matches!(event, BoardEvent::Connected { .. }));
    }

    #[test]
    fn connect_fails_when_the_socket_cannot_open() {
        let mut transport = MockTransport::default();
        transport.connect_error = Some("refused".to_string());

        let mut client = BoardClient::new(test_config(), transport);
        let event = client.connect().expect("connect should return an event").expect("should act");

        match event {
            BoardEvent::Disconnected { reason, retry_in } => {
                assert!(reason.contains("connection failed"));
                assert_eq!(retry_in, Some(Duration::from_secs(1)));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn unexpected_first_frame_drops_the_connection() {
        let mut transport = MockTransport::default();
        transport.queue_message(ServerMessage::Pong);

        let mut client = BoardClient::new(test_config(), transport);
        let event = client.connect().expect("connect should return an event").expect("should act");

        match event {
            BoardEvent::Disconnected { reason, .. } => {
                assert!(reason.contains("unexpected frame"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }

    // ── Credential rejection ────────────────────────────────────────

    #[test]
    fn handshake_close_with_1008_is_an_auth_rejection() {
        let mut transport = MockTransport::default();
        transport.queue_close(Some(1008), "token expired");

        let mut client = BoardClient::new(test_config(), transport);
        let event = client.connect().expect("connect should return an event").expect("should act");

        assert_eq!(
            event,
            BoardEvent::AuthRejected {
                reason: "token expired".to_string(),
                retry_in: Some(Duration::from_secs(1)),
            }
        );
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn second_auth_rejection_gives_up() {
        let mut transport = MockTransport::default();
        transport.queue_close(Some(1008), "token expired");
        transport.queue_close(Some(1008), "token expired");

        let mut client = BoardClient::new(test_config(), transport);

        let first = client.connect().expect("connect").expect("event");
        assert!(matches!(first, BoardEvent::AuthRejected { retry_in: Some(_), .. }));

        let second = client.connect().expect("connect").expect("event");
        assert!(
            matches!(second, BoardEvent::AuthRejected { retry_in: None, .. }),
            "the fixed retry is spent: {second:?}",
        );
    }

    #[test]
    fn auth_retry_allowance_resets_after_a_real_connection() {
        let mut transport = MockTransport::default();
        transport.queue_close(Some(1008), "token expired");
        transport.queue_ack();
        transport.queue_close(Some(1008), "token expired");

        let mut client = BoardClient::new(test_config(), transport);

        let rejected = client.connect().expect("connect").expect("event");
        assert!(matches!(rejected, BoardEvent::AuthRejected { retry_in: Some(_), .. }));

        let connected = client.connect().expect("connect").expect("event");
        assert!(matches!(connected, BoardEvent::Connected { .. }));

        // A fresh session earns a fresh refresh-and-retry allowance.
        let rejected_again = client.recv_event().expect("recv");
        assert!(matches!(rejected_again, BoardEvent::AuthRejected { retry_in: Some(_), .. }));
    }

    // ── Normal and abnormal closes ──────────────────────────────────

    #[test]
    fn normal_close_means_no_reconnect() {
        let mut client = connected_client(MockTransport::default());
        client.transport.queue_close(Some(1000), "bye");

        let event = client.recv_event().expect("recv");
        assert_eq!(
            event,
            BoardEvent::Disconnected { reason: "bye".to_string(), retry_in: None }
        );
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn abnormal_closes_double_the_backoff() {
        let mut transport = MockTransport::default();
        for _ in 0..3 {
            transport.queue_close(Some(1006), "gone");
        }

        let mut client = BoardClient::new(test_config(), transport);

        let mut delays = Vec::new();
        for _ in 0..3 {
            match client.connect().expect("connect").expect("event") {
                BoardEvent::Disconnected { retry_in: Some(delay), .. } => delays.push(delay),
                other => panic!("expected Disconnected with advice, got {other:?}"),
            }
        }

        assert_eq!(
            delays,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(1),
            max_attempts: u32::MAX,
            ..Default::default()
        };
        let mut transport = MockTransport::default();
        transport.connect_error = Some("refused".to_string());

        let mut client =
            BoardClient::new(test_config(), transport).with_reconnect_policy(policy);
        for _ in 0..12 {
            client.connect().expect("connect");
        }

        assert_eq!(client.reconnect_delay(), Duration::from_secs(1));
    }

    #[test]
    fn the_attempt_cap_ends_automatic_retries() {
        let mut transport = MockTransport::default();
        transport.connect_error = Some("refused".to_string());

        let mut client = BoardClient::new(test_config(), transport);

        for attempt in 0..5 {
            match client.connect().expect("connect").expect("event") {
                BoardEvent::Disconnected { retry_in, .. } => {
                    assert!(retry_in.is_some(), "attempt {attempt} should still advise a retry");
                }
                other => panic!("expected Disconnected, got {other:?}"),
            }
        }

        match client.connect().expect("connect").expect("event") {
            BoardEvent::Disconnected { retry_in, .. } => assert_eq!(retry_in, None),
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(!client.should_reconnect());
    }

    #[test]
    fn a_successful_handshake_resets_the_backoff() {
        let mut transport = MockTransport::default();
        transport.connect_error = Some("refused".to_string());

        let mut client = BoardClient::new(test_config(), transport);
        client.connect().expect("connect");
        client.connect().expect("connect");
        assert!(client.reconnect_delay() > Duration::from_secs(1));

        client.transport.connect_error = None;
        client.transport.queue_ack();
        let event = client.connect().expect("connect").expect("event");
        assert!(matches!(event, BoardEvent::Connected { .. }));

        assert_eq!(client.reconnect_delay(), Duration::from_secs(1));
    }

    // ── Outbound queue ──────────────────────────────────────────────

    #[test]
    fn messages_queue_while_disconnected_and_flush_in_order() {
        let mut client = BoardClient::new(test_config(), MockTransport::default());

        client.send(note("first")).expect("queueing should succeed");
        client.send(note("second")).expect("queueing should succeed");
        assert_eq!(client.queued_messages(), 2);
        assert!(client.transport.sent.is_empty());

        client.transport.queue_ack();
        let event = client.connect().expect("connect").expect("event");
        assert!(matches!(event, BoardEvent::Connected { .. }));

        assert_eq!(client.transport.sent, vec![note("first"), note("second")]);
        assert_eq!(client.queued_messages(), 0);
    }

    #[test]
    fn messages_lost_mid_flush_are_not_requeued() {
        let mut client = BoardClient::new(test_config(), MockTransport::default());
        client.send(note("first")).expect("queueing should succeed");
        client.send(note("second")).expect("queueing should succeed");

        client.transport.queue_ack();
        client.transport.fail_sends_after = Some(1);

        let event = client.connect().expect("connect").expect("event");
        match event {
            BoardEvent::Disconnected { reason, .. } => assert!(reason.contains("flushing")),
            other => panic!("expected Disconnected, got {other:?}"),
        }

        assert_eq!(client.transport.sent, vec![note("first")]);
        assert_eq!(client.queued_messages(), 0, "the unsent remainder is dropped");
    }

    #[test]
    fn sends_go_straight_through_while_connected() {
        let mut client = connected_client(MockTransport::default());

        client.send(note("now")).expect("send should succeed");
        assert_eq!(client.transport.sent, vec![note("now")]);
        assert_eq!(client.queued_messages(), 0);
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    #[test]
    fn ping_fires_on_the_interval() {
        let mut client = connected_client(MockTransport::default());
        let start = Instant::now();

        // First call only establishes the epoch.
        assert!(!client.maybe_send_ping(start).expect("ping check"));
        assert!(!client.maybe_send_ping(start + Duration::from_secs(29)).expect("ping check"));
        assert!(client.maybe_send_ping(start + Duration::from_secs(30)).expect("ping check"));
        assert_eq!(client.transport.sent, vec![ClientMessage::Ping]);

        // The clock restarts at every ping.
        assert!(!client.maybe_send_ping(start + Duration::from_secs(31)).expect("ping check"));
        assert!(client.maybe_send_ping(start + Duration::from_secs(60)).expect("ping check"));
    }

    #[test]
    fn ping_is_suppressed_while_disconnected() {
        let mut client = BoardClient::new(test_config(), MockTransport::default());

        assert!(!client.maybe_send_ping(Instant::now()).expect("ping check"));
        assert!(client.transport.sent.is_empty());
    }

    // ── Manual disconnect ───────────────────────────────────────────

    #[test]
    fn disconnect_closes_transport_and_allows_a_new_connect() {
        let mut client = connected_client(MockTransport::default());

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.transport.closed);

        client.transport.queue_ack();
        let event = client.connect().expect("connect").expect("event");
        assert!(matches!(event, BoardEvent::Connected { .. }));
    }

    // ── Events passthrough ──────────────────────────────────────────

    #[test]
    fn server_frames_surface_as_message_events() {
        let mut client = connected_client(MockTransport::default());
        client.transport.queue_message(ServerMessage::Pong);

        let event = client.recv_event().expect("recv");
        assert_eq!(event, BoardEvent::Message(ServerMessage::Pong));
    }

    #[test]
    fn recv_fails_when_not_connected() {
        let mut client = BoardClient::new(test_config(), MockTransport::default());
        assert!(client.recv_event().is_err());
    }
}
