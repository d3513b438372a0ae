//! WebSocket event stream for observing sessions and service health.
//!
//! Events are broadcast to every connected client as sessions progress and
//! as the availability monitor changes state.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the monitor state
//! - `session_started` - A learner started a session
//! - `state_changed` - A session moved (carries the new view)
//! - `explanation_ready` - A re-explanation resolved
//! - `evaluation_ready` - A reflection was classified
//! - `session_finished` - A learner left for topic selection
//! - `availability_changed` - The generative service cooled down or recovered
//! - `error` - A request failed
//!
//! # Example
//!
//! ```no_run
//! use lumi_orchestrator::websocket::{EventBroadcaster, LumiEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(LumiEvent::error(None, "store offline"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use lumi_content::{AvailabilityState, Decision, Emotion, Origin};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::SessionView;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    /// Current monitor state.
    pub availability: AvailabilityState,
    /// Sessions currently open.
    pub active_sessions: usize,
}

/// Payload for the `session_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedPayload {
    /// Session id.
    pub session_id: String,
    /// Learner id.
    pub learner_id: String,
    /// Topic.
    pub topic: String,
    /// Level.
    pub level: u32,
}

/// Payload for the `state_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedPayload {
    /// The session after the change.
    pub view: SessionView,
}

/// Payload for the `explanation_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationReadyPayload {
    /// Session id.
    pub session_id: String,
    /// Tier that answered.
    pub origin: Origin,
    /// Degraded content indicator.
    pub is_offline: bool,
    /// Whether the session still wanted it.
    pub applied: bool,
}

/// Payload for the `evaluation_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReadyPayload {
    /// Session id.
    pub session_id: String,
    /// Classifier decision.
    pub decision: Decision,
    /// Classified emotion.
    pub emotion: Emotion,
    /// Local rule was used.
    pub is_offline: bool,
}

/// Payload for the `session_finished` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFinishedPayload {
    /// Session id.
    pub session_id: String,
    /// Learner id.
    pub learner_id: String,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Session the error belongs to, if any.
    pub session_id: Option<String>,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum LumiEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when a session starts.
    SessionStarted(SessionStartedPayload),
    /// Sent after every applied learner event.
    StateChanged(StateChangedPayload),
    /// Sent when a re-explanation resolves.
    ExplanationReady(ExplanationReadyPayload),
    /// Sent when a reflection is classified.
    EvaluationReady(EvaluationReadyPayload),
    /// Sent when a session ends.
    SessionFinished(SessionFinishedPayload),
    /// Sent when the monitor changes state.
    AvailabilityChanged(AvailabilityState),
    /// Sent when an error occurs.
    Error(ErrorPayload),
}

impl LumiEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(availability: AvailabilityState, active_sessions: usize) -> Self {
        Self::Connected(ConnectedPayload {
            availability,
            active_sessions,
        })
    }

    /// Creates a `SessionStarted` event from a fresh view.
    #[must_use]
    pub fn session_started(view: &SessionView) -> Self {
        Self::SessionStarted(SessionStartedPayload {
            session_id: view.id.clone(),
            learner_id: view.learner_id.clone(),
            topic: view.topic.clone(),
            level: view.level,
        })
    }

    /// Creates a `StateChanged` event.
    #[must_use]
    pub const fn state_changed(view: SessionView) -> Self {
        Self::StateChanged(StateChangedPayload { view })
    }

    /// Creates an `ExplanationReady` event.
    #[must_use]
    pub fn explanation_ready(
        session_id: impl Into<String>,
        origin: Origin,
        is_offline: bool,
        applied: bool,
    ) -> Self {
        Self::ExplanationReady(ExplanationReadyPayload {
            session_id: session_id.into(),
            origin,
            is_offline,
            applied,
        })
    }

    /// Creates an `EvaluationReady` event.
    #[must_use]
    pub fn evaluation_ready(
        session_id: impl Into<String>,
        decision: Decision,
        emotion: Emotion,
        is_offline: bool,
    ) -> Self {
        Self::EvaluationReady(EvaluationReadyPayload {
            session_id: session_id.into(),
            decision,
            emotion,
            is_offline,
        })
    }

    /// Creates a `SessionFinished` event.
    #[must_use]
    pub fn session_finished(session_id: impl Into<String>, learner_id: impl Into<String>) -> Self {
        Self::SessionFinished(SessionFinishedPayload {
            session_id: session_id.into(),
            learner_id: learner_id.into(),
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(session_id: Option<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            session_id,
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::SessionStarted(_) => "session_started",
            Self::StateChanged(_) => "state_changed",
            Self::ExplanationReady(_) => "explanation_ready",
            Self::EvaluationReady(_) => "evaluation_ready",
            Self::SessionFinished(_) => "session_finished",
            Self::AvailabilityChanged(_) => "availability_changed",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts events to all connected WebSocket clients.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<LumiEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster; `capacity` events are buffered per subscriber
    /// before the oldest are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LumiEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event. Returns the number of receivers; 0 means no
    /// clients are connected.
    pub fn send(&self, event: LumiEvent) -> usize {
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Forwards every monitor state change as `availability_changed`.
    ///
    /// The task ends when the monitor is dropped.
    pub fn relay_availability(&self, monitor: &AvailabilityMonitor) -> JoinHandle<()> {
        let mut states = monitor.subscribe();
        let mut last = *states.borrow_and_update();
        let broadcaster = self.clone();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                // The ticker publishes every second while cooling down; only
                // status flips are interesting to observers.
                if state.healthy != last.healthy {
                    debug!(healthy = state.healthy, "Availability changed");
                    broadcaster.send(LumiEvent::AvailabilityChanged(state));
                }
                last = state;
            }
        })
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use lumi_content::AvailabilityMonitor;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::orchestrator::SessionOrchestrator;

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Heartbeat ping period.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(orchestrator): State<Arc<SessionOrchestrator>>,
) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the monitor state immediately
/// - Forwards all broadcast events to the client
/// - Sends heartbeat pings every 30 seconds
/// - Closes the connection after 3 missed pongs
async fn handle_socket(socket: WebSocket, orchestrator: Arc<SessionOrchestrator>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading state so no event slips between the two
    let mut event_receiver = orchestrator.broadcaster().subscribe();

    let connected = LumiEvent::connected(
        orchestrator.availability(),
        orchestrator.active_sessions().await,
    );
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        // Observers only listen; commands go through the HTTP API
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
