//! Wire protocol for broker peers.
//!
//! Peers exchange newline-delimited JSON objects tagged with a `type` field.
//! The finite message vocabulary is expressed as two closed enums so that
//! routing is an exhaustive `match` rather than string dispatch; an unknown
//! tag fails deserialization and is answered with an explicit error reply.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Principal role resolved during the authentication handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Courier,
    Client,
}

impl Role {
    /// Whether this role may emit location updates for a shipment.
    pub fn may_publish_location(&self) -> bool {
        matches!(self, Role::Admin | Role::Courier)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Courier => "courier",
            Role::Client => "client",
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound messages (peer -> broker)
// ---------------------------------------------------------------------------

/// Messages a peer may send to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identity claim; must be the first accepted message on a connection.
    Authenticate {
        identity: String,
        role: Role,
        credential_token: String,
    },
    /// Register interest in a shipment topic.
    SubscribeTopic { topic: String },
    /// Withdraw interest in a shipment topic.
    UnsubscribeTopic { topic: String },
    /// Courier/admin position report, fanned out to topic subscribers.
    UpdateLocation {
        topic: String,
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accuracy: Option<f64>,
    },
    /// Application-level ping; answered with `pong`.
    Ping,
    /// Acknowledgment of a liveness probe.
    Pong,
    /// Diagnostic echo; the payload is returned verbatim to the sender.
    Echo {
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl ClientMessage {
    pub fn label(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate { .. } => "authenticate",
            ClientMessage::SubscribeTopic { .. } => "subscribe_topic",
            ClientMessage::UnsubscribeTopic { .. } => "unsubscribe_topic",
            ClientMessage::UpdateLocation { .. } => "update_location",
            ClientMessage::Ping => "ping",
            ClientMessage::Pong => "pong",
            ClientMessage::Echo { .. } => "echo",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound messages (broker -> peer)
// ---------------------------------------------------------------------------

/// Snapshot of broker load, attached to handshake acks and stats frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerLoad {
    /// Currently registered (authenticated) sessions.
    pub sessions: usize,
    /// Topics with at least one subscriber.
    pub topics: usize,
}

/// Status payload of a `package_update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Coordinate payload of a `location_update` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Messages the broker may send to a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent on connection open, before authentication.
    Welcome { timestamp_ms: u64 },
    /// Handshake acknowledgment with the resolved principal and broker load.
    Authenticated {
        identity: String,
        role: Role,
        load: BrokerLoad,
    },
    /// Broker load snapshot.
    Stats { load: BrokerLoad },
    /// Error reply; terminal to the offending message only.
    Error { code: ErrorCode, message: String },
    Subscribed { topic: String },
    Unsubscribed { topic: String },
    /// Shipment status transition fanned out to topic subscribers.
    PackageUpdate {
        topic: String,
        payload: StatusPayload,
        timestamp_ms: u64,
    },
    /// Courier position fanned out to topic subscribers.
    LocationUpdate {
        topic: String,
        payload: LocationPayload,
        timestamp_ms: u64,
    },
    /// Reply to a peer `ping`.
    Pong { timestamp_ms: u64 },
    /// Liveness probe; peers must answer with `pong` before the next sweep.
    Probe,
    /// Echoed diagnostic payload.
    Echo { payload: serde_json::Value },
    /// Teardown notice sent just before the broker closes the link.
    Disconnect { reason: DisconnectReason },
}

/// Why the broker is closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// A newer connection authenticated with the same identity.
    SessionTakenOver,
    /// Two consecutive liveness probes went unanswered.
    LivenessTimeout,
    /// The peer closed the socket or the runtime is shutting down.
    ConnectionClosed,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Error taxonomy reported to the offending connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or unknown message.
    Protocol,
    /// Credential check rejected the claim; the peer may retry.
    AuthenticationFailed,
    /// Message type requires authentication first.
    NotAuthenticated,
    /// Role-restricted action attempted by the wrong role.
    NotAuthorized,
    /// Internal fault; the operation was abandoned for this message only.
    Internal,
}
