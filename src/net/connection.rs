//! Per-connection tasks: line-framed reader, writer, and message router.
//!
//! Each accepted socket gets one reader task (this module's `serve`) and one
//! writer task fed by an unbounded channel. All shared-state changes go
//! through the `Broker`; the router owns only the connection-local
//! authentication state.

use crate::auth::IdentityVerifier;
use crate::broker::session::{ConnId, Session};
use crate::broker::Broker;
use crate::core::time::Clock;
use crate::protocol::{
    ClientMessage, DisconnectReason, ErrorCode, LocationPayload, Role, ServerMessage,
};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Run one peer connection to completion. Returns when the peer disconnects,
/// the session is closed by the broker, the authentication deadline passes
/// without a handshake, or the runtime shuts down.
pub async fn serve<C: Clock>(
    stream: TcpStream,
    peer: SocketAddr,
    broker: Arc<Broker<C>>,
    verifier: Arc<dyn IdentityVerifier>,
    auth_deadline: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let conn_id = ConnId::new();
    let (read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (close_tx, close_rx) = watch::channel(false);

    let writer = tokio::spawn(write_loop(write_half, out_rx, close_rx.clone()));

    let _ = out_tx.send(ServerMessage::Welcome {
        timestamp_ms: broker.now_millis(),
    });

    let mut router = Router {
        broker: broker.clone(),
        verifier,
        conn_id,
        out_tx,
        // Handed to the registry entry on successful authentication.
        closer: Some(close_tx),
        principal: None,
    };

    let mut lines = BufReader::new(read_half).lines();
    let mut close_rx = close_rx;
    // Connections that never complete the handshake hold no broker state, so
    // the only thing reclaiming them is this deadline.
    let auth_deadline = tokio::time::sleep(auth_deadline);
    tokio::pin!(auth_deadline);
    loop {
        tokio::select! {
            () = &mut auth_deadline, if router.principal.is_none() => {
                debug!(peer = %peer, "authentication deadline passed");
                break;
            }
            changed = close_rx.changed() => {
                if changed.is_err() || *close_rx.borrow() {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => router.route_line(&line),
                    Ok(None) => break,
                    Err(err) => {
                        debug!(peer = %peer, error = %err, "connection read failed");
                        break;
                    }
                }
            }
        }
    }

    // Reclaim registry and index state held by this connection. The conn id
    // guard keeps a stale teardown from evicting a takeover replacement.
    if let Some(principal) = &router.principal {
        broker.evict(
            &principal.identity,
            Some(conn_id),
            DisconnectReason::ConnectionClosed,
        );
    }
    if let Some(closer) = router.closer.take() {
        let _ = closer.send(true);
    }
    drop(router);
    let _ = writer.await;
    debug!(peer = %peer, conn = %conn_id, "connection closed");
    Ok(())
}

/// Writer task: drains the outbound queue onto the socket as JSON lines.
/// On the close signal it flushes whatever is already queued (the teardown
/// notice in particular) before exiting.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<ServerMessage>,
    mut close_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                if changed.is_err() || *close_rx.borrow() {
                    while let Ok(message) = out_rx.try_recv() {
                        if write_message(&mut write_half, &message).await.is_err() {
                            return;
                        }
                    }
                    return;
                }
            }
            message = out_rx.recv() => {
                match message {
                    Some(message) => {
                        if write_message(&mut write_half, &message).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

async fn write_message(
    write_half: &mut OwnedWriteHalf,
    message: &ServerMessage,
) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(message).unwrap_or_default();
    line.push(b'\n');
    write_half.write_all(&line).await
}

struct Principal {
    identity: String,
    role: Role,
}

struct Router<C: Clock> {
    broker: Arc<Broker<C>>,
    verifier: Arc<dyn IdentityVerifier>,
    conn_id: ConnId,
    out_tx: mpsc::UnboundedSender<ServerMessage>,
    closer: Option<watch::Sender<bool>>,
    principal: Option<Principal>,
}

impl<C: Clock> Router<C> {
    fn route_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<ClientMessage>(line) {
            Ok(message) => self.route(message),
            Err(err) => {
                self.error(ErrorCode::Protocol, &format!("malformed message: {err}"));
            }
        }
    }

    fn route(&mut self, message: ClientMessage) {
        debug!(conn = %self.conn_id, kind = message.label(), "inbound message");
        match message {
            ClientMessage::Authenticate {
                identity,
                role,
                credential_token,
            } => self.handle_authenticate(identity, role, &credential_token),
            ClientMessage::SubscribeTopic { topic } => self.handle_subscribe(&topic),
            ClientMessage::UnsubscribeTopic { topic } => self.handle_unsubscribe(&topic),
            ClientMessage::UpdateLocation {
                topic,
                latitude,
                longitude,
                accuracy,
            } => self.handle_update_location(
                &topic,
                LocationPayload {
                    latitude,
                    longitude,
                    accuracy,
                },
            ),
            ClientMessage::Ping => self.handle_ping(),
            ClientMessage::Pong => self.handle_pong(),
            ClientMessage::Echo { payload } => self.handle_echo(payload),
        }
    }

    fn handle_authenticate(&mut self, identity: String, role: Role, token: &str) {
        if self.principal.is_some() {
            self.error(ErrorCode::Protocol, "already authenticated");
            return;
        }
        if let Err(err) = self.verifier.verify(&identity, token, role) {
            warn!(identity = %identity, role = role.as_str(), error = %err, "authentication rejected");
            self.error(ErrorCode::AuthenticationFailed, &err.to_string());
            return;
        }
        let Some(closer) = self.closer.take() else {
            self.error(ErrorCode::Internal, "connection is shutting down");
            return;
        };
        let outcome = self.broker.admit(Session::new(
            identity.clone(),
            role,
            self.conn_id,
            self.out_tx.clone(),
            closer,
        ));
        if let Some(old_conn) = outcome.displaced {
            debug!(identity = %identity, old_conn = %old_conn, "displaced prior session");
        }
        self.send(ServerMessage::Authenticated {
            identity: identity.clone(),
            role,
            load: outcome.load,
        });
        self.send(ServerMessage::Stats { load: outcome.load });
        self.principal = Some(Principal { identity, role });
    }

    fn handle_subscribe(&mut self, topic: &str) {
        let Some(identity) = self.authenticated_identity() else {
            return;
        };
        if topic.is_empty() {
            self.error(ErrorCode::Protocol, "topic must be non-empty");
            return;
        }
        self.broker.subscribe(&identity, topic);
        self.send(ServerMessage::Subscribed {
            topic: topic.to_string(),
        });
    }

    fn handle_unsubscribe(&mut self, topic: &str) {
        let Some(identity) = self.authenticated_identity() else {
            return;
        };
        if topic.is_empty() {
            self.error(ErrorCode::Protocol, "topic must be non-empty");
            return;
        }
        self.broker.unsubscribe(&identity, topic);
        self.send(ServerMessage::Unsubscribed {
            topic: topic.to_string(),
        });
    }

    fn handle_update_location(&mut self, topic: &str, payload: LocationPayload) {
        let Some(principal) = &self.principal else {
            self.error(ErrorCode::NotAuthenticated, "authenticate first");
            return;
        };
        if !principal.role.may_publish_location() {
            self.error(
                ErrorCode::NotAuthorized,
                "update_location requires courier or admin role",
            );
            return;
        }
        self.broker.publish_location(topic, payload);
    }

    fn handle_ping(&mut self) {
        let Some(identity) = self.authenticated_identity() else {
            return;
        };
        // Any inbound liveness-shaped traffic proves the peer responsive.
        self.broker.mark_alive(&identity, self.conn_id);
        self.send(ServerMessage::Pong {
            timestamp_ms: self.broker.now_millis(),
        });
    }

    fn handle_pong(&mut self) {
        let Some(identity) = self.authenticated_identity() else {
            return;
        };
        self.broker.mark_alive(&identity, self.conn_id);
    }

    fn handle_echo(&mut self, payload: serde_json::Value) {
        if self.authenticated_identity().is_none() {
            return;
        }
        self.send(ServerMessage::Echo { payload });
    }

    fn authenticated_identity(&mut self) -> Option<String> {
        match &self.principal {
            Some(principal) => Some(principal.identity.clone()),
            None => {
                self.error(ErrorCode::NotAuthenticated, "authenticate first");
                None
            }
        }
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.out_tx.send(message);
    }

    fn error(&self, code: ErrorCode, message: &str) {
        self.send(ServerMessage::Error {
            code,
            message: message.to_string(),
        });
    }
}
