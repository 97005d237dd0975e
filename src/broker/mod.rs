//! Broker coordinator: the single owner of registry and subscription state.
//!
//! All mutation funnels through `Broker` methods, serialized by one mutex, so
//! a publish racing an eviction observes either the full pre-eviction or the
//! full post-eviction state and the registry can never disagree with the
//! topic index about who is connected.

pub mod liveness;
pub mod registry;
pub mod session;
pub mod subscriptions;

use crate::core::time::Clock;
use crate::protocol::{
    BrokerLoad, DisconnectReason, LocationPayload, ServerMessage, StatusPayload,
};
use parking_lot::Mutex;
use registry::ConnectionRegistry;
use session::{ConnId, Session};
use std::sync::atomic::{AtomicU64, Ordering};
use subscriptions::TopicIndex;
use tracing::{debug, info};

#[derive(Default)]
struct BrokerState {
    registry: ConnectionRegistry,
    index: TopicIndex,
}

/// Result of admitting an authenticated session.
pub struct AdmitOutcome {
    /// Connection id of the displaced prior session, if the identity was
    /// already connected.
    pub displaced: Option<ConnId>,
    pub load: BrokerLoad,
}

/// Result of one liveness sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Identities evicted for missing the previous probe.
    pub evicted: Vec<String>,
    /// Sessions probed this tick.
    pub probed: usize,
}

pub struct Broker<C: Clock> {
    clock: C,
    state: Mutex<BrokerState>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl<C: Clock> Broker<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(BrokerState::default()),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Register an authenticated session. If the identity already has a live
    /// session the old one is displaced, notified, and closed
    /// (last-writer-wins); its subscriptions carry over to the new session.
    pub fn admit(&self, session: Session) -> AdmitOutcome {
        let identity = session.identity.clone();
        let (displaced, load) = {
            let mut state = self.state.lock();
            let displaced = state.registry.admit(session);
            (displaced, Self::load_of(&state))
        };
        let displaced = displaced.map(|old| {
            info!(identity = %identity, old_conn = %old.conn_id, "session taken over");
            old.send(ServerMessage::Disconnect {
                reason: DisconnectReason::SessionTakenOver,
            });
            old.close();
            old.conn_id
        });
        AdmitOutcome { displaced, load }
    }

    /// Remove the identity's session and purge its subscriptions, atomically.
    /// `expected_conn` guards a connection-teardown eviction against racing a
    /// takeover; pass `None` for unconditional eviction.
    pub fn evict(
        &self,
        identity: &str,
        expected_conn: Option<ConnId>,
        reason: DisconnectReason,
    ) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.registry.evict(identity, expected_conn);
            if removed.is_some() {
                state.index.remove_identity_everywhere(identity);
            }
            removed
        };
        match removed {
            Some(session) => {
                info!(identity = %identity, ?reason, "session evicted");
                session.send(ServerMessage::Disconnect { reason });
                session.close();
                true
            }
            None => false,
        }
    }

    /// Refresh the liveness flag. The connection id must still match the
    /// registered session, so a superseded connection's late pong does not
    /// vouch for the replacement.
    pub fn mark_alive(&self, identity: &str, conn_id: ConnId) {
        let mut state = self.state.lock();
        if let Some(session) = state.registry.lookup_mut(identity) {
            if session.conn_id == conn_id {
                session.alive = true;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Idempotent; returns false when the pair already existed.
    pub fn subscribe(&self, identity: &str, topic: &str) -> bool {
        self.state.lock().index.subscribe(topic, identity)
    }

    /// Idempotent; returns false when the pair was absent.
    pub fn unsubscribe(&self, identity: &str, topic: &str) -> bool {
        self.state.lock().index.unsubscribe(topic, identity)
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Fan a shipment status transition out to current topic subscribers.
    /// Returns the delivered count.
    pub fn publish_status(&self, topic: &str, payload: StatusPayload) -> usize {
        let timestamp_ms = self.clock.now_millis();
        self.publish(topic, &|topic| ServerMessage::PackageUpdate {
            topic: topic.to_string(),
            payload: payload.clone(),
            timestamp_ms,
        })
    }

    /// Fan a courier position out to current topic subscribers.
    pub fn publish_location(&self, topic: &str, payload: LocationPayload) -> usize {
        let timestamp_ms = self.clock.now_millis();
        self.publish(topic, &|topic| ServerMessage::LocationUpdate {
            topic: topic.to_string(),
            payload,
            timestamp_ms,
        })
    }

    fn publish(&self, topic: &str, make: &dyn Fn(&str) -> ServerMessage) -> usize {
        let state = self.state.lock();
        let Some(subscribers) = state.index.subscribers_of(topic) else {
            return 0;
        };
        let mut delivered = 0usize;
        for identity in subscribers {
            match state.registry.lookup(identity) {
                Some(session) => {
                    if session.send(make(topic)) {
                        delivered += 1;
                    } else {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(identity = %identity, topic = %topic, "outbound channel closed, event dropped");
                    }
                }
                None => {
                    // Subscriber without a session; skip and move on.
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(identity = %identity, topic = %topic, "subscriber has no live session");
                }
            }
        }
        self.delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// One liveness tick: evict every session that failed to acknowledge the
    /// previous probe, then clear the flag on the survivors and probe them.
    /// A dead connection therefore survives at most two ticks.
    pub fn sweep(&self) -> SweepReport {
        let (stale, probed) = {
            let mut state = self.state.lock();
            let stale_ids: Vec<String> = state
                .registry
                .iter()
                .filter(|s| !s.alive)
                .map(|s| s.identity.clone())
                .collect();
            let mut stale = Vec::with_capacity(stale_ids.len());
            for identity in &stale_ids {
                if let Some(session) = state.registry.evict(identity, None) {
                    state.index.remove_identity_everywhere(identity);
                    stale.push(session);
                }
            }
            let mut probed = 0usize;
            for session in state.registry.iter_mut() {
                session.alive = false;
                session.send(ServerMessage::Probe);
                probed += 1;
            }
            (stale, probed)
        };
        let mut evicted = Vec::with_capacity(stale.len());
        for session in stale {
            info!(identity = %session.identity, "liveness timeout, evicting session");
            session.send(ServerMessage::Disconnect {
                reason: DisconnectReason::LivenessTimeout,
            });
            session.close();
            evicted.push(session.identity.clone());
        }
        SweepReport { evicted, probed }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn load(&self) -> BrokerLoad {
        Self::load_of(&self.state.lock())
    }

    fn load_of(state: &BrokerState) -> BrokerLoad {
        BrokerLoad {
            sessions: state.registry.len(),
            topics: state.index.topic_count(),
        }
    }

    pub fn delivered_total(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
