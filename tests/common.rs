//! Common test harness utilities for integration tests.
//!
//! Provides a broker runtime started on ephemeral ports and a line-protocol
//! peer client for driving the wire protocol directly.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use trackcast::config::{AdminConfig, AuthConfig, Config, ListenerConfig, LivenessConfig};
use trackcast::protocol::{ClientMessage, Role, ServerMessage};
use trackcast::runtime::Runtime;
use trackcast::time::SystemClock;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A broker runtime bound to ephemeral ports.
pub struct TestRuntime {
    runtime: Runtime<SystemClock>,
    pub peer_addr: SocketAddr,
    pub admin_addr: SocketAddr,
}

impl TestRuntime {
    pub async fn start() -> Self {
        // Long probe interval so liveness never interferes with the scenario.
        Self::start_with(3600, AuthConfig::default()).await
    }

    pub async fn start_with(probe_interval_secs: u64, auth: AuthConfig) -> Self {
        Self::start_full(probe_interval_secs, 3600, auth).await
    }

    pub async fn start_with_auth_deadline(auth_deadline_secs: u64) -> Self {
        Self::start_full(3600, auth_deadline_secs, AuthConfig::default()).await
    }

    async fn start_full(
        probe_interval_secs: u64,
        auth_deadline_secs: u64,
        auth: AuthConfig,
    ) -> Self {
        let config = Config {
            listener: ListenerConfig {
                bind: "127.0.0.1:0".into(),
                auth_deadline_secs,
            },
            admin: AdminConfig {
                bind: "127.0.0.1:0".into(),
                disabled: false,
            },
            liveness: LivenessConfig {
                probe_interval_secs,
            },
            auth,
            telemetry: Default::default(),
        };
        let mut runtime =
            Runtime::new(config, SystemClock, None).expect("construct runtime");
        runtime.start_for_tests().await.expect("start runtime");
        let peer_addr = runtime.peer_addr().expect("peer listener addr");
        let admin_addr = runtime.admin_addr().expect("admin endpoint addr");
        Self {
            runtime,
            peer_addr,
            admin_addr,
        }
    }

    pub async fn shutdown(mut self) {
        self.runtime
            .shutdown_for_tests()
            .await
            .expect("shutdown runtime");
    }
}

/// Line-protocol peer client.
pub struct TestPeer {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestPeer {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to broker");
        let (read_half, write) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            write,
        }
    }

    pub async fn send(&mut self, message: &ClientMessage) {
        let mut line = serde_json::to_vec(message).expect("encode message");
        line.push(b'\n');
        self.write.write_all(&line).await.expect("send message");
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.write
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("send raw line");
    }

    /// Next message, or panic after the receive timeout.
    pub async fn recv(&mut self) -> ServerMessage {
        let line = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("receive timed out")
            .expect("read line")
            .expect("connection closed");
        serde_json::from_str(&line).expect("parse broker message")
    }

    /// Skip messages until one matches the predicate.
    pub async fn recv_until<F>(&mut self, mut matches: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let message = self.recv().await;
            if matches(&message) {
                return message;
            }
        }
    }

    /// True once the broker closes the connection (within the timeout).
    pub async fn wait_closed(&mut self) -> bool {
        loop {
            match timeout(RECV_TIMEOUT, self.lines.next_line()).await {
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) => return true,
                Ok(Err(_)) => return true,
                Err(_) => return false,
            }
        }
    }

    /// Full handshake: consumes the welcome and returns on the authenticated ack.
    pub async fn authenticate(&mut self, identity: &str, role: Role, token: &str) {
        self.send(&ClientMessage::Authenticate {
            identity: identity.into(),
            role,
            credential_token: token.into(),
        })
        .await;
        let ack = self
            .recv_until(|m| {
                matches!(
                    m,
                    ServerMessage::Authenticated { .. } | ServerMessage::Error { .. }
                )
            })
            .await;
        assert!(
            matches!(ack, ServerMessage::Authenticated { .. }),
            "handshake rejected: {ack:?}"
        );
    }

    /// Subscribe and wait for the ack.
    pub async fn subscribe(&mut self, topic: &str) {
        self.send(&ClientMessage::SubscribeTopic {
            topic: topic.into(),
        })
        .await;
        self.recv_until(|m| matches!(m, ServerMessage::Subscribed { .. }))
            .await;
    }
}

/// Issue a bare HTTP GET against the admin endpoint; returns (status, body).
pub async fn admin_get(addr: SocketAddr, path_and_query: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect to admin");
    let request =
        format!("GET {path_and_query} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("send request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
