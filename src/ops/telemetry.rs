use crate::broker::Broker;
use crate::core::time::Clock;
use crate::protocol::StatusPayload;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

pub type LogHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Initialize logging with a reloadable level filter. JSON formatting is
/// opt-in via configuration.
pub fn init_tracing(log_level: Option<&str>, json: bool) -> Result<LogHandle> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter_layer);
    let result = if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339());
        registry.with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true);
        registry.with(fmt_layer).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to init tracing: {e}"))?;
    Ok(handle)
}

/// Start the minimal admin HTTP endpoint: health, metrics, loglevel, and the
/// status-change notify ingress.
pub async fn start_http<C>(
    bind: &str,
    broker: Arc<Broker<C>>,
    log_handle: Option<LogHandle>,
) -> Result<SocketAddr>
where
    C: Clock + Send + Sync + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind admin endpoint on {bind}"))?;
    let local_addr = listener.local_addr().context("admin endpoint local_addr")?;
    tracing::info!("admin endpoint listening on {}", local_addr);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, addr)) => {
                    let broker = broker.clone();
                    let log_handle = log_handle.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_conn(&mut socket, addr, broker, log_handle).await {
                            tracing::warn!("admin handler error: {err:?}");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!("admin accept error: {err:?}");
                }
            }
        }
    });
    Ok(local_addr)
}

async fn handle_conn<C>(
    socket: &mut tokio::net::TcpStream,
    _addr: SocketAddr,
    broker: Arc<Broker<C>>,
    log_handle: Option<LogHandle>,
) -> Result<()>
where
    C: Clock + Send + Sync + 'static,
{
    let mut buf = [0u8; 4096];
    let n = socket.read(&mut buf).await?;
    let req = String::from_utf8_lossy(&buf[..n]);
    let first = req.lines().next().unwrap_or("");
    let path = first
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .split('?')
        .collect::<Vec<_>>();
    let route = path[0];
    let query = if path.len() > 1 { path[1] } else { "" };
    let (status, body, content_type) = match route {
        "/metrics" => (200, collect_metrics(&broker), "text/plain"),
        "/livez" => (200, "{\"live\":true}".to_string(), "application/json"),
        "/readyz" => (200, "{\"ready\":true}".to_string(), "application/json"),
        "/v1/loglevel" => {
            if let Some(handle) = log_handle {
                if let Some(level) = query.strip_prefix("level=") {
                    if let Ok(filter) = EnvFilter::try_new(level) {
                        let _ = handle.modify(|f| *f = filter);
                    }
                }
            }
            (200, "{\"status\":\"ok\"}".to_string(), "application/json")
        }
        "/v1/notify" => notify(&broker, query),
        _ => (404, "not found".to_string(), "text/plain"),
    };
    let resp = format!(
        "HTTP/1.1 {} OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    socket.write_all(resp.as_bytes()).await?;
    Ok(())
}

/// Status-change ingress: `?topic=PKG-1&status=delivered&details=left+porch`.
fn notify<C: Clock>(broker: &Broker<C>, query: &str) -> (u16, String, &'static str) {
    let mut topic = None;
    let mut status = None;
    let mut details = None;
    for part in query.split('&') {
        if let Some(val) = part.strip_prefix("topic=") {
            topic = Some(percent_decode(val));
        } else if let Some(val) = part.strip_prefix("status=") {
            status = Some(percent_decode(val));
        } else if let Some(val) = part.strip_prefix("details=") {
            details = Some(percent_decode(val));
        }
    }
    let (Some(topic), Some(status)) = (topic, status) else {
        return (
            400,
            "{\"error\":\"topic and status are required\"}".to_string(),
            "application/json",
        );
    };
    if topic.is_empty() || status.is_empty() {
        return (
            400,
            "{\"error\":\"topic and status must be non-empty\"}".to_string(),
            "application/json",
        );
    }
    let delivered = broker.publish_status(&topic, StatusPayload { status, details });
    (
        200,
        format!("{{\"delivered\":{}}}", delivered),
        "application/json",
    )
}

fn collect_metrics<C: Clock>(broker: &Broker<C>) -> String {
    let load = broker.load();
    format!(
        "trackcast_sessions {}\ntrackcast_topics_active {}\ntrackcast_events_delivered_total {}\ntrackcast_events_dropped_total {}\n",
        load.sessions,
        load.topics,
        broker.delivered_total(),
        broker.dropped_total(),
    )
}

/// Decode `+` and `%XX` escapes in a query-string value.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
