//! Peer-facing TCP accept loop.

use crate::auth::IdentityVerifier;
use crate::broker::Broker;
use crate::core::time::Clock;
use crate::net::connection;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Bind the peer listener and spawn the accept loop. Each accepted socket
/// gets its own connection task; the loop exits on the shutdown signal.
pub async fn spawn<C: Clock>(
    bind: &str,
    broker: Arc<Broker<C>>,
    verifier: Arc<dyn IdentityVerifier>,
    auth_deadline: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("unable to bind peer listener on {bind}"))?;
    let local_addr = listener.local_addr().context("peer listener local_addr")?;
    info!(addr = %local_addr, "peer listener started");

    let mut accept_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = accept_shutdown.changed() => {
                    if changed.is_err() || *accept_shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let broker = broker.clone();
                            let verifier = verifier.clone();
                            let conn_shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(err) = connection::serve(
                                    stream,
                                    peer,
                                    broker,
                                    verifier,
                                    auth_deadline,
                                    conn_shutdown,
                                )
                                .await
                                {
                                    warn!(peer = %peer, error = %err, "connection task failed");
                                }
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                        }
                    }
                }
            }
        }
        info!("peer listener stopped");
    });

    Ok((local_addr, handle))
}
