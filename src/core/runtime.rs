use crate::auth::{IdentityVerifier, StaticTokenVerifier};
use crate::broker::{liveness, Broker};
use crate::core::config::Config;
use crate::core::time::Clock;
use crate::net::listener;
use crate::ops::telemetry::{self, LogHandle};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runtime orchestration: wires the broker, the peer listener, the liveness
/// monitor, and the admin endpoint together behind one shutdown signal.
pub struct Runtime<C: Clock> {
    config: Config,
    clock: C,
    broker: Arc<Broker<C>>,
    verifier: Arc<dyn IdentityVerifier>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    log_handle: Option<LogHandle>,
    peer_addr: Option<SocketAddr>,
    admin_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: Clock> Runtime<C> {
    pub fn new(config: Config, clock: C, log_handle: Option<LogHandle>) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let broker = Arc::new(Broker::new(clock.clone()));
        let verifier = StaticTokenVerifier::shared(&config.auth);
        Ok(Self {
            config,
            clock,
            broker,
            verifier,
            shutdown_tx,
            shutdown_rx,
            log_handle,
            peer_addr: None,
            admin_addr: None,
            tasks: Vec::new(),
        })
    }

    /// Start all components and block until a shutdown signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        self.start_components().await?;
        self.handle_shutdown().await
    }

    async fn start_components(&mut self) -> Result<()> {
        let (peer_addr, accept_task) = listener::spawn(
            &self.config.listener.bind,
            self.broker.clone(),
            self.verifier.clone(),
            Duration::from_secs(self.config.listener.auth_deadline_secs),
            self.shutdown_rx.clone(),
        )
        .await?;
        self.peer_addr = Some(peer_addr);
        self.tasks.push(accept_task);

        let interval = Duration::from_secs(self.config.liveness.probe_interval_secs);
        self.tasks.push(liveness::spawn_monitor(
            self.broker.clone(),
            self.clock.clone(),
            interval,
            self.shutdown_rx.clone(),
        ));

        if !self.config.admin.disabled {
            let addr = telemetry::start_http(
                &self.config.admin.bind,
                self.broker.clone(),
                self.log_handle.clone(),
            )
            .await?;
            self.admin_addr = Some(addr);
        }
        Ok(())
    }

    async fn handle_shutdown(&mut self) -> Result<()> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received");
            }
            _ = self.shutdown_rx.changed() => {
                tracing::info!("shutdown requested by component");
            }
        }
        self.shutdown_tx
            .send(true)
            .context("failed to broadcast shutdown")?;
        self.drain().await
    }

    async fn drain(&mut self) -> Result<()> {
        tracing::info!("draining runtime components");
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!("component shutdown failed: {err:?}");
            }
        }
        Ok(())
    }

    pub fn broker(&self) -> Arc<Broker<C>> {
        self.broker.clone()
    }

    pub fn clock(&self) -> C {
        self.clock.clone()
    }

    /// Actual peer listener address, available once started. Useful with an
    /// ephemeral bind port.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Test helper to start all components without waiting for SIGINT.
    pub async fn start_for_tests(&mut self) -> Result<()> {
        self.start_components().await
    }

    /// Test helper to stop background tasks.
    pub async fn shutdown_for_tests(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        Ok(())
    }
}
