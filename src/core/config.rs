use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const LISTENER_BIND_DEFAULT: &str = "127.0.0.1:9400";
const ADMIN_BIND_DEFAULT: &str = "127.0.0.1:9401";

fn default_listener_bind() -> String {
    LISTENER_BIND_DEFAULT.to_string()
}

fn default_admin_bind() -> String {
    ADMIN_BIND_DEFAULT.to_string()
}

fn default_probe_interval_secs() -> u64 {
    30
}

fn default_auth_deadline_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Port 0 binds never collide; the OS assigns distinct ports.
fn is_ephemeral(bind: &str) -> bool {
    bind.ends_with(":0")
}

/// Top-level configuration for the trackcast runtime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Peer-facing TCP listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listener_bind")]
    pub bind: String,
    /// Connections that have not authenticated within this window are closed.
    #[serde(default = "default_auth_deadline_secs")]
    pub auth_deadline_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: default_listener_bind(),
            auth_deadline_secs: default_auth_deadline_secs(),
        }
    }
}

/// Admin/ops HTTP endpoint (health, metrics, notify ingress).
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_bind")]
    pub bind: String,
    /// Disable the endpoint entirely (peer listener still runs).
    #[serde(default)]
    pub disabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind: default_admin_bind(),
            disabled: false,
        }
    }
}

/// Liveness sweep cadence. Sessions missing a probe ack for two consecutive
/// sweeps are evicted.
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

/// Credential verification posture.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Shared tokens per role, consulted in `static` mode.
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default)]
    pub courier_token: Option<String>,
    #[serde(default)]
    pub client_token: Option<String>,
}

/// `permissive` accepts any non-empty token (single-node/dev posture);
/// `static` checks the per-role shared tokens.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Permissive,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON-formatted log lines instead of the human format.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from a path resolved via TRACKCAST_CONFIG or
    /// defaults to `config/trackcast.toml`. Missing file yields defaults.
    pub fn load_from_env() -> Result<Self> {
        let path =
            std::env::var("TRACKCAST_CONFIG").unwrap_or_else(|_| "config/trackcast.toml".into());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Load configuration from a specific TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        let cfg: Config = toml::from_str(&data)
            .with_context(|| format!("invalid TOML config {}", path_ref.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listener.bind.is_empty() {
            bail!("listener.bind must be non-empty");
        }
        if self.listener.auth_deadline_secs == 0 {
            bail!("listener.auth_deadline_secs must be > 0");
        }
        if self.liveness.probe_interval_secs == 0 {
            bail!("liveness.probe_interval_secs must be > 0");
        }
        if !self.admin.disabled
            && !is_ephemeral(&self.listener.bind)
            && self.admin.bind == self.listener.bind
        {
            bail!("admin.bind must differ from listener.bind");
        }
        if self.auth.mode == AuthMode::Static
            && self.auth.admin_token.is_none()
            && self.auth.courier_token.is_none()
            && self.auth.client_token.is_none()
        {
            bail!("auth.mode = static requires at least one role token");
        }
        Ok(())
    }
}
