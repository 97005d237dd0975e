//! Identity verification seam for the authentication handshake.
//!
//! The broker never stores credentials; it hands the inbound claim to an
//! `IdentityVerifier`. The bundled `StaticTokenVerifier` covers single-node
//! and dev deployments with per-role shared tokens; production plugs the
//! real identity service in behind the same trait.

use crate::core::config::{AuthConfig, AuthMode};
use crate::protocol::Role;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential token is empty")]
    EmptyToken,
    #[error("identity is empty")]
    EmptyIdentity,
    #[error("credential rejected for role {0}")]
    InvalidCredential(&'static str),
    #[error("no credential configured for role {0}")]
    RoleNotConfigured(&'static str),
}

/// Validates an `{identity, role, credential_token}` claim before admission.
pub trait IdentityVerifier: Send + Sync + 'static {
    fn verify(&self, identity: &str, token: &str, role: Role) -> Result<(), AuthError>;
}

/// Shared-token verifier driven by `[auth]` configuration.
///
/// In permissive mode any non-empty identity and token pass. In static mode
/// the token must match the configured token for the claimed role.
pub struct StaticTokenVerifier {
    mode: AuthMode,
    admin_token: Option<String>,
    courier_token: Option<String>,
    client_token: Option<String>,
}

impl StaticTokenVerifier {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self {
            mode: cfg.mode,
            admin_token: cfg.admin_token.clone(),
            courier_token: cfg.courier_token.clone(),
            client_token: cfg.client_token.clone(),
        }
    }

    pub fn shared(cfg: &AuthConfig) -> Arc<dyn IdentityVerifier> {
        Arc::new(Self::from_config(cfg))
    }

    fn token_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Admin => self.admin_token.as_deref(),
            Role::Courier => self.courier_token.as_deref(),
            Role::Client => self.client_token.as_deref(),
        }
    }
}

impl IdentityVerifier for StaticTokenVerifier {
    fn verify(&self, identity: &str, token: &str, role: Role) -> Result<(), AuthError> {
        if identity.is_empty() {
            return Err(AuthError::EmptyIdentity);
        }
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        match self.mode {
            AuthMode::Permissive => Ok(()),
            AuthMode::Static => match self.token_for(role) {
                Some(expected) if expected == token => Ok(()),
                Some(_) => Err(AuthError::InvalidCredential(role.as_str())),
                None => Err(AuthError::RoleNotConfigured(role.as_str())),
            },
        }
    }
}
