//! # Mode/Tenant Gate
//!
//! Pure precondition checks run before anything is scheduled: caller
//! credential, intent marker, mode selector and the environment's mode
//! policy. A rejection has no side effects. Tenant exclusivity is enforced
//! separately through [`TenantLeaseManager`].

pub mod lease;

pub use lease::{TenantLease, TenantLeaseManager};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AuthConfig, GateConfig};
use crate::constants::RunMode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    #[error("missing or invalid credential")]
    Unauthorized,

    #[error("intent marker '{header}' is missing or does not match")]
    MissingIntent { header: String },

    #[error("invalid mode selector '{0}'")]
    InvalidMode(String),

    #[error("mode {mode} is not permitted in environment '{environment}'")]
    ModeNotPermitted { mode: RunMode, environment: String },

    #[error("tenant '{0}' already has a diagnostics run in progress")]
    TenantBusy(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl GateRejection {
    /// Response status for this rejection
    pub fn http_status(&self) -> u16 {
        match self {
            GateRejection::Unauthorized => 401,
            GateRejection::MissingIntent { .. }
            | GateRejection::InvalidMode(_)
            | GateRejection::MalformedRequest(_) => 400,
            GateRejection::ModeNotPermitted { .. } => 403,
            GateRejection::TenantBusy(_) => 409,
        }
    }
}

/// Caller authorization, injected so hosts can plug in their own scheme
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: Option<&str>) -> bool;
}

/// Accepts any of a fixed set of bearer tokens
#[derive(Clone)]
pub struct StaticBearerVerifier {
    enabled: bool,
    tokens: Vec<String>,
}

impl StaticBearerVerifier {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            enabled: true,
            tokens,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            tokens: config.bearer_tokens.clone(),
        }
    }
}

impl CredentialVerifier for StaticBearerVerifier {
    fn verify(&self, credential: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        match credential {
            Some(presented) if !presented.is_empty() => {
                self.tokens.iter().any(|token| token == presented)
            }
            _ => false,
        }
    }
}

/// Everything the gate looks at
#[derive(Debug, Clone, Default)]
pub struct GateRequest<'a> {
    pub credential: Option<&'a str>,
    pub intent: Option<&'a str>,
    pub mode: Option<&'a str>,
}

pub struct ModeGate {
    config: GateConfig,
    environment: String,
    verifier: Arc<dyn CredentialVerifier>,
}

impl ModeGate {
    pub fn new(
        config: GateConfig,
        environment: impl Into<String>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            config,
            environment: environment.into(),
            verifier,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn intent_header(&self) -> &str {
        &self.config.intent_header
    }

    /// Admit the request and return the mode it may run in
    pub fn admit(&self, request: &GateRequest<'_>) -> Result<RunMode, GateRejection> {
        if !self.verifier.verify(request.credential) {
            warn!("Diagnostics run rejected: credential not accepted");
            return Err(GateRejection::Unauthorized);
        }

        if request.intent.map(str::trim) != Some(self.config.intent_value.as_str()) {
            return Err(GateRejection::MissingIntent {
                header: self.config.intent_header.clone(),
            });
        }

        let mode = match request.mode {
            None => RunMode::ReadOnly,
            Some(raw) => raw
                .parse::<RunMode>()
                .map_err(|_| GateRejection::InvalidMode(raw.to_string()))?,
        };

        if !self.config.permits(mode, &self.environment) {
            warn!(
                mode = %mode,
                environment = %self.environment,
                "Diagnostics run rejected: mode not permitted in environment"
            );
            return Err(GateRejection::ModeNotPermitted {
                mode,
                environment: self.environment.clone(),
            });
        }

        debug!(mode = %mode, environment = %self.environment, "Diagnostics run admitted");
        Ok(mode)
    }
}
