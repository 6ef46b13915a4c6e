//! # System Constants
//!
//! Core enums that define the operational boundaries of a diagnostics run:
//! run modes, probe layers, unit outcomes, the failure taxonomy and the
//! aggregate run status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header names used by the HTTP surface and by replayed pipeline requests
pub mod headers {
    pub const TENANT_ID: &str = "x-tenant-id";
    pub const CORRELATION_ID: &str = "x-correlation-id";
    pub const DIAGNOSTICS_RUN_ID: &str = "x-diagnostics-run-id";
    pub const AUTHORIZATION: &str = "authorization";
}

/// Requested depth of a run. Ordered from least to most invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RunMode {
    ReadOnly,
    SafeWrite,
    Full,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::ReadOnly => "ReadOnly",
            RunMode::SafeWrite => "SafeWrite",
            RunMode::Full => "Full",
        }
    }

    /// Whether units of `layer` may execute at all under this mode.
    ///
    /// `ReadOnly` never reaches L2, regardless of what a definition declares.
    pub fn permits_layer(&self, layer: Layer) -> bool {
        match layer {
            Layer::L0 | Layer::L1 => true,
            Layer::L2 => *self >= RunMode::SafeWrite,
        }
    }

    /// Whether destructive definitions may execute under this mode
    pub fn permits_destructive(&self) -> bool {
        *self == RunMode::Full
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "readonly" => Ok(RunMode::ReadOnly),
            "safewrite" => Ok(RunMode::SafeWrite),
            "full" => Ok(RunMode::Full),
            _ => Err(format!("unknown run mode '{s}'")),
        }
    }
}

/// Probe depth: L0 dependencies, L1 single requests, L2 workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    L0,
    L1,
    L2,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::L0 => "L0",
            Layer::L1 => "L1",
            Layer::L2 => "L2",
        };
        f.write_str(s)
    }
}

/// Outcome of one executed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Fail,
    Timeout,
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Failure taxonomy attached to results and aggregated on the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    Auth,
    Routing,
    ModelBinding,
    Validation,
    Serialization,
    Dependency,
    Timeout,
    UnhandledException,
    ContractMismatch,
    ConfigurationMissing,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Aggregate verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pass,
    Partial,
    Fail,
}

impl RunStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, RunStatus::Pass)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pass => "PASS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Fail => "FAIL",
        };
        f.write_str(s)
    }
}
