//! # Error Types
//!
//! Crate-level error handling. Unit failures are never returned through these
//! types: they are categorized into [`ExecutionResult`](crate::results::ExecutionResult)s
//! at the unit boundary. The errors here cover construction, configuration and
//! collaborator faults that prevent the engine itself from running.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Engine assembly error: {0}")]
    Assembly(String),
}

impl DiagnosticsError {
    pub fn assembly(message: impl Into<String>) -> Self {
        Self::Assembly(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DiagnosticsError>;

const MAX_MESSAGE_LEN: usize = 512;
const SENSITIVE_KEYS: [&str; 6] = [
    "password",
    "secret",
    "token",
    "key",
    "credential",
    "authorization",
];

/// Reduce an arbitrary failure text to something safe to place in a report.
///
/// Keeps only the first line, masks values of sensitive-looking `key=value`
/// pairs and caps the length.
pub fn sanitize_message(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or("").trim();

    let masked: Vec<String> = first_line
        .split_whitespace()
        .map(|token| match token.split_once('=') {
            Some((key, _)) if is_sensitive(key) => format!("{key}=[MASKED]"),
            _ => match token.split_once(':') {
                Some((key, value)) if is_sensitive(key) && !value.is_empty() => {
                    format!("{key}:[MASKED]")
                }
                _ => token.to_string(),
            },
        })
        .collect();
    let mut message = masked.join(" ");

    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|pattern| key.contains(pattern))
}
