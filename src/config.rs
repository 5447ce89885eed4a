//! Command line and environment configuration for the replay binary.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable holding the notification queue capacity.
pub const NOTIFY_QUEUE_VAR: &str = "BANK_LEDGER_NOTIFY_QUEUE";

const DEFAULT_NOTIFY_QUEUE: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("usage: bank-ledger <commands.csv>")]
    MissingInput,

    #[error("BANK_LEDGER_NOTIFY_QUEUE must be a positive integer, got '{0}'")]
    InvalidQueueSize(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Command script to replay.
    pub input: PathBuf,
    /// Emails that may wait for delivery before new ones are dropped.
    pub notify_queue: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_parts(env::args().skip(1), env::var(NOTIFY_QUEUE_VAR).ok())
    }

    /// Build a config from program arguments (without the binary name) and the
    /// raw value of [`NOTIFY_QUEUE_VAR`].
    pub fn from_parts(
        mut args: impl Iterator<Item = String>,
        notify_queue: Option<String>,
    ) -> Result<Self, ConfigError> {
        let input = args.next().map(PathBuf::from).ok_or(ConfigError::MissingInput)?;

        let notify_queue = match notify_queue {
            None => DEFAULT_NOTIFY_QUEUE,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidQueueSize(raw)),
            },
        };

        Ok(Self {
            input,
            notify_queue,
        })
    }
}
