//! Hub configuration.
//!
//! Settings come from, in increasing priority: built-in defaults, an optional
//! JSON file, `MSGHUB_*` environment variables and command-line flags (applied
//! by the binary).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use std::{fs, net::Ipv4Addr};

use crate::constants::{
    DEFAULT_PORT, MAX_LINE_LENGTH, OUTBOUND_QUEUE_CAPACITY, READ_TIMEOUT, SHUTDOWN_GRACE,
    WRITE_TIMEOUT,
};

/// Runtime settings for a [`Hub`](crate::Hub).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct HubConfig {
    /// Address to bind, `host:port`.
    pub listen_addr: String,
    /// Capacity of each session's outbound queue.
    pub queue_capacity: usize,
    /// Idle window for one line read, in seconds.
    pub read_timeout_secs: u64,
    /// Bound on writing one line to a client, in seconds.
    pub write_timeout_secs: u64,
    /// Time sessions get to leave on their own during shutdown, in seconds.
    pub shutdown_grace_secs: u64,
    /// Longest accepted input line in bytes.
    pub max_line_length: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("{}:{}", Ipv4Addr::UNSPECIFIED, DEFAULT_PORT),
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            read_timeout_secs: READ_TIMEOUT.as_secs(),
            write_timeout_secs: WRITE_TIMEOUT.as_secs(),
            shutdown_grace_secs: SHUTDOWN_GRACE.as_secs(),
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl HubConfig {
    /// Load configuration from `path` (if given) with environment overrides.
    ///
    /// Fields missing from the file keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply `MSGHUB_*` overrides looked up through `lookup`.
    ///
    /// Values that do not parse are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("MSGHUB_ADDR") {
            self.listen_addr = addr;
        }

        if let Some(capacity) = lookup("MSGHUB_QUEUE_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                self.queue_capacity = capacity;
            }
        }

        if let Some(timeout) = lookup("MSGHUB_READ_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.read_timeout_secs = secs;
            }
        }

        if let Some(timeout) = lookup("MSGHUB_WRITE_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.write_timeout_secs = secs;
            }
        }

        if let Some(grace) = lookup("MSGHUB_SHUTDOWN_GRACE") {
            if let Ok(secs) = grace.parse::<u64>() {
                self.shutdown_grace_secs = secs;
            }
        }

        if let Some(max) = lookup("MSGHUB_MAX_LINE_LENGTH") {
            if let Ok(max) = max.parse::<usize>() {
                self.max_line_length = max;
            }
        }
    }

    /// Reject settings the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            anyhow::bail!("listen_addr must not be empty");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            anyhow::bail!("read and write timeouts must be at least 1 second");
        }
        if self.max_line_length == 0 {
            anyhow::bail!("max_line_length must be at least 1");
        }
        Ok(())
    }

    /// Idle window for one line read.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Bound on writing one line.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
