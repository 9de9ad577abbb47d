// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use dbrxr_core::{BridgeMode, ClusterEndpoint, PollPolicy, SessionConfig};

/// dbrxr-ctl configuration
#[derive(Debug, Clone)]
pub struct CtlConfig {
    /// Workspace host, with or without scheme
    pub host: String,
    /// Personal access token
    pub token: String,
    /// Cluster that contexts are created on
    pub cluster_id: String,
    /// Initial delay between command status polls
    pub poll_interval: Option<Duration>,
    /// Deadline for a single command
    pub command_timeout: Option<Duration>,
    pub bridge_mode: BridgeMode,
    /// Log install command output at info level
    pub verbose_install: bool,
}

impl CtlConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DBRX_HOST`: workspace host, e.g. `adb-123.azuredatabricks.net`
    /// - `DBRX_API_TOKEN`: bearer token
    /// - `CLUSTER_ID`: target cluster
    ///
    /// Optional:
    /// - `DBRX_POLL_INTERVAL_MS`: initial poll interval (default: 1000)
    /// - `DBRX_COMMAND_TIMEOUT_SECS`: per-command deadline (default: 600)
    /// - `DBRX_BRIDGE_MODE`: `check`, `assume` or `disabled` (default: check)
    /// - `DBRX_VERBOSE_INSTALL`: `true` to log install output at info (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = required("DBRX_HOST")?;
        let token = required("DBRX_API_TOKEN")?;
        let cluster_id = required("CLUSTER_ID")?;

        let poll_interval = std::env::var("DBRX_POLL_INTERVAL_MS")
            .ok()
            .map(|v| {
                v.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                    ConfigError::Invalid("DBRX_POLL_INTERVAL_MS", "must be a number of milliseconds")
                })
            })
            .transpose()?;

        let command_timeout = std::env::var("DBRX_COMMAND_TIMEOUT_SECS")
            .ok()
            .map(|v| match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(ConfigError::Invalid(
                    "DBRX_COMMAND_TIMEOUT_SECS",
                    "must be a positive number of seconds",
                )),
            })
            .transpose()?;

        let bridge_mode = match std::env::var("DBRX_BRIDGE_MODE") {
            Ok(v) => v.parse().map_err(|_| {
                ConfigError::Invalid(
                    "DBRX_BRIDGE_MODE",
                    "must be one of: check, assume, disabled",
                )
            })?,
            Err(_) => BridgeMode::default(),
        };

        let verbose_install = match std::env::var("DBRX_VERBOSE_INSTALL") {
            Ok(v) => v.parse::<bool>().map_err(|_| {
                ConfigError::Invalid("DBRX_VERBOSE_INSTALL", "must be true or false")
            })?,
            Err(_) => false,
        };

        Ok(Self {
            host,
            token,
            cluster_id,
            poll_interval,
            command_timeout,
            bridge_mode,
            verbose_install,
        })
    }

    pub fn endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint::for_workspace(&self.host, &self.token, &self.cluster_id)
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut poll = PollPolicy::default();
        if let Some(interval) = self.poll_interval {
            poll = poll.with_interval(interval);
        }
        if let Some(timeout) = self.command_timeout {
            poll = poll.with_timeout(timeout);
        }
        SessionConfig::default()
            .with_poll_policy(poll)
            .with_bridge_mode(self.bridge_mode)
            .with_verbose_install(self.verbose_install)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
