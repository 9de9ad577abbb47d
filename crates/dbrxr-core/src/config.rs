// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Endpoint and session configuration.
//!
//! Nothing here reads the process environment; the CLI layer collects
//! values and passes them in.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::wire::API_VERSION;

/// Where and as whom to talk to the remote execution service.
#[derive(Clone)]
pub struct ClusterEndpoint {
    api_base_url: String,
    auth_token: String,
    cluster_id: String,
}

impl ClusterEndpoint {
    /// Create an endpoint from a full API base URL (e.g. `https://host/api/1.2`).
    pub fn new(
        api_base_url: impl Into<String>,
        auth_token: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        let api_base_url: String = api_base_url.into();
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Create an endpoint from a workspace host, appending `/api/1.2`.
    pub fn for_workspace(
        host: &str,
        auth_token: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Self::new(
            format!("{}/api/{}", host, API_VERSION),
            auth_token,
            cluster_id,
        )
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Point at a different cluster on the same workspace.
    ///
    /// Only affects contexts created afterwards.
    pub fn set_cluster_id(&mut self, cluster_id: impl Into<String>) {
        self.cluster_id = cluster_id.into();
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.set_cluster_id(cluster_id);
        self
    }
}

impl fmt::Debug for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterEndpoint")
            .field("api_base_url", &self.api_base_url)
            .field("auth_token", &"<redacted>")
            .field("cluster_id", &self.cluster_id)
            .finish()
    }
}

/// How the poll loop paces itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second poll.
    pub interval: Duration,
    /// Upper bound for the backoff delay.
    pub max_interval: Duration,
    /// Factor applied to the delay after every poll.
    pub backoff_multiplier: f64,
    /// Wall-clock budget measured from submission.
    pub timeout: Duration,
    /// Hard cap on status calls, independent of the timeout.
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            timeout: Duration::from_secs(10 * 60),
            max_polls: 10_000,
        }
    }
}

impl PollPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        if self.max_interval < interval {
            self.max_interval = interval;
        }
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Delay that follows `current`.
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// What to do about the interpreter bridge package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeMode {
    /// Verify once per context and install it when absent.
    #[default]
    Check,
    /// Trust that it is present; never check.
    Assume,
    /// Never check; guest-language code is rejected.
    Disabled,
}

impl FromStr for BridgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "check" => Ok(BridgeMode::Check),
            "assume" | "yes" => Ok(BridgeMode::Assume),
            "disabled" | "no" => Ok(BridgeMode::Disabled),
            other => Err(format!(
                "invalid bridge mode '{}', expected one of: check, assume, disabled",
                other
            )),
        }
    }
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Polling for regular commands.
    pub poll: PollPolicy,
    /// Deadline for install commands, which run far longer than scoring code.
    pub install_timeout: Duration,
    /// How long a freshly created context may stay Pending.
    pub context_start_timeout: Duration,
    pub bridge: BridgeMode,
    /// Host package that lets the host runtime evaluate guest code.
    pub bridge_package: String,
    /// CRAN mirror used for guest-runtime installs.
    pub cran_repo: String,
    /// Log install command output at info instead of debug.
    pub verbose_install: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            install_timeout: Duration::from_secs(30 * 60),
            context_start_timeout: Duration::from_secs(5 * 60),
            bridge: BridgeMode::Check,
            bridge_package: "rpy2".to_string(),
            cran_repo: "http://cran.rstudio.com/".to_string(),
            verbose_install: false,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn with_context_start_timeout(mut self, timeout: Duration) -> Self {
        self.context_start_timeout = timeout;
        self
    }

    pub fn with_bridge_mode(mut self, mode: BridgeMode) -> Self {
        self.bridge = mode;
        self
    }

    pub fn with_bridge_package(mut self, package: impl Into<String>) -> Self {
        self.bridge_package = package.into();
        self
    }

    pub fn with_cran_repo(mut self, repo: impl Into<String>) -> Self {
        self.cran_repo = repo.into();
        self
    }

    pub fn with_verbose_install(mut self, verbose: bool) -> Self {
        self.verbose_install = verbose;
        self
    }
}
