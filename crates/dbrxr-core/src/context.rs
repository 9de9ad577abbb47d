// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution context lifecycle.
//!
//! A [`ContextManager`] owns at most one live context. Creating a second one
//! requires destroying the first; destroying is idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, SessionError};
use crate::transport::Transport;
use crate::types::{ContextHandle, ContextState, Language};

/// Delay between context status checks while a context starts up.
const CONTEXT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ContextManager {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    language: Language,
    start_timeout: Duration,
    current: Option<ContextHandle>,
}

impl ContextManager {
    /// Manage contexts created for `language` (the host runtime).
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        language: Language,
        start_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            language,
            start_timeout,
            current: None,
        }
    }

    /// The live context, if any.
    pub fn current(&self) -> Option<&ContextHandle> {
        self.current.as_ref()
    }

    /// The live context, or a submission error if there is none.
    pub fn require_live(&self) -> Result<&ContextHandle> {
        self.current().ok_or_else(|| {
            SessionError::Submission(
                "no live execution context, call create_context first".to_string(),
            )
        })
    }

    /// Create a context named `name` on `cluster_id` and wait until it runs.
    pub fn create(&mut self, cluster_id: &str, name: &str) -> Result<ContextHandle> {
        if let Some(existing) = self.current() {
            return Err(SessionError::ContextCreation(format!(
                "context {} already exists, destroy it before creating a new one",
                existing.context_id
            )));
        }

        info!(
            cluster_id = %cluster_id,
            name = %name,
            language = %self.language,
            "Creating execution context"
        );

        let context_id = self
            .transport
            .create_context(cluster_id, self.language, name)
            .map_err(|e| SessionError::ContextCreation(e.to_string()))?;

        let mut handle = ContextHandle {
            context_id,
            cluster_id: cluster_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            state: ContextState::Pending,
        };
        // Owned from here on, so a failed start can still be destroyed.
        self.current = Some(handle.clone());

        match self.wait_until_running(&handle) {
            Ok(()) => {
                handle.state = ContextState::Running;
                self.current = Some(handle.clone());
                info!(context_id = %handle.context_id, "Execution context created");
                Ok(handle)
            }
            Err(error) => {
                warn!(
                    context_id = %handle.context_id,
                    error = %error,
                    "Execution context failed to start, destroying it"
                );
                if let Err(destroy_error) = self.destroy() {
                    warn!(error = %destroy_error, "Cleanup of failed context also failed");
                }
                Err(error)
            }
        }
    }

    fn wait_until_running(&self, handle: &ContextHandle) -> Result<()> {
        let started = self.clock.now();
        loop {
            let status = self
                .transport
                .context_status(&handle.cluster_id, &handle.context_id)
                .map_err(|e| SessionError::ContextCreation(e.to_string()))?;

            debug!(context_id = %handle.context_id, state = ?status.state, "Context status");
            match status.state {
                ContextState::Running => return Ok(()),
                ContextState::Error => {
                    return Err(SessionError::ContextCreation(format!(
                        "context {} entered the Error state while starting",
                        handle.context_id
                    )));
                }
                ContextState::Unknown(raw) => {
                    warn!(status = %raw, "Unrecognized context status, waiting");
                }
                _ => {}
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= self.start_timeout {
                return Err(SessionError::ContextCreation(format!(
                    "context {} was not running after {}s",
                    handle.context_id,
                    elapsed.as_secs()
                )));
            }
            self.clock
                .sleep(CONTEXT_POLL_INTERVAL.min(self.start_timeout - elapsed));
        }
    }

    /// Destroy the live context. A no-op when there is none.
    ///
    /// Local state is cleared before the remote call returns, so a second
    /// call never reaches the remote service. A remote "context not found"
    /// is treated as success; other remote failures are returned.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(handle) = self.current.take() else {
            info!("No execution context to destroy");
            return Ok(());
        };

        info!(context_id = %handle.context_id, "Destroying execution context");
        let result = self
            .transport
            .destroy_context(&handle.cluster_id, &handle.context_id);

        match result {
            Ok(()) => {
                info!(context_id = %handle.context_id, "Execution context destroyed");
                Ok(())
            }
            Err(error) if error.is_context_gone() => {
                warn!(
                    context_id = %handle.context_id,
                    error = %error,
                    "Execution context was already gone on the remote side"
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    context_id = %handle.context_id,
                    error = %error,
                    "Remote destroy failed; local context state cleared"
                );
                Err(error.into())
            }
        }
    }
}
