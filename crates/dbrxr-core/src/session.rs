// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session facade tying contexts, commands and package bootstrap together.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::bootstrap::{Bootstrapper, PackageName, guest_wrapper};
use crate::clock::{Clock, SystemClock};
use crate::command::CommandRunner;
use crate::config::{ClusterEndpoint, PollPolicy, SessionConfig};
use crate::context::ContextManager;
use crate::error::{Result, SessionError};
use crate::transport::{HttpTransport, Transport};
use crate::types::{CommandResult, ContextHandle, InstallOutcome, Language, Runtime};

/// Language every execution context is created for. Guest-language code is
/// evaluated inside it through the interpreter bridge.
const HOST_LANGUAGE: Language = Language::Python;

/// One client's view of a remote cluster: at most one live execution
/// context, and one command in flight at a time.
///
/// Dropping a session does not destroy its context; call
/// [`destroy_context`](Self::destroy_context) when done.
pub struct Session {
    endpoint: ClusterEndpoint,
    config: SessionConfig,
    contexts: ContextManager,
    runner: CommandRunner,
    bootstrap: Bootstrapper,
}

impl Session {
    /// Session talking HTTP to `endpoint` on the system clock.
    pub fn connect(endpoint: ClusterEndpoint, config: SessionConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(&endpoint));
        Self::with_transport(endpoint, transport, Arc::new(SystemClock), config)
    }

    /// Session over an explicit transport and clock.
    pub fn with_transport(
        endpoint: ClusterEndpoint,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let contexts = ContextManager::new(
            transport.clone(),
            clock.clone(),
            HOST_LANGUAGE,
            config.context_start_timeout,
        );
        let runner = CommandRunner::new(transport, clock);
        let bootstrap = Bootstrapper::new(runner.clone(), &config);

        Self {
            endpoint,
            config,
            contexts,
            runner,
            bootstrap,
        }
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The live context, if any.
    pub fn context(&self) -> Option<&ContextHandle> {
        self.contexts.current()
    }

    /// Point the session at another cluster on the same workspace.
    ///
    /// Only affects contexts created afterwards.
    pub fn set_cluster_id(&mut self, cluster_id: impl Into<String>) {
        self.endpoint.set_cluster_id(cluster_id);
    }

    /// Create the execution context and wait until it is running.
    #[instrument(skip(self), fields(cluster_id = %self.endpoint.cluster_id()))]
    pub fn create_context(&mut self, name: &str) -> Result<ContextHandle> {
        let handle = self.contexts.create(self.endpoint.cluster_id(), name)?;
        self.bootstrap.reset();
        Ok(handle)
    }

    /// Destroy the execution context. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub fn destroy_context(&mut self) -> Result<()> {
        self.contexts.destroy()
    }

    /// Execute `code` with the configured poll policy.
    pub fn execute(&mut self, language: Language, code: &str) -> Result<CommandResult> {
        let policy = self.config.poll.clone();
        self.run(language, code, &policy)
    }

    /// Execute `code` with an explicit deadline and initial poll interval.
    pub fn execute_with(
        &mut self,
        language: Language,
        code: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<CommandResult> {
        let policy = self
            .config
            .poll
            .clone()
            .with_timeout(timeout)
            .with_interval(poll_interval);
        self.run(language, code, &policy)
    }

    #[instrument(skip(self, code, policy))]
    fn run(
        &mut self,
        language: Language,
        code: &str,
        policy: &PollPolicy,
    ) -> Result<CommandResult> {
        let context = self.contexts.require_live()?.clone();
        if code.trim().is_empty() {
            return Err(SessionError::Submission(
                "command is empty, nothing to execute".to_string(),
            ));
        }
        self.bootstrap.ensure_bridge(&context)?;

        match language {
            Language::R => {
                if !self.bootstrap.guest_available() {
                    return Err(SessionError::BridgeUnavailable);
                }
                self.runner
                    .run(&context, HOST_LANGUAGE, &guest_wrapper(code), policy)
            }
            other => self.runner.run(&context, other, code, policy),
        }
    }

    /// Install `name` into `runtime`, unless it is already there.
    #[instrument(skip(self))]
    pub fn install_package(&mut self, runtime: Runtime, name: &str) -> Result<InstallOutcome> {
        let package = PackageName::parse(runtime, name)?;
        let context = self.contexts.require_live()?.clone();
        self.bootstrap.ensure_bridge(&context)?;

        let outcome = self.bootstrap.install(&context, &package)?;
        info!(package = %package, outcome = ?outcome, "Package ready");
        Ok(outcome)
    }

    /// Whether `name` is available in `runtime` in the live context.
    #[instrument(skip(self))]
    pub fn is_package_installed(&mut self, runtime: Runtime, name: &str) -> Result<bool> {
        let package = PackageName::parse(runtime, name)?;
        let context = self.contexts.require_live()?.clone();
        self.bootstrap.ensure_bridge(&context)?;
        self.bootstrap.is_installed(&context, &package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BridgeMode;
    use crate::transport::mock::{CommandScript, MockCall, MockTransport};

    fn session(mock: &Arc<MockTransport>, mode: BridgeMode) -> Session {
        Session::with_transport(
            ClusterEndpoint::new("https://example.test/api/1.2", "token", "cluster-1"),
            mock.clone(),
            Arc::new(ManualClock::new()),
            SessionConfig::default().with_bridge_mode(mode),
        )
    }

    #[test]
    fn test_bridge_checked_once_per_context() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock, BridgeMode::Check);
        session.create_context("ctx1").unwrap();

        mock.push_script(CommandScript::text("Success"));
        mock.push_script(CommandScript::text("first"));
        mock.push_script(CommandScript::text("second"));
        session.execute(Language::Python, "print('first')").unwrap();
        session.execute(Language::Python, "print('second')").unwrap();

        let code = mock.submitted_code();
        assert_eq!(code.len(), 3);
        assert!(code[0].contains("find_spec(\"rpy2\")"));
    }

    #[test]
    fn test_create_rearms_bridge_check() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock, BridgeMode::Check);

        for _ in 0..2 {
            session.create_context("ctx").unwrap();
            mock.push_script(CommandScript::text("Success"));
            mock.push_script(CommandScript::text("ok"));
            session.execute(Language::Python, "print('ok')").unwrap();
            session.destroy_context().unwrap();
        }

        let probes = mock
            .submitted_code()
            .iter()
            .filter(|code| code.contains("find_spec"))
            .count();
        assert_eq!(probes, 2);
    }

    #[test]
    fn test_disabled_bridge_rejects_guest_code() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock, BridgeMode::Disabled);
        session.create_context("ctx").unwrap();

        let err = session.execute(Language::R, "1 + 1").unwrap_err();

        assert!(matches!(err, SessionError::BridgeUnavailable));
        assert_eq!(mock.submit_count(), 0);
    }

    #[test]
    fn test_guest_code_is_submitted_as_host_language() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock, BridgeMode::Assume);
        session.create_context("ctx").unwrap();
        mock.push_script(CommandScript::text("[1] 2"));

        session.execute(Language::R, "1 + 1").unwrap();

        let submit = mock
            .calls()
            .into_iter()
            .find(|call| matches!(call, MockCall::Submit { .. }));
        match submit {
            Some(MockCall::Submit { language, code, .. }) => {
                assert_eq!(language, Language::Python);
                assert!(code.contains("robjects.r(\"1 + 1\")"));
            }
            other => panic!("expected a submission, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_package_name_submits_nothing() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock, BridgeMode::Check);
        session.create_context("ctx").unwrap();

        let err = session
            .install_package(Runtime::Host, "numpy; rm -rf /")
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidPackageName { .. }));
        assert_eq!(mock.submit_count(), 0);
    }

    #[test]
    fn test_set_cluster_id_targets_next_context() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock, BridgeMode::Assume);
        session.set_cluster_id("cluster-2");

        let handle = session.create_context("ctx").unwrap();

        assert_eq!(handle.cluster_id, "cluster-2");
        assert_eq!(session.endpoint().cluster_id(), "cluster-2");
    }
}
