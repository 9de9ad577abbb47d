// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command submission and the status poll loop.
//!
//! A submitted command is driven by [`PollLoop`], an explicit state machine:
//! every [`PollLoop::step`] performs one status call, records the observed
//! state on the local [`Command`], and either reports a terminal state, a
//! timeout, or sleeps (through the injected [`Clock`]) before the next step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::PollPolicy;
use crate::error::{Result, SessionError};
use crate::transport::Transport;
use crate::types::{Command, CommandResult, CommandState, ContextHandle, Language, ResultData};

/// What a single poll step concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Not finished; the loop already slept for `slept`.
    Pending { state: CommandState, slept: Duration },
    /// The command reached Finished, Error or Cancelled.
    Terminal,
    /// Deadline or poll cap reached without a terminal state.
    TimedOut { elapsed: Duration, polls: u32 },
}

/// Poll loop for one command.
pub struct PollLoop<'a> {
    clock: &'a dyn Clock,
    policy: &'a PollPolicy,
    started: Instant,
    polls: u32,
    delay: Duration,
}

impl<'a> PollLoop<'a> {
    /// Start the loop; `started` is the submission time the timeout is measured from.
    pub fn new(clock: &'a dyn Clock, policy: &'a PollPolicy, started: Instant) -> Self {
        Self {
            clock,
            policy,
            started,
            polls: 0,
            delay: policy.interval,
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }

    /// Perform one status call and advance the state machine.
    pub fn step(
        &mut self,
        transport: &dyn Transport,
        context: &ContextHandle,
        command: &mut Command,
    ) -> Result<PollStep> {
        let status = transport.poll_status(
            &context.cluster_id,
            &context.context_id,
            &command.command_id,
        )?;
        self.polls += 1;

        let observed = status.state.clone();
        if let CommandState::Unknown(raw) = &observed {
            warn!(
                command_id = %command.command_id,
                status = %raw,
                "Unrecognized command status, treating as still running"
            );
        }
        info!(
            command_id = %command.command_id,
            state = %observed,
            poll = self.polls,
            "Command is in {} state",
            observed
        );

        if !command.observe(status) {
            debug!(
                command_id = %command.command_id,
                current = %command.state,
                observed = %observed,
                "Ignoring backward status transition"
            );
        }

        if command.state.is_terminal() {
            info!(
                command_id = %command.command_id,
                state = %command.state,
                polls = self.polls,
                "Command completed"
            );
            return Ok(PollStep::Terminal);
        }

        let elapsed = self.elapsed();
        if elapsed >= self.policy.timeout || self.polls >= self.policy.max_polls {
            return Ok(PollStep::TimedOut {
                elapsed,
                polls: self.polls,
            });
        }

        let slept = self.delay.min(self.policy.timeout - elapsed);
        self.clock.sleep(slept);
        self.delay = self.policy.next_delay(self.delay);

        Ok(PollStep::Pending {
            state: command.state.clone(),
            slept,
        })
    }
}

/// Submits payloads into a context and waits for their results.
#[derive(Clone)]
pub struct CommandRunner {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl CommandRunner {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Submit `code` and poll until it finishes, fails, or `policy.timeout`
    /// passes. On timeout the remote command is left running.
    pub fn run(
        &self,
        context: &ContextHandle,
        language: Language,
        code: &str,
        policy: &PollPolicy,
    ) -> Result<CommandResult> {
        if code.trim().is_empty() {
            return Err(SessionError::Submission(
                "command is empty, nothing to execute".to_string(),
            ));
        }

        let started = self.clock.now();
        let command_id =
            self.transport
                .submit(&context.cluster_id, &context.context_id, language, code)?;
        info!(
            command_id = %command_id,
            context_id = %context.context_id,
            language = %language,
            "Command submitted"
        );

        let mut command = Command::submitted(command_id, &context.context_id, language, code);
        let mut poll = PollLoop::new(self.clock.as_ref(), policy, started);

        loop {
            match poll.step(self.transport.as_ref(), context, &mut command)? {
                PollStep::Pending { .. } => continue,
                PollStep::Terminal => break,
                PollStep::TimedOut { elapsed, polls } => {
                    warn!(
                        command_id = %command.command_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        polls,
                        "Command did not finish in time, leaving it running"
                    );
                    return Err(SessionError::ExecutionTimeout {
                        command_id: command.command_id,
                        elapsed,
                        polls,
                        last_state: Some(command.state),
                    });
                }
            }
        }

        into_result(command)
    }
}

/// Turn a terminal command into the caller-facing result.
fn into_result(command: Command) -> Result<CommandResult> {
    match (command.state, command.result) {
        (_, Some(ResultData::Error(payload))) => Err(SessionError::Execution {
            summary: payload.summary,
            trace: payload.trace,
        }),
        (CommandState::Finished, data) => Ok(CommandResult::ok(
            command.command_id,
            data.unwrap_or(ResultData::Empty),
        )),
        (CommandState::Cancelled, _) => Err(SessionError::Execution {
            summary: format!("command {} was cancelled", command.command_id),
            trace: String::new(),
        }),
        (state, data) => Err(SessionError::Execution {
            summary: format!(
                "command {} ended in state {} without an error payload",
                command.command_id, state
            ),
            trace: data
                .and_then(|d| serde_json::to_string(&d).ok())
                .unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::mock::{CommandScript, MockTransport};
    use crate::types::ContextState;

    fn setup(mock: &Arc<MockTransport>) -> ContextHandle {
        let context_id = mock
            .create_context("cluster-1", Language::Python, "test")
            .unwrap();
        ContextHandle {
            context_id,
            cluster_id: "cluster-1".to_string(),
            name: "test".to_string(),
            created_at: chrono::Utc::now(),
            state: ContextState::Running,
        }
    }

    #[test]
    fn test_backoff_sleeps_grow_until_capped() {
        let mock = Arc::new(MockTransport::new());
        let context = setup(&mock);
        mock.push_script(
            CommandScript::new()
                .then(CommandState::Queued)
                .then(CommandState::Running)
                .then(CommandState::Running)
                .then(CommandState::Running)
                .finish_text("ok"),
        );
        let clock = Arc::new(ManualClock::new());
        let runner = CommandRunner::new(mock.clone(), clock.clone());
        let policy = PollPolicy::default()
            .with_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(3))
            .with_backoff_multiplier(2.0);

        let result = runner
            .run(&context, Language::Python, "print('ok')", &policy)
            .unwrap();

        assert_eq!(result.text(), Some("ok"));
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn test_last_sleep_is_clamped_to_deadline() {
        let mock = Arc::new(MockTransport::new());
        let context = setup(&mock);
        mock.push_script(CommandScript::never_finishes());
        let clock = Arc::new(ManualClock::new());
        let runner = CommandRunner::new(mock.clone(), clock.clone());
        let policy = PollPolicy::default()
            .with_interval(Duration::from_secs(4))
            .with_backoff_multiplier(1.0)
            .with_timeout(Duration::from_secs(10));

        let err = runner
            .run(&context, Language::Python, "while True: pass", &policy)
            .unwrap_err();

        assert!(matches!(err, SessionError::ExecutionTimeout { polls: 4, .. }));
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(2),
            ]
        );
    }

    #[test]
    fn test_poll_cap_stops_zero_interval_loop() {
        let mock = Arc::new(MockTransport::new());
        let context = setup(&mock);
        mock.push_script(CommandScript::never_finishes());
        let clock = Arc::new(ManualClock::new());
        let runner = CommandRunner::new(mock.clone(), clock);
        let policy = PollPolicy::default()
            .with_interval(Duration::ZERO)
            .with_max_interval(Duration::ZERO)
            .with_max_polls(25);

        let err = runner
            .run(&context, Language::Python, "spin()", &policy)
            .unwrap_err();

        assert!(matches!(err, SessionError::ExecutionTimeout { polls: 25, .. }));
        assert_eq!(mock.poll_count(), 25);
    }

    #[test]
    fn test_empty_code_is_rejected_before_submission() {
        let mock = Arc::new(MockTransport::new());
        let context = setup(&mock);
        let runner = CommandRunner::new(mock.clone(), Arc::new(ManualClock::new()));

        let err = runner
            .run(&context, Language::Python, "   \n", &PollPolicy::default())
            .unwrap_err();

        assert!(matches!(err, SessionError::Submission(_)));
        assert_eq!(mock.submit_count(), 0);
    }

    #[test]
    fn test_cancelled_without_payload() {
        let mock = Arc::new(MockTransport::new());
        let context = setup(&mock);
        mock.push_script(
            CommandScript::new()
                .then(CommandState::Running)
                .then(CommandState::Cancelling)
                .then(CommandState::Cancelled),
        );
        let runner = CommandRunner::new(mock.clone(), Arc::new(ManualClock::new()));

        let err = runner
            .run(&context, Language::Python, "x", &PollPolicy::default())
            .unwrap_err();

        match err {
            SessionError::Execution { summary, .. } => assert!(summary.contains("cancelled")),
            other => panic!("expected execution error, got {:?}", other),
        }
    }
}
