// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock transport for testing.
//!
//! Simulates the remote execution service in memory: contexts, command ids,
//! and per-command status sequences. Every call is recorded so tests can
//! assert on what was sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Transport, TransportResult};
use crate::error::TransportError;
use crate::types::{
    CommandState, CommandStatus, ContextState, ContextStatus, ErrorPayload, Language, ResultData,
};

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateContext {
        cluster_id: String,
        language: Language,
        name: String,
    },
    ContextStatus {
        context_id: String,
    },
    DestroyContext {
        context_id: String,
    },
    Submit {
        context_id: String,
        language: Language,
        code: String,
    },
    PollStatus {
        command_id: String,
    },
}

/// Operation selector for injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    CreateContext,
    ContextStatus,
    DestroyContext,
    Submit,
    PollStatus,
}

/// Status sequence a submitted command walks through, one step per poll.
///
/// The last step repeats once the sequence is exhausted.
#[derive(Debug, Clone)]
pub struct CommandScript {
    steps: VecDeque<(CommandState, Option<ResultData>)>,
}

impl Default for CommandScript {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandScript {
    /// Empty script; finishes with no output unless steps are added.
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
        }
    }

    /// Add a non-terminal (or bare terminal) step.
    pub fn then(mut self, state: CommandState) -> Self {
        self.steps.push_back((state, None));
        self
    }

    /// Finish with the given payload.
    pub fn finish(mut self, data: ResultData) -> Self {
        self.steps.push_back((CommandState::Finished, Some(data)));
        self
    }

    /// Finish with text output.
    pub fn finish_text(self, text: impl Into<String>) -> Self {
        self.finish(ResultData::Text { text: text.into() })
    }

    /// Finish with an error result, the way the service reports exceptions
    /// raised by user code.
    pub fn finish_error(self, summary: impl Into<String>, trace: impl Into<String>) -> Self {
        self.finish(ResultData::Error(ErrorPayload {
            summary: summary.into(),
            trace: trace.into(),
        }))
    }

    /// End in the `Error` state with an error payload.
    pub fn fail(mut self, summary: impl Into<String>, trace: impl Into<String>) -> Self {
        self.steps.push_back((
            CommandState::Error,
            Some(ResultData::Error(ErrorPayload {
                summary: summary.into(),
                trace: trace.into(),
            })),
        ));
        self
    }

    /// Immediately finished with text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().finish_text(text)
    }

    /// A command that stays Running forever.
    pub fn never_finishes() -> Self {
        Self::new().then(CommandState::Running)
    }

    fn next_step(&mut self) -> (CommandState, Option<ResultData>) {
        if self.steps.len() > 1 {
            if let Some(step) = self.steps.pop_front() {
                return step;
            }
        }
        self.steps
            .front()
            .cloned()
            .unwrap_or((CommandState::Finished, Some(ResultData::Empty)))
    }
}

/// Produces a script for a submission the test did not queue one for.
pub type Responder = Arc<dyn Fn(Language, &str) -> CommandScript + Send + Sync>;

#[derive(Default)]
struct MockState {
    next_id: u64,
    cluster_running: bool,
    contexts: HashMap<String, ContextState>,
    context_starts: VecDeque<ContextState>,
    scripts: VecDeque<CommandScript>,
    commands: HashMap<String, CommandScript>,
    failures: VecDeque<(MockOp, TransportError)>,
    calls: Vec<MockCall>,
}

/// In-memory stand-in for the remote execution service.
pub struct MockTransport {
    state: Mutex<MockState>,
    responder: Option<Responder>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock with a running cluster. Unscripted commands finish
    /// immediately with no output.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                cluster_running: true,
                ..MockState::default()
            }),
            responder: None,
        }
    }

    /// Use `responder` for submissions that have no queued script.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(Language, &str) -> CommandScript + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue the script for the next submission.
    pub fn push_script(&self, script: CommandScript) {
        self.lock().scripts.push_back(script);
    }

    /// Queue states returned by successive context status calls.
    /// Once exhausted, contexts report Running.
    pub fn push_context_states(&self, states: impl IntoIterator<Item = ContextState>) {
        self.lock().context_starts.extend(states);
    }

    /// Make context creation fail as it does on a terminated cluster.
    pub fn set_cluster_running(&self, running: bool) {
        self.lock().cluster_running = running;
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: MockOp, error: TransportError) {
        self.lock().failures.push_back((op, error));
    }

    /// Drop a context on the "server" side, as a cluster restart would.
    pub fn forget_context(&self, context_id: &str) {
        self.lock().contexts.remove(context_id);
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Source text of every submission, in order.
    pub fn submitted_code(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Submit { code, .. } => Some(code.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of submissions so far.
    pub fn submit_count(&self) -> usize {
        self.submitted_code().len()
    }

    /// Number of status polls so far.
    pub fn poll_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, MockCall::PollStatus { .. }))
            .count()
    }

    /// Ids of contexts the mock still considers alive.
    pub fn live_contexts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().contexts.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn take_failure(state: &mut MockState, op: MockOp) -> Option<TransportError> {
        let position = state.failures.iter().position(|(o, _)| *o == op)?;
        state.failures.remove(position).map(|(_, error)| error)
    }

    fn context_missing(context_id: &str) -> TransportError {
        TransportError::Status {
            status: 404,
            body: format!(
                "{{\"error\":\"ContextNotFound: context {} not found\"}}",
                context_id
            ),
        }
    }
}

impl Transport for MockTransport {
    fn create_context(
        &self,
        cluster_id: &str,
        language: Language,
        name: &str,
    ) -> TransportResult<String> {
        let mut state = self.lock();
        state.calls.push(MockCall::CreateContext {
            cluster_id: cluster_id.to_string(),
            language,
            name: name.to_string(),
        });
        if let Some(error) = Self::take_failure(&mut state, MockOp::CreateContext) {
            return Err(error);
        }
        if !state.cluster_running {
            return Err(TransportError::Status {
                status: 400,
                body: format!(
                    "{{\"error\":\"ClusterNotReadyException: Cluster {} is not running\"}}",
                    cluster_id
                ),
            });
        }

        state.next_id += 1;
        let context_id = format!("ctx-{}", state.next_id);
        state
            .contexts
            .insert(context_id.clone(), ContextState::Pending);
        Ok(context_id)
    }

    fn context_status(&self, _cluster_id: &str, context_id: &str) -> TransportResult<ContextStatus> {
        let mut state = self.lock();
        state.calls.push(MockCall::ContextStatus {
            context_id: context_id.to_string(),
        });
        if let Some(error) = Self::take_failure(&mut state, MockOp::ContextStatus) {
            return Err(error);
        }
        if !state.contexts.contains_key(context_id) {
            return Err(Self::context_missing(context_id));
        }

        let next = state
            .context_starts
            .pop_front()
            .unwrap_or(ContextState::Running);
        state.contexts.insert(context_id.to_string(), next.clone());
        Ok(ContextStatus {
            context_id: context_id.to_string(),
            state: next,
        })
    }

    fn destroy_context(&self, _cluster_id: &str, context_id: &str) -> TransportResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::DestroyContext {
            context_id: context_id.to_string(),
        });
        if let Some(error) = Self::take_failure(&mut state, MockOp::DestroyContext) {
            return Err(error);
        }
        match state.contexts.remove(context_id) {
            Some(_) => Ok(()),
            None => Err(Self::context_missing(context_id)),
        }
    }

    fn submit(
        &self,
        _cluster_id: &str,
        context_id: &str,
        language: Language,
        code: &str,
    ) -> TransportResult<String> {
        let mut state = self.lock();
        state.calls.push(MockCall::Submit {
            context_id: context_id.to_string(),
            language,
            code: code.to_string(),
        });
        if let Some(error) = Self::take_failure(&mut state, MockOp::Submit) {
            return Err(error);
        }
        if !state.contexts.contains_key(context_id) {
            return Err(Self::context_missing(context_id));
        }

        let script = match state.scripts.pop_front() {
            Some(script) => script,
            None => match &self.responder {
                Some(responder) => responder(language, code),
                None => CommandScript::new(),
            },
        };

        state.next_id += 1;
        let command_id = format!("cmd-{}", state.next_id);
        state.commands.insert(command_id.clone(), script);
        Ok(command_id)
    }

    fn poll_status(
        &self,
        _cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> TransportResult<CommandStatus> {
        let mut state = self.lock();
        state.calls.push(MockCall::PollStatus {
            command_id: command_id.to_string(),
        });
        if let Some(error) = Self::take_failure(&mut state, MockOp::PollStatus) {
            return Err(error);
        }
        if !state.contexts.contains_key(context_id) {
            return Err(Self::context_missing(context_id));
        }

        let script = state
            .commands
            .get_mut(command_id)
            .ok_or_else(|| TransportError::Status {
                status: 404,
                body: format!("{{\"error\":\"command {} not found\"}}", command_id),
            })?;
        let (command_state, result) = script.next_step();

        Ok(CommandStatus {
            command_id: command_id.to_string(),
            state: command_state,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_repeats_last_step() {
        let mut script = CommandScript::new()
            .then(CommandState::Queued)
            .finish_text("done");

        assert_eq!(script.next_step().0, CommandState::Queued);
        assert_eq!(script.next_step().0, CommandState::Finished);
        assert_eq!(script.next_step().0, CommandState::Finished);
    }

    #[test]
    fn test_submit_requires_known_context() {
        let mock = MockTransport::new();
        let err = mock
            .submit("c", "ctx-404", Language::Python, "1")
            .unwrap_err();
        assert!(err.is_context_gone());
    }

    #[test]
    fn test_records_calls() {
        let mock = MockTransport::new();
        let ctx = mock.create_context("c", Language::Python, "n").unwrap();
        let cmd = mock.submit("c", &ctx, Language::Python, "print(1)").unwrap();
        mock.poll_status("c", &ctx, &cmd).unwrap();

        assert_eq!(mock.submitted_code(), vec!["print(1)".to_string()]);
        assert_eq!(mock.poll_count(), 1);
        assert_eq!(mock.live_contexts(), vec![ctx]);
    }
}
