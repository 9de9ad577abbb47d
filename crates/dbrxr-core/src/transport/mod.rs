// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport layer.
//!
//! - `http`: blocking HTTP client for the remote command execution API
//! - `mock`: scripted in-memory transport for tests and dry runs

pub mod http;
pub mod mock;

use crate::error::TransportError;
use crate::types::{CommandStatus, ContextStatus, Language};

pub use http::HttpTransport;
pub use mock::MockTransport;

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Request/response calls against the remote execution service.
///
/// Implementations do not retry and do not keep any context state of their
/// own; the session layer decides what to call and when.
pub trait Transport: Send + Sync {
    /// Create an execution context, returning its id.
    fn create_context(
        &self,
        cluster_id: &str,
        language: Language,
        name: &str,
    ) -> TransportResult<String>;

    /// Fetch the state of a context.
    fn context_status(&self, cluster_id: &str, context_id: &str) -> TransportResult<ContextStatus>;

    /// Destroy a context, abandoning any pending commands in it.
    fn destroy_context(&self, cluster_id: &str, context_id: &str) -> TransportResult<()>;

    /// Submit source text into a context, returning the command id.
    fn submit(
        &self,
        cluster_id: &str,
        context_id: &str,
        language: Language,
        code: &str,
    ) -> TransportResult<String>;

    /// Fetch the state (and result, once available) of a command.
    fn poll_status(
        &self,
        cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> TransportResult<CommandStatus>;
}
