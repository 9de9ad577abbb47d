// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for dbrxr-core.

use std::time::Duration;

use thiserror::Error;

use crate::types::{CommandState, Runtime};

/// Result type using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures raised by a [`Transport`](crate::transport::Transport).
///
/// The transport never retries; the caller owns the retry policy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Base URL plus path did not form a usable URL.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Remote service answered with a non-2xx status.
    #[error("remote service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not the JSON shape we expected.
    #[error("malformed response (HTTP {status}): {message}; body: {body}")]
    Decode {
        status: u16,
        body: String,
        message: String,
    },

    /// Request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } | TransportError::Decode { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether the server told us the execution context no longer exists.
    pub fn is_context_gone(&self) -> bool {
        match self {
            TransportError::Status { status: 404, .. } => true,
            TransportError::Status { status: 400, body } => {
                let body = body.to_ascii_lowercase();
                body.contains("context") && (body.contains("not found") || body.contains("notfound"))
            }
            _ => false,
        }
    }
}

/// Errors surfaced by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network or HTTP failure, passed through unmodified.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A context is already live, or the cluster could not start one.
    #[error("context creation failed: {0}")]
    ContextCreation(String),

    /// Nothing can be submitted right now (no live context, empty payload).
    #[error("submission rejected: {0}")]
    Submission(String),

    /// The remote command failed; summary and trace are reported verbatim.
    #[error("command failed: {summary}")]
    Execution { summary: String, trace: String },

    /// The local deadline (or poll cap) expired before a terminal state.
    #[error(
        "command {command_id} did not finish within {}ms ({polls} polls, last state {last_state:?})",
        .elapsed.as_millis()
    )]
    ExecutionTimeout {
        command_id: String,
        elapsed: Duration,
        polls: u32,
        last_state: Option<CommandState>,
    },

    /// Package name failed the allow-list for its runtime.
    #[error("invalid {runtime} package name '{name}': {reason}")]
    InvalidPackageName {
        runtime: Runtime,
        name: String,
        reason: String,
    },

    /// Guest-language code needs the interpreter bridge, which is disabled or missing.
    #[error("interpreter bridge is not available in this context")]
    BridgeUnavailable,

    /// An install command ran but the package is still not importable.
    /// `output` is whatever the install command printed.
    #[error("{runtime} package '{package}' is still missing after installation: {output}")]
    PackageVerification {
        runtime: Runtime,
        package: String,
        output: String,
    },

    /// A probe command returned output we do not know how to interpret.
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
}

impl SessionError {
    /// Stack trace of a remote failure, if this is one.
    pub fn trace(&self) -> Option<&str> {
        match self {
            SessionError::Execution { trace, .. } => Some(trace),
            _ => None,
        }
    }
}
