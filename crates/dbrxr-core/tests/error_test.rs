// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for dbrxr-core.

use std::time::Duration;

use dbrxr_core::{CommandState, Runtime, SessionError, TransportError};

#[test]
fn test_transport_status_error_display() {
    let err = TransportError::Status {
        status: 503,
        body: "temporarily unavailable".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("HTTP 503"));
    assert!(display.contains("temporarily unavailable"));
    assert_eq!(err.status(), Some(503));
}

#[test]
fn test_transport_request_error_has_no_status() {
    let err = TransportError::Request("dns failure".to_string());
    assert!(err.to_string().contains("request failed"));
    assert_eq!(err.status(), None);
}

#[test]
fn test_context_gone_detection() {
    let not_found = TransportError::Status {
        status: 404,
        body: String::new(),
    };
    let bad_request = TransportError::Status {
        status: 400,
        body: r#"{"error":"ContextNotFound: Context abc not found"}"#.to_string(),
    };
    let other = TransportError::Status {
        status: 400,
        body: "cluster is terminating".to_string(),
    };

    assert!(not_found.is_context_gone());
    assert!(bad_request.is_context_gone());
    assert!(!other.is_context_gone());
}

#[test]
fn test_transport_error_converts_unmodified() {
    let err: SessionError = TransportError::Request("reset".to_string()).into();
    assert!(matches!(err, SessionError::Transport(TransportError::Request(ref m)) if m == "reset"));
    assert!(err.to_string().contains("transport error"));
}

#[test]
fn test_submission_error_display() {
    let err = SessionError::Submission("no live execution context".to_string());
    assert!(err.to_string().contains("submission rejected"));
    assert!(err.to_string().contains("no live execution context"));
}

#[test]
fn test_execution_error_keeps_trace() {
    let err = SessionError::Execution {
        summary: "ZeroDivisionError".to_string(),
        trace: "line 1".to_string(),
    };
    assert!(err.to_string().contains("ZeroDivisionError"));
    assert_eq!(err.trace(), Some("line 1"));
    assert_eq!(SessionError::BridgeUnavailable.trace(), None);
}

#[test]
fn test_timeout_error_display() {
    let err = SessionError::ExecutionTimeout {
        command_id: "cmd-7".to_string(),
        elapsed: Duration::from_millis(5000),
        polls: 5,
        last_state: Some(CommandState::Running),
    };
    let display = err.to_string();
    assert!(display.contains("cmd-7"));
    assert!(display.contains("5000ms"));
    assert!(display.contains("5 polls"));
}

#[test]
fn test_invalid_package_name_display() {
    let err = SessionError::InvalidPackageName {
        runtime: Runtime::Guest,
        name: "bad name".to_string(),
        reason: "spaces".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("guest"));
    assert!(display.contains("bad name"));
}

#[test]
fn test_package_verification_display() {
    let err = SessionError::PackageVerification {
        runtime: Runtime::Host,
        package: "numpy".to_string(),
        output: "ERROR: No matching distribution found for numpy".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("still missing"));
    assert!(display.contains("No matching distribution"));
}

#[test]
fn test_errors_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SessionError>();
    assert_send_sync::<TransportError>();
}
