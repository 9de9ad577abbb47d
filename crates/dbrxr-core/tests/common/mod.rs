// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for dbrxr-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use dbrxr_core::transport::mock::CommandScript;
use dbrxr_core::{
    BridgeMode, ClusterEndpoint, CommandState, Language, ManualClock, MockTransport, Session,
    SessionConfig,
};

pub const CLUSTER_ID: &str = "0101-123456-abcdef";

/// A session wired to an in-memory cluster and a manual clock.
pub struct TestSession {
    pub mock: Arc<MockTransport>,
    pub clock: Arc<ManualClock>,
    pub session: Session,
}

impl TestSession {
    /// Session over a mock that only answers what the test scripts.
    pub fn scripted(mode: BridgeMode) -> Self {
        Self::build(MockTransport::new(), mode)
    }

    /// Session over a mock that behaves like a cluster with Python, R and
    /// the bridge installed.
    pub fn fake_cluster() -> Self {
        Self::build(
            MockTransport::new().with_responder(fake_cluster),
            BridgeMode::Check,
        )
    }

    fn build(mock: MockTransport, mode: BridgeMode) -> Self {
        let mock = Arc::new(mock);
        let clock = Arc::new(ManualClock::new());
        let session = Session::with_transport(
            endpoint(),
            mock.clone(),
            clock.clone(),
            SessionConfig::default().with_bridge_mode(mode),
        );
        Self {
            mock,
            clock,
            session,
        }
    }
}

pub fn endpoint() -> ClusterEndpoint {
    ClusterEndpoint::new("https://adb-1.example.test/api/1.2", "dapi-test", CLUSTER_ID)
}

/// Canned answers for the statements a session sends.
pub fn fake_cluster(_language: Language, code: &str) -> CommandScript {
    if code.contains("importlib.util.find_spec") {
        return CommandScript::text("Success");
    }
    if code.contains("installed.packages()") {
        return CommandScript::text("TRUE");
    }
    if code.contains(r#"robjects.r("1 + 1")"#) {
        return CommandScript::new()
            .then(CommandState::Queued)
            .then(CommandState::Running)
            .finish_text("2\n");
    }
    if code.contains(r#"robjects.r("undefined_fn()")"#) {
        return CommandScript::new().then(CommandState::Running).finish_error(
            "RRuntimeError: Error in undefined_fn() : could not find function \"undefined_fn\"",
            "Traceback (most recent call last):\n  File \"<command>\", line 2\nRRuntimeError",
        );
    }
    CommandScript::new()
}
