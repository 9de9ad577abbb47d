// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! dbrxr core
//!
//! Remote execution session manager for a persistent compute cluster.
//!
//! A [`Session`] creates an isolated execution context on a cluster, submits
//! source text into it, polls each command until it reaches a terminal state,
//! and tears the context down again. Packages can be installed on demand into
//! the host runtime (Python) or the guest runtime (R, evaluated through the
//! `rpy2` interpreter bridge).
//!
//! # Architecture
//!
//! - `transport`: the remote API calls ([`HttpTransport`] over HTTP,
//!   [`MockTransport`] in memory)
//! - `wire`: request and response shapes of command execution API 1.2
//! - `context`: context lifecycle, at most one live context
//! - `command`: submission and the poll loop state machine
//! - `bootstrap`: package install statements and the bridge pre-flight
//!
//! The crate never reads the process environment; credentials come in
//! through [`ClusterEndpoint`].
//!
//! # Example
//!
//! ```no_run
//! use dbrxr_core::{ClusterEndpoint, Language, Runtime, Session, SessionConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = ClusterEndpoint::for_workspace(
//!     "adb-1234567890.12.azuredatabricks.net",
//!     "dapi-token",
//!     "0101-123456-abcdef",
//! );
//! let mut session = Session::connect(endpoint, SessionConfig::default());
//!
//! session.create_context("scoring")?;
//! session.install_package(Runtime::Guest, "mlflow")?;
//!
//! let result = session.execute(Language::R, "1 + 1");
//! session.destroy_context()?;
//!
//! println!("{:?}", result?.text());
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod clock;
pub mod command;
pub mod config;
pub mod context;
mod error;
mod session;
pub mod transport;
mod types;
pub mod wire;

pub use bootstrap::PackageName;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BridgeMode, ClusterEndpoint, PollPolicy, SessionConfig};
pub use error::{Result, SessionError, TransportError};
pub use session::Session;
pub use transport::{HttpTransport, MockTransport, Transport};
pub use types::{
    Column, Command, CommandResult, CommandState, CommandStatus, ContextHandle, ContextState,
    ContextStatus, ErrorPayload, InstallOutcome, Language, ResultData, ResultStatus, Runtime,
};
