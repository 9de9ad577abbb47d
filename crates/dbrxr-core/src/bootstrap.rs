// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Package bootstrap.
//!
//! Builds the synthetic commands that probe for and install packages in the
//! host runtime (Python, via pip) and the guest runtime (R, via CRAN), and
//! keeps track of the interpreter bridge that guest code depends on.
//!
//! Package names are validated against a per-runtime allow-list before they
//! are rendered into source text, and are always rendered as quoted string
//! literals.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::command::CommandRunner;
use crate::config::{BridgeMode, PollPolicy, SessionConfig};
use crate::error::{Result, SessionError};
use crate::types::{CommandResult, ContextHandle, InstallOutcome, Language, Runtime};

const MAX_PACKAGE_NAME_LEN: usize = 100;

/// pip distribution names: alphanumerics, `.`, `_`, `-`, alphanumeric at both ends.
static HOST_PACKAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("host package pattern")
});

/// CRAN package names: letters, digits and `.`, starting with a letter,
/// at least two characters, not ending in `.`.
static GUEST_PACKAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9.]*[A-Za-z0-9]$").expect("guest package pattern")
});

/// A package name that passed the allow-list for its runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName {
    runtime: Runtime,
    name: String,
}

impl PackageName {
    /// Validate `name` for `runtime`.
    pub fn parse(runtime: Runtime, name: &str) -> Result<Self> {
        let reject = |reason: &str| SessionError::InvalidPackageName {
            runtime,
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(reject("name is empty"));
        }
        if name.len() > MAX_PACKAGE_NAME_LEN {
            return Err(reject("name is longer than 100 characters"));
        }

        let (pattern, rule) = match runtime {
            Runtime::Host => (
                &*HOST_PACKAGE_PATTERN,
                "only letters, digits, '.', '_' and '-' are allowed, starting and ending with a letter or digit",
            ),
            Runtime::Guest => (
                &*GUEST_PACKAGE_PATTERN,
                "only letters, digits and '.' are allowed, starting with a letter and not ending with '.'",
            ),
        };
        if !pattern.is_match(name) {
            return Err(reject(rule));
        }

        Ok(Self {
            runtime,
            name: name.to_string(),
        })
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Module name probed for a pip distribution; module names have no dashes.
    fn import_name(&self) -> String {
        self.name.replace('-', "_")
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Python string literal for `value`.
///
/// JSON string syntax is a subset of Python's, so this never breaks out of
/// the literal regardless of content.
fn py_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// R double-quoted string literal for `value`.
fn r_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Host-runtime source that evaluates guest-runtime `code` through the
/// bridge and prints the R representation of the last value.
pub fn guest_wrapper(code: &str) -> String {
    format!(
        "import rpy2.robjects as robjects\n\
         _dbrxr_result = robjects.r({})\n\
         print(_dbrxr_result.r_repr())",
        py_literal(code)
    )
}

/// Source that prints `Success`/`Failure` (host) or `TRUE`/`FALSE` (guest).
pub fn probe_statement(package: &PackageName) -> String {
    match package.runtime {
        Runtime::Host => format!(
            "import importlib.util\n\
             print(\"Success\" if importlib.util.find_spec({}) is not None else \"Failure\")",
            py_literal(&package.import_name())
        ),
        Runtime::Guest => guest_wrapper(&format!(
            "{} %in% rownames(installed.packages())",
            r_literal(package.as_str())
        )),
    }
}

/// Source that installs `package`, run in the host runtime.
pub fn install_statement(package: &PackageName, cran_repo: &str) -> String {
    match package.runtime {
        Runtime::Host => format!(
            "import subprocess\n\
             import sys\n\
             subprocess.check_output([sys.executable, \"-m\", \"pip\", \"install\", {}], stderr=subprocess.STDOUT)",
            py_literal(package.as_str())
        ),
        Runtime::Guest => {
            let r_code = format!(
                "install.packages({}, dependencies=TRUE, repos={})",
                r_literal(package.as_str()),
                r_literal(cran_repo)
            );
            format!(
                "import subprocess\n\
                 subprocess.check_output([\"R\", \"-e\", {}], stderr=subprocess.STDOUT)",
                py_literal(&r_code)
            )
        }
    }
}

/// Read a probe's printed verdict.
fn parse_probe(package: &PackageName, result: &CommandResult) -> Result<bool> {
    match result.text() {
        Some("Success") | Some("TRUE") | Some("[1] TRUE") => Ok(true),
        Some("Failure") | Some("FALSE") | Some("[1] FALSE") => Ok(false),
        _ => Err(SessionError::UnexpectedResult(format!(
            "could not tell whether {} package {} is installed from {:?}",
            package.runtime, package, result.data
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    Unchecked,
    Present,
    /// Checked and could not be installed; guest code is refused until the
    /// next context.
    Missing,
}

/// Installs packages and guards the interpreter bridge for one session.
pub struct Bootstrapper {
    runner: CommandRunner,
    mode: BridgeMode,
    bridge_package: String,
    cran_repo: String,
    probe_policy: PollPolicy,
    install_policy: PollPolicy,
    verbose_install: bool,
    bridge: BridgeState,
}

impl Bootstrapper {
    pub fn new(runner: CommandRunner, config: &SessionConfig) -> Self {
        Self {
            runner,
            mode: config.bridge,
            bridge_package: config.bridge_package.clone(),
            cran_repo: config.cran_repo.clone(),
            probe_policy: config.poll.clone(),
            install_policy: config.poll.clone().with_timeout(config.install_timeout),
            verbose_install: config.verbose_install,
            bridge: BridgeState::Unchecked,
        }
    }

    /// Forget what we know about the bridge; called for every new context.
    pub fn reset(&mut self) {
        self.bridge = BridgeState::Unchecked;
    }

    /// Whether guest-runtime code can be submitted.
    pub fn guest_available(&self) -> bool {
        match self.mode {
            BridgeMode::Disabled => false,
            BridgeMode::Assume => true,
            BridgeMode::Check => self.bridge == BridgeState::Present,
        }
    }

    /// Make sure the bridge is in place before anything else runs in `context`.
    ///
    /// In [`BridgeMode::Check`] this probes (and installs, when absent) once per
    /// context; later calls return immediately. A bridge that cannot be
    /// installed is recorded as missing and only guest-language code is refused
    /// afterwards. Transport failures are returned and leave the check pending.
    pub fn ensure_bridge(&mut self, context: &ContextHandle) -> Result<()> {
        if self.mode != BridgeMode::Check || self.bridge != BridgeState::Unchecked {
            return Ok(());
        }

        let bridge = PackageName::parse(Runtime::Host, &self.bridge_package)?;
        info!(
            context_id = %context.context_id,
            package = %bridge,
            "Checking interpreter bridge"
        );
        match self.install(context, &bridge) {
            Ok(_) => self.bridge = BridgeState::Present,
            Err(e @ SessionError::Transport(_)) => return Err(e),
            Err(e) => {
                warn!(
                    context_id = %context.context_id,
                    package = %bridge,
                    error = %e,
                    "Interpreter bridge unavailable, guest-language code will be rejected"
                );
                self.bridge = BridgeState::Missing;
            }
        }
        Ok(())
    }

    /// Whether `package` is importable (host) or installed (guest).
    pub fn is_installed(&self, context: &ContextHandle, package: &PackageName) -> Result<bool> {
        if package.runtime == Runtime::Guest && !self.guest_available() {
            return Err(SessionError::BridgeUnavailable);
        }

        info!(
            context_id = %context.context_id,
            runtime = %package.runtime,
            package = %package,
            "Checking if package is installed"
        );
        let result = self.runner.run(
            context,
            Language::Python,
            &probe_statement(package),
            &self.probe_policy,
        )?;
        let installed = parse_probe(package, &result)?;
        info!(
            package = %package,
            installed,
            "Package check finished"
        );
        Ok(installed)
    }

    /// Install `package` unless it is already present, then verify it.
    #[instrument(skip(self, context, package), fields(context_id = %context.context_id, package = %package))]
    pub fn install(
        &self,
        context: &ContextHandle,
        package: &PackageName,
    ) -> Result<InstallOutcome> {
        if self.is_installed(context, package)? {
            return Ok(InstallOutcome::AlreadyPresent);
        }

        info!(
            context_id = %context.context_id,
            runtime = %package.runtime,
            package = %package,
            "Installing package"
        );
        let result = self.runner.run(
            context,
            Language::Python,
            &install_statement(package, &self.cran_repo),
            &self.install_policy,
        )?;
        let output = result.text().unwrap_or_default().to_string();
        if self.verbose_install {
            info!(package = %package, output = %output, "Install output");
        } else {
            debug!(package = %package, output = %output, "Install output");
        }

        info!(package = %package, "Verifying package installation");
        if self.is_installed(context, package)? {
            Ok(InstallOutcome::Installed)
        } else {
            Err(SessionError::PackageVerification {
                runtime: package.runtime,
                package: package.to_string(),
                output,
            })
        }
    }
}
