//! Shared test utilities for the provisioner crate.

use crate::builder::{BuildCommand, CommandExecutor};
use crate::error::{ProvisionError, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// An expected build invocation and the result to hand back for it.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command the stub expects to receive.
    pub command: BuildCommand,
    /// The timeout the stub expects to receive.
    pub timeout: Option<Duration>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expect `command` with no timeout and answer with `result`.
    #[must_use]
    pub fn new(command: BuildCommand, result: Result<Output>) -> Self {
        Self {
            command,
            timeout: None,
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Returns predefined results for an ordered list of expected invocations.
/// Unexpected or mismatched invocations yield
/// [`ProvisionError::StubMismatch`] rather than running anything.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// A stub expecting no invocations at all.
    #[must_use]
    pub fn never() -> Self {
        Self::new(Vec::new())
    }

    /// Returns true once every expected invocation has been consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.expected.borrow().is_empty()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.is_finished(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, command: &BuildCommand, timeout: Option<Duration>) -> Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(ProvisionError::StubMismatch {
                message: format!("unexpected invocation of {command}"),
            });
        };

        if call.command != *command || call.timeout != timeout {
            return Err(ProvisionError::StubMismatch {
                message: format!(
                    "expected {} (timeout {:?}), got {command} (timeout {timeout:?})",
                    call.command, call.timeout
                ),
            });
        }

        call.result
    }
}
