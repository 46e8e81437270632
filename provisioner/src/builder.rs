//! PetaLinux image build invocation.
//!
//! The firmware build is an opaque, long-running external command. This
//! module runs it synchronously through a [`CommandExecutor`] so tests can
//! substitute a stub, captures its output into anonymous temporary files
//! (a chatty build can never fill a pipe and stall), and turns a non-zero
//! exit or an expired timeout into a [`BuildFailure`].
//!
//! On Unix a build with a timeout runs in its own process group, so expiry
//! kills every process the build started and not just the top-level shell.

use crate::error::{ProvisionError, Result};
use crate::system_image::PROJECT_DIR;
use camino::Utf8Path;
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Number of trailing output lines kept in a build failure report.
pub const FAILURE_TAIL_LINES: usize = 20;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    program: String,
    args: Vec<String>,
}

impl BuildCommand {
    /// Create a command from a program and its arguments.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The clean PetaLinux rebuild of the project under `build_output_root`.
    ///
    /// An interactive bash is used so the `petalinuxenv` alias from the
    /// user's shell profile is available. The project is cleaned first
    /// because PetaLinux does not reliably pick up configuration changes.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use mes_provisioner::builder::BuildCommand;
    ///
    /// let command = BuildCommand::petalinux(Utf8Path::new("/opt/pl"));
    /// assert_eq!(command.program(), "/bin/bash");
    /// assert!(command.args()[2].contains("cd '/opt/pl/Arty-Z7-10/'"));
    /// ```
    #[must_use]
    pub fn petalinux(build_output_root: &Utf8Path) -> Self {
        let project = format!("{}/", build_output_root.join(PROJECT_DIR));
        let script = format!(
            "petalinuxenv > /dev/null && cd {} && petalinux-build -x distclean && petalinux-build",
            shell_quote(&project)
        );
        Self::new("/bin/bash", ["-i".to_owned(), "-c".to_owned(), script])
    }

    /// Run `snippet` through `/bin/sh -c`.
    #[must_use]
    pub fn shell(snippet: &str) -> Self {
        Self::new("/bin/sh", ["-c", snippet])
    }

    /// The program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Wrap a value in single quotes for `sh`, escaping embedded quotes.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Ways the image build can fail.
#[derive(Debug, Error)]
pub enum BuildFailure {
    /// The build command could not be started.
    #[error("could not start {program}: {source}")]
    Spawn {
        /// Program that failed to launch.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Output capture or waiting on the child failed.
    #[error("failed to {action}: {source}")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The build ran to completion but reported failure.
    #[error("build command {}", describe_exit(*.code, .stderr_tail))]
    Exited {
        /// Exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// Last lines of diagnostic output.
        stderr_tail: String,
    },

    /// The build exceeded its time limit and was killed.
    #[error("build command timed out after {after:?}")]
    TimedOut {
        /// The limit that expired.
        after: Duration,
    },
}

fn describe_exit(code: Option<i32>, stderr_tail: &str) -> String {
    let status = match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_owned(),
    };
    if stderr_tail.is_empty() {
        status
    } else {
        format!("{status}:\n{stderr_tail}")
    }
}

/// Abstraction for running the external build command.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Run `command` to completion and return its captured output.
    ///
    /// A `timeout` of `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::BuildTool`] if the command cannot be started,
    /// its output cannot be captured, or the timeout expires. A non-zero exit
    /// status is not an error at this level.
    fn run(&self, command: &BuildCommand, timeout: Option<Duration>) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, command: &BuildCommand, timeout: Option<Duration>) -> Result<Output> {
        let mut stdout = capture_file()?;
        let mut stderr = capture_file()?;

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::from(clone_capture(&stdout)?))
            .stderr(Stdio::from(clone_capture(&stderr)?));
        // Without a timeout the build stays in the caller's group so Ctrl-C
        // from the terminal still reaches it.
        #[cfg(unix)]
        if timeout.is_some() {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| BuildFailure::Spawn {
            program: command.program().to_owned(),
            source,
        })?;

        let status = match timeout {
            None => child.wait().map_err(io_failure("wait for the build command"))?,
            Some(limit) => match child
                .wait_timeout(limit)
                .map_err(io_failure("wait for the build command"))?
            {
                Some(status) => status,
                None => {
                    debug!(target: "builder", "build exceeded {limit:?}, killing it");
                    kill_build(&mut child);
                    return Err(BuildFailure::TimedOut { after: limit }.into());
                }
            },
        };

        Ok(Output {
            status,
            stdout: read_capture(&mut stdout)?,
            stderr: read_capture(&mut stderr)?,
        })
    }
}

/// Kill a timed-out build and everything it spawned, then reap it.
///
/// Failures are ignored: the build may already have exited.
fn kill_build(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: `killpg` takes plain integers and touches no memory owned by
        // this process. The group id is the child's pid because the child was
        // spawned as a group leader and has not been reaped yet.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn io_failure(action: &'static str) -> impl Fn(std::io::Error) -> ProvisionError {
    move |source| BuildFailure::Io { action, source }.into()
}

fn capture_file() -> Result<File> {
    tempfile::tempfile().map_err(io_failure("create a build output capture file"))
}

fn clone_capture(file: &File) -> Result<File> {
    file.try_clone()
        .map_err(io_failure("share a build output capture file"))
}

fn read_capture(file: &mut File) -> Result<Vec<u8>> {
    let mut captured = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut captured))
        .map_err(io_failure("read captured build output"))?;
    Ok(captured)
}

/// Keep at most the last `max_lines` lines of `bytes`, decoded lossily.
#[must_use]
pub fn tail_lines(bytes: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines.get(start..).unwrap_or_default().join("\n")
}

/// Configuration for the image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Command that performs the build.
    pub command: BuildCommand,
    /// Optional limit on the build's wall-clock time.
    pub timeout: Option<Duration>,
}

/// Runs the image build through an injected executor.
pub struct Builder<'a> {
    executor: &'a dyn CommandExecutor,
    config: BuildConfig,
}

impl<'a> Builder<'a> {
    /// Create a builder that runs through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, config: BuildConfig) -> Self {
        Self { executor, config }
    }

    /// Run the build and block until it finishes.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::BuildTool`] if the command cannot be run,
    /// times out, or exits unsuccessfully. Failure reports carry the last
    /// [`FAILURE_TAIL_LINES`] lines of stderr, or of stdout when stderr is
    /// empty.
    pub fn build_images(&self) -> Result<()> {
        info!(target: "builder", "running {}", self.config.command);
        let output = self
            .executor
            .run(&self.config.command, self.config.timeout)?;

        debug!(
            target: "builder",
            "build produced {} bytes of stdout and {} bytes of stderr",
            output.stdout.len(),
            output.stderr.len()
        );

        if output.status.success() {
            return Ok(());
        }

        let diagnostics = if output.stderr.iter().all(u8::is_ascii_whitespace) {
            &output.stdout
        } else {
            &output.stderr
        };
        Err(BuildFailure::Exited {
            code: output.status.code(),
            stderr_tail: tail_lines(diagnostics, FAILURE_TAIL_LINES),
        }
        .into())
    }
}
