// Hep Dispatcher
// Runs resolved commands in the foreground or as detached background processes

use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Shell used for single-string commands that contain whitespace
const SHELL: &str = "/bin/sh";

/// Errors raised when a command cannot be started
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect output of '{program}': {source}")]
    Output {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Foreground command ran to completion
    Completed {
        /// Exit code; `None` when killed by a signal
        code: Option<i32>,
        /// Interleaved stdout and stderr, trimmed
        output: String,
    },
    /// Background command was started and left running
    Spawned { pid: u32 },
}

/// How a resolved command is started.
///
/// Decided from the configured template, never from resolved values, so
/// device-reported text substituted into a command is not shell-parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// argv[0] is executed with the remaining tokens as arguments
    Direct,
    /// The single token is handed to `/bin/sh -c`
    Shell,
}

impl Launch {
    pub fn for_template(template: &[String]) -> Self {
        match template {
            [only] if only.contains(char::is_whitespace) => Launch::Shell,
            _ => Launch::Direct,
        }
    }
}

/// Executes resolved commands.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    home: Option<PathBuf>,
}

impl Dispatcher {
    /// Dispatcher expanding `~` to the current user's home directory.
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }

    /// Expand a leading `~` or `~/` in `program`.
    pub fn expand_home(&self, program: &str) -> String {
        let Some(home) = &self.home else {
            return program.to_string();
        };
        if program == "~" {
            home.display().to_string()
        } else if let Some(rest) = program.strip_prefix("~/") {
            home.join(rest).display().to_string()
        } else {
            program.to_string()
        }
    }

    fn build(&self, command: &[String], launch: Launch) -> Result<(String, Command), DispatchError> {
        let (first, args) = command.split_first().ok_or(DispatchError::EmptyCommand)?;
        let program = self.expand_home(first);

        let cmd = match launch {
            Launch::Shell => {
                let mut cmd = Command::new(SHELL);
                cmd.arg("-c").arg(&program).args(args);
                cmd
            }
            Launch::Direct => {
                let mut cmd = Command::new(&program);
                cmd.args(args);
                cmd
            }
        };
        Ok((program, cmd))
    }

    /// Run `command`, blocking until it exits unless `background` is set.
    pub fn dispatch(
        &self,
        command: &[String],
        launch: Launch,
        background: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        if background {
            self.spawn_background(command, launch)
        } else {
            self.run_foreground(command, launch)
        }
    }

    /// Run to completion, capturing stdout and stderr through one channel.
    pub fn run_foreground(
        &self,
        command: &[String],
        launch: Launch,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (program, mut cmd) = self.build(command, launch)?;
        let spawn_error = |source| DispatchError::Spawn {
            program: program.clone(),
            source,
        };

        let (mut reader, writer) = UnixStream::pair().map_err(spawn_error)?;
        let stderr = writer.try_clone().map_err(spawn_error)?;
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(OwnedFd::from(writer))
            .stderr(OwnedFd::from(stderr))
            .spawn()
            .map_err(spawn_error)?;
        // The command keeps its copies of the write ends until dropped
        drop(cmd);

        let mut captured = Vec::new();
        let read = reader.read_to_end(&mut captured);
        let status = child.wait();
        let output_error = |source| DispatchError::Output {
            program: program.clone(),
            source,
        };
        read.map_err(output_error)?;
        let status = status.map_err(output_error)?;

        let output = String::from_utf8_lossy(&captured).trim().to_string();
        let code = status.code();

        log::debug!(
            "rc={}, output={}",
            code.map_or_else(|| status.to_string(), |c| c.to_string()),
            output
        );

        Ok(DispatchOutcome::Completed { code, output })
    }

    /// Start detached in its own process group; a waiter thread reaps it.
    pub fn spawn_background(
        &self,
        command: &[String],
        launch: Launch,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (program, mut cmd) = self.build(command, launch)?;
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id();
        let spawned = std::thread::Builder::new()
            .name(format!("hep-reap-{}", pid))
            .spawn(move || match child.wait() {
                Ok(status) => log::debug!("Background {} (pid {}) exited: {}", program, pid, status),
                Err(e) => log::warn!("Failed to wait for {} (pid {}): {}", program, pid, e),
            });
        if let Err(e) = spawned {
            log::warn!("Could not start reaper for pid {}: {}", pid, e);
        }

        Ok(DispatchOutcome::Spawned { pid })
    }
}
