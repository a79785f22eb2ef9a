//! Wrapped program supervisor.
//! Spawns the program with piped stdin/stdout (stderr passes through),
//! asks the kernel to SIGTERM it if we die first, and reaps it at shutdown.

use std::ffi::OsString;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use tracing::{debug, info, warn};

use crate::error::{LaunchError, PipelineError};

/// Status reported for a child that did not exit normally.
/// Outside the 0..=255 range of real exit codes.
pub const ABNORMAL_EXIT: i32 = 256;

/// How the wrapped program ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    /// Killed by a signal (number if known).
    Signaled(Option<i32>),
}

impl ChildExit {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ChildExit::Exited(code),
            None => ChildExit::Signaled(status.signal()),
        }
    }

    /// Exit code, or [`ABNORMAL_EXIT`] for abnormal termination.
    pub fn code(&self) -> i32 {
        match self {
            ChildExit::Exited(code) => *code,
            ChildExit::Signaled(_) => ABNORMAL_EXIT,
        }
    }

    /// Status for our own process exit. An OS status is 8 bits, so a signal
    /// is reported as 128 + signal like a shell does.
    pub fn shell_status(&self) -> u8 {
        match self {
            ChildExit::Exited(code) => (*code & 0xff) as u8,
            ChildExit::Signaled(Some(signal)) => (128 + (*signal & 0x7f)) as u8,
            ChildExit::Signaled(None) => 255,
        }
    }
}

/// Running wrapped program: pid plus the two pipe ends we keep.
pub struct ProcessHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    program: String,
}

impl ProcessHandle {
    /// Launch `argv[0]` with the remaining arguments, resolved through `PATH`.
    /// The child-side pipe ends are closed in this process once spawned.
    pub fn launch(argv: &[OsString]) -> Result<Self, LaunchError> {
        let (program, args) = argv.split_first().ok_or_else(|| LaunchError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
        })?;
        let program_name = program.to_string_lossy().into_owned();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        set_parent_death_signal(&mut command);

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: program_name.clone(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or(LaunchError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))?;

        info!(program = %program_name, pid = child.id(), "wrapped program spawned");
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            program: program_name,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Write end of the child's stdin. Dropping it signals EOF to the child.
    pub fn take_stdin(&mut self) -> Result<ChildStdin, LaunchError> {
        self.stdin.take().ok_or(LaunchError::MissingPipe("stdin"))
    }

    /// Read end of the child's stdout.
    pub fn take_stdout(&mut self) -> Result<ChildStdout, LaunchError> {
        self.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))
    }

    /// Block until the child terminates.
    pub fn wait(&mut self) -> Result<ChildExit, PipelineError> {
        drop(self.stdin.take());
        let status = self.child.wait().map_err(PipelineError::Wait)?;
        let exit = ChildExit::from_status(status);
        match exit {
            ChildExit::Exited(code) => {
                info!(program = %self.program, code, "wrapped program exited")
            }
            ChildExit::Signaled(signal) => {
                warn!(program = %self.program, ?signal, "wrapped program terminated abnormally")
            }
        }
        Ok(exit)
    }

    /// Best-effort kill and reap after a fatal pipeline error.
    pub fn kill(&mut self) {
        drop(self.stdin.take());
        drop(self.stdout.take());
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "kill wrapped program");
        }
        let _ = self.child.wait();
    }
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal(command: &mut Command) {
    // SAFETY: prctl is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn set_parent_death_signal(_command: &mut Command) {}
