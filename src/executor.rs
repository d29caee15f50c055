//! Realizes a parsed [`Pipeline`] as a set of connected child processes.
//!
//! Every stage gets its own child. Adjacent stages are joined by a pipe, and
//! each child receives a [`RedirectPlan`] describing which descriptors become
//! its standard input and output. All descriptors the executor creates are
//! owned values: whatever path leaves [`Executor::execute_with`], the parent
//! ends up holding none of them, so readers always observe end-of-stream.

use crate::command::ExitCode;
use crate::parser::{Pipeline, Stage};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::libc::c_char;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::iter;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::ptr;
use thiserror::Error;

const STDIN_FILENO: RawFd = 0;
const STDOUT_FILENO: RawFd = 1;
const STDERR_FILENO: RawFd = 2;
/// Exit status of a child whose program could not be started.
const EXEC_FAILURE: ExitCode = 127;
/// Status recorded for a stage that was never spawned.
const NOT_STARTED: ExitCode = 1;
const OUTPUT_MODE: u32 = 0o644;

/// Errors of a single pipeline run.
#[derive(Debug, Error)]
pub enum ExecError {
    /// No child has been spawned.
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] Errno),
    /// Stages before `program` were spawned and have been reaped.
    #[error("failed to start `{program}`: {source}")]
    Fork {
        program: String,
        #[source]
        source: Errno,
    },
    #[error("cannot open `{}` for reading: {source}", .path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot open `{}` for writing: {source}", .path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("argument contains a NUL byte: {0:?}")]
    NulByte(String),
}

/// Outer standard streams of a pipeline.
///
/// `None` inherits the shell's own descriptor. A provided descriptor becomes the
/// first stage's stdin or the last stage's stdout, and is closed in the parent
/// once every stage has been spawned.
#[derive(Debug, Default)]
pub struct Streams {
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
}

/// Exit codes of the runnable stages, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    pub codes: Vec<ExitCode>,
}

impl PipelineStatus {
    /// Exit code of the last stage, the conventional status of a pipeline.
    pub fn last(&self) -> Option<ExitCode> {
        self.codes.last().copied()
    }
}

/// Descriptor moves a child performs between `fork` and `exec`.
///
/// Bindings are applied in insertion order, so when two bindings target the same
/// standard stream the later one wins. Pipe wiring is bound first and file
/// redirections after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectPlan {
    moves: Vec<(RawFd, RawFd)>,
}

impl RedirectPlan {
    /// Make `target` refer to the same open file as `source`.
    pub fn bind(&mut self, source: RawFd, target: RawFd) {
        self.moves.push((source, target));
    }

    /// Descriptor that will end up behind `target`, if the plan touches it.
    #[cfg(test)]
    fn source_of(&self, target: RawFd) -> Option<RawFd> {
        self.moves
            .iter()
            .rev()
            .find(|(_, t)| *t == target)
            .map(|(s, _)| *s)
    }

    /// Only async-signal-safe calls: this runs in a freshly forked child.
    fn apply(&self) -> nix::Result<()> {
        for &(source, target) in &self.moves {
            if source == target {
                // dup2 would be a no-op and leave close-on-exec set.
                fcntl(target, FcntlArg::F_SETFD(FdFlag::empty()))?;
            } else {
                unistd::dup2(source, target)?;
            }
        }
        Ok(())
    }
}

/// Everything a child needs, prepared in the parent before forking.
///
/// `argv_ptrs` is the null-terminated `char *argv[]` over `argv`, so the child
/// can exec without building it.
struct Launch {
    argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
    error_prefix: Vec<u8>,
}

impl Launch {
    fn prepare(stage: &Stage, shell_name: &str) -> Result<Self, ExecError> {
        let argv = stage
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()).map_err(|_| ExecError::NulByte(arg.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(iter::once(ptr::null()))
            .collect();
        let input = match &stage.input {
            Some(path) => Some(OwnedFd::from(File::open(path).map_err(|source| {
                ExecError::OpenInput {
                    path: path.clone(),
                    source,
                }
            })?)),
            None => None,
        };
        let output = match &stage.output {
            Some(path) => Some(OwnedFd::from(
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(OUTPUT_MODE)
                    .open(path)
                    .map_err(|source| ExecError::OpenOutput {
                        path: path.clone(),
                        source,
                    })?,
            )),
            None => None,
        };
        let error_prefix =
            format!("{}: {}: ", shell_name, stage.program().unwrap_or_default()).into_bytes();
        Ok(Self {
            argv,
            argv_ptrs,
            input,
            output,
            error_prefix,
        })
    }

    fn program(&self) -> String {
        self.argv
            .first()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.input
            .iter()
            .chain(self.output.iter())
            .map(AsRawFd::as_raw_fd)
    }
}

/// Runs pipelines in the foreground: [`Executor::execute`] returns once every
/// spawned child has been reaped.
#[derive(Debug, Clone)]
pub struct Executor {
    shell_name: String,
}

impl Executor {
    /// `shell_name` prefixes the error messages children print.
    pub fn new(shell_name: impl Into<String>) -> Self {
        Self {
            shell_name: shell_name.into(),
        }
    }

    /// Run `pipeline` with the shell's own stdin and stdout at its ends.
    pub fn execute(&self, pipeline: &Pipeline) -> Result<PipelineStatus, ExecError> {
        self.execute_with(pipeline, Streams::default())
    }

    /// Run `pipeline` with caller-provided outer streams.
    ///
    /// No-op stages are skipped and their neighbours are joined directly. A stage
    /// whose redirection file cannot be opened is reported and not spawned; the
    /// other stages still run and see its end of the pipe closed.
    pub fn execute_with(
        &self,
        pipeline: &Pipeline,
        streams: Streams,
    ) -> Result<PipelineStatus, ExecError> {
        let stages: Vec<&Stage> = pipeline.runnable().collect();
        if stages.is_empty() {
            return Ok(PipelineStatus::default());
        }
        let count = stages.len();

        let launches: Vec<Option<Launch>> = stages
            .iter()
            .map(|stage| match Launch::prepare(stage, &self.shell_name) {
                Ok(launch) => Some(launch),
                Err(e) => {
                    warn!("stage {:?} not started: {}", stage.argv, e);
                    eprintln!("{}: {}", self.shell_name, e);
                    None
                }
            })
            .collect();

        let pipes = (1..count)
            .map(|_| cloexec_pipe())
            .collect::<nix::Result<Vec<_>>>()
            .map_err(ExecError::Pipe)?;
        debug!("created {} pipe(s) for {} stage(s)", pipes.len(), count);

        let mut close_in_child: Vec<RawFd> = pipes
            .iter()
            .flat_map(|(r, w)| [r.as_raw_fd(), w.as_raw_fd()])
            .collect();
        close_in_child.extend(launches.iter().flatten().flat_map(|launch| launch.raw_fds()));
        close_in_child.extend(
            streams
                .stdin
                .iter()
                .chain(streams.stdout.iter())
                .map(AsRawFd::as_raw_fd),
        );

        let mut codes = vec![NOT_STARTED; count];
        let mut children: Vec<(usize, Pid)> = Vec::with_capacity(count);
        let mut fork_error = None;

        for (index, launch) in launches.iter().enumerate() {
            let Some(launch) = launch else { continue };
            let plan = redirect_plan(index, count, launch, &pipes, &streams);

            // SAFETY: the child only performs async-signal-safe calls on data
            // prepared before the fork, then execs or exits.
            match unsafe { unistd::fork() } {
                Ok(ForkResult::Child) => exec_child(launch, &plan, &close_in_child),
                Ok(ForkResult::Parent { child }) => {
                    debug!("spawned stage {} `{}` as {}", index, launch.program(), child);
                    children.push((index, child));
                }
                Err(source) => {
                    warn!("fork failed at stage {}: {}", index, source);
                    fork_error = Some(ExecError::Fork {
                        program: launch.program(),
                        source,
                    });
                    break;
                }
            }
        }

        // The parent keeps no pipe end, redirection file or outer stream open.
        drop(pipes);
        drop(launches);
        drop(streams);

        for (index, pid) in children {
            codes[index] = wait_for(pid);
            debug!("stage {} ({}) exited with {}", index, pid, codes[index]);
        }
        if let Some(err) = fork_error {
            return Err(err);
        }
        info!("pipeline finished with {:?}", codes);
        Ok(PipelineStatus { codes })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

/// Standard-stream bindings of stage `index` out of `count`.
fn redirect_plan(
    index: usize,
    count: usize,
    launch: &Launch,
    pipes: &[(OwnedFd, OwnedFd)],
    streams: &Streams,
) -> RedirectPlan {
    let mut plan = RedirectPlan::default();
    let upstream = if index == 0 {
        streams.stdin.as_ref()
    } else {
        Some(&pipes[index - 1].0)
    };
    let downstream = if index + 1 == count {
        streams.stdout.as_ref()
    } else {
        Some(&pipes[index].1)
    };
    if let Some(fd) = upstream {
        plan.bind(fd.as_raw_fd(), STDIN_FILENO);
    }
    if let Some(fd) = downstream {
        plan.bind(fd.as_raw_fd(), STDOUT_FILENO);
    }
    if let Some(fd) = &launch.input {
        plan.bind(fd.as_raw_fd(), STDIN_FILENO);
    }
    if let Some(fd) = &launch.output {
        plan.bind(fd.as_raw_fd(), STDOUT_FILENO);
    }
    plan
}

/// Body of a forked child. Never returns.
fn exec_child(launch: &Launch, plan: &RedirectPlan, close: &[RawFd]) -> ! {
    if let Err(errno) = plan.apply() {
        die(&launch.error_prefix, errno);
    }
    for &fd in close.iter().filter(|&&fd| fd > STDERR_FILENO) {
        let _ = unistd::close(fd);
    }
    // SAFETY: `argv_ptrs` points into `launch.argv`, which outlives the call,
    // and ends with a null pointer.
    unsafe { nix::libc::execvp(launch.argv_ptrs[0], launch.argv_ptrs.as_ptr()) };
    die(&launch.error_prefix, Errno::last())
}

fn die(prefix: &[u8], errno: Errno) -> ! {
    let stderr = io::stderr();
    let _ = unistd::write(stderr.as_fd(), prefix);
    let _ = unistd::write(stderr.as_fd(), errno.desc().as_bytes());
    let _ = unistd::write(stderr.as_fd(), b"\n");
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which belong to the parent.
    unsafe { nix::libc::_exit(EXEC_FAILURE) }
}

/// Block until `pid` terminates, retrying waits cut short by a signal.
fn wait_for(pid: Pid) -> ExitCode {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, signal, _)) => return 128 + signal as i32,
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("waitpid({}) failed: {}", pid, e);
                return -1;
            }
        }
    }
}

/// A pipe whose ends are not inherited across `exec`.
pub fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (reader, writer) = unistd::pipe()?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((reader, writer))
}
