//! Solver driver
//!
//! Spawns the external solver as a child process, streams its stdout line by
//! line to the job log and a progress parser, and enforces cancellation.
//! A dedicated reader thread blocks on the pipe and feeds a bounded channel;
//! the calling thread consumes it, so nothing here runs on a UI thread.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use vexis_core::cancel::CancelToken;
use vexis_core::config::PipelineConfig;
use vexis_core::error::CoreError;

use crate::error::{RunnerError, RunnerResult};

/// Windows status for a missing DLL at process start; the one exit the
/// driver retries with the fallback executable.
pub const STATUS_DLL_NOT_FOUND: i32 = 0xC000_0135_u32 as i32;

/// How long a terminated child gets before the hard kill.
const GRACE_PERIOD: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const LINE_QUEUE_DEPTH: usize = 256;

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\btime\s*=\s*([0-9][0-9eE.+-]*)").expect("static pattern")
    })
}

/// Solver time parsed from one stdout line, if the line carries a progress
/// marker.
pub fn parse_time_marker(line: &str) -> Option<f64> {
    let captures = progress_regex().captures(line)?;
    captures[1].parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitClass {
    Success,
    DllNotFound,
    Failed(i32),
}

fn classify_exit(code: Option<i32>) -> ExitClass {
    match code {
        Some(0) => ExitClass::Success,
        Some(c) if c == STATUS_DLL_NOT_FOUND => ExitClass::DllNotFound,
        Some(c) => ExitClass::Failed(c),
        // Killed by a signal.
        None => ExitClass::Failed(-1),
    }
}

/// Progress notification, fire-and-forget.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    /// Simulated time reported by the solver.
    pub time: f64,
    /// `time / total_time`, clamped to [0, 1].
    pub fraction: f64,
}

/// One solver invocation.
pub struct SolveRequest<'a> {
    pub input: &'a Path,
    pub log_path: &'a Path,
    pub work_dir: &'a Path,
    /// Total simulated time from the template's control blocks.
    pub total_time: f64,
}

pub struct SolverDriver<'a> {
    config: &'a PipelineConfig,
}

impl<'a> SolverDriver<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the solver to completion, retrying once with the fallback
    /// executable when the primary exits with dll-not-found.
    pub fn run(
        &self,
        request: &SolveRequest<'_>,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> RunnerResult<()> {
        match self.attempt(&self.config.febio_path, request, cancel, on_progress) {
            Err(RunnerError::SolverFailed(code)) if code == STATUS_DLL_NOT_FOUND => {
                let Some(fallback) = self.config.febio_fallback_path.as_deref() else {
                    return Err(RunnerError::SolverMissingRuntime);
                };
                tracing::warn!(
                    "solver runtime missing, retrying with fallback '{fallback}'"
                );
                match self.attempt(fallback, request, cancel, on_progress) {
                    Err(RunnerError::SolverFailed(code))
                        if code == STATUS_DLL_NOT_FOUND =>
                    {
                        Err(RunnerError::SolverMissingRuntime)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    fn attempt(
        &self,
        executable: &str,
        request: &SolveRequest<'_>,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> RunnerResult<()> {
        tracing::info!(
            "running {} -i {} in {}",
            executable,
            request.input.display(),
            request.work_dir.display()
        );
        let mut child = Command::new(executable)
            .arg("-i")
            .arg(request.input)
            .current_dir(request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                path: PathBuf::from(executable),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Io(std::io::Error::other("child stdout missing")))?;
        let (tx, rx) = sync_channel::<String>(LINE_QUEUE_DEPTH);
        let reader = std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut log = BufWriter::new(File::create(request.log_path)?);
        let outcome = loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    writeln!(log, "{line}")?;
                    if let Some(time) = parse_time_marker(&line) {
                        let fraction = if request.total_time > 0.0 {
                            (time / request.total_time).clamp(0.0, 1.0)
                        } else {
                            0.0
                        };
                        on_progress(ProgressEvent { time, fraction });
                    }
                    if cancel.is_cancelled() {
                        break None;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        break None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Some(child.wait()?);
                }
            }
        };
        log.flush()?;

        // Unblock the reader thread before joining it: a send on the full
        // queue would otherwise wait forever once we stop receiving.
        drop(rx);
        let Some(status) = outcome else {
            self.terminate(&mut child)?;
            let _ = reader.join();
            return Err(RunnerError::Core(CoreError::Cancelled));
        };
        let _ = reader.join();

        match classify_exit(status.code()) {
            ExitClass::Success => Ok(()),
            ExitClass::DllNotFound => Err(RunnerError::SolverFailed(STATUS_DLL_NOT_FOUND)),
            ExitClass::Failed(code) => Err(RunnerError::SolverFailed(code)),
        }
    }

    /// Ask the child to terminate, wait up to the grace period, then kill.
    fn terminate(&self, child: &mut Child) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            unsafe {
                libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
            }
            let deadline = Instant::now() + GRACE_PERIOD;
            while Instant::now() < deadline {
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        child.kill()?;
        child.wait()?;
        Ok(())
    }
}
