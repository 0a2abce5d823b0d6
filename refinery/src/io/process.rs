//! Child process execution with a deadline and bounded output capture.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Limits applied to one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub dropped_bytes: usize,
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Last `max_chars` characters of stderr, for error messages.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let text = text.trim();
        let skip = text.chars().count().saturating_sub(max_chars);
        text.chars().skip(skip).collect()
    }
}

/// Run `cmd`, feed `input` on stdin, and collect stdout/stderr.
///
/// Stdin is fed and both output pipes are drained on helper threads, so a full
/// pipe in either direction cannot outlast the deadline. The child is killed at
/// the deadline.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs(), input_bytes = input.len()))]
pub fn run_with_input(mut cmd: Command, input: &[u8], limits: RunLimits) -> Result<CapturedOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let limit = limits.output_limit_bytes;
    let stdout_reader = thread::spawn(move || drain_limited(stdout, limit));
    let stderr_reader = thread::spawn(move || drain_limited(stderr, limit));

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let input = input.to_vec();
    // Written off-thread so a child that never reads cannot stall the deadline.
    let stdin_writer = thread::spawn(move || {
        if let Err(err) = stdin.write_all(&input) {
            // A child that exits (or is killed) without reading closes the pipe early.
            warn!(err = %err, "child closed stdin before reading all input");
        }
    });

    let (status, timed_out) = match child.wait_timeout(limits.timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = limits.timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("wait command after kill")?, true)
        }
    };

    stdin_writer
        .join()
        .map_err(|_| anyhow!("stdin writer thread panicked"))?;
    let (stdout, stdout_dropped) = join_reader(stdout_reader).context("collect stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_reader).context("collect stderr")?;
    let dropped_bytes = stdout_dropped + stderr_dropped;
    if dropped_bytes > 0 {
        warn!(dropped_bytes, "command output exceeded limit");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        dropped_bytes,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len()).min(n);
        kept.extend_from_slice(&chunk[..room]);
        dropped += n - room;
    }

    Ok((kept, dropped))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits() -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1024,
        }
    }

    #[test]
    fn echoes_stdin() {
        let output = run_with_input(Command::new("cat"), b"hello", limits()).expect("run");
        assert!(output.succeeded());
        assert_eq!(output.stdout, b"hello");
        assert_eq!(output.dropped_bytes, 0);
    }

    #[test]
    fn bounds_captured_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("head -c 5000 /dev/zero");
        let output = run_with_input(cmd, b"", limits()).expect("run");
        assert_eq!(output.stdout.len(), 1024);
        assert_eq!(output.dropped_bytes, 5000 - 1024);
    }

    #[test]
    fn reports_failure_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo boom >&2; exit 3");
        let output = run_with_input(cmd, b"", limits()).expect("run");
        assert!(!output.succeeded());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_tail(100), "boom");
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output = run_with_input(
            cmd,
            b"",
            RunLimits {
                timeout: Duration::from_millis(100),
                output_limit_bytes: 1024,
            },
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.succeeded());
    }

    /// Verifies the deadline holds when the child never reads a large input.
    #[test]
    fn timeout_holds_when_stdin_is_never_read() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let input = vec![b'x'; 4 * 1024 * 1024];
        let started = std::time::Instant::now();
        let output = run_with_input(
            cmd,
            &input,
            RunLimits {
                timeout: Duration::from_millis(200),
                output_limit_bytes: 1024,
            },
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
