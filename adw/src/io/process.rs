//! Running external commands with a hard timeout and optional live output.
//!
//! This is the containment boundary for subprocess failures: launch errors,
//! non-zero exits and timeouts are all reported through [`CommandOutcome`]
//! and never as `Err`.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::truncate_to_boundary;

/// Default bound on captured output per stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 4 * 1024 * 1024;

/// Prefix of the marker appended to output when a command is killed on timeout.
pub const TIMEOUT_MARKER_PREFIX: &str = "[command timed out after";

/// How often the child is polled for exit while output is being collected.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep reading after exit for output still in flight.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How output is surfaced while the command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Capture everything, surface nothing until exit. Output is stdout then stderr.
    Buffered,
    /// Forward each line to an observer as it arrives. Output is interleaved.
    Streaming,
}

/// Receives output lines in streaming mode, without the trailing newline.
pub trait LineObserver {
    fn on_line(&mut self, line: &str);
}

impl<F: FnMut(&str)> LineObserver for F {
    fn on_line(&mut self, line: &str) {
        self(line);
    }
}

/// Echoes streamed lines to stdout, indented under the phase progress trace.
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl LineObserver for ConsoleObserver {
    fn on_line(&mut self, line: &str) {
        println!("   {line}");
    }
}

/// One command to run.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub argv: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub stdin: Option<String>,
    pub timeout: Duration,
    pub mode: StreamMode,
    /// When set, the final output is also written here before returning.
    pub output_file: Option<PathBuf>,
    pub output_limit_bytes: usize,
}

impl CommandRequest {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            workdir: None,
            stdin: None,
            timeout,
            mode: StreamMode::Buffered,
            output_file: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn workdir(mut self, dir: Option<&Path>) -> Self {
        self.workdir = dir.map(Path::to_path_buf);
        self
    }

    pub fn stdin(mut self, text: Option<String>) -> Self {
        self.stdin = text;
        self
    }

    pub fn mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn output_file(mut self, path: Option<&Path>) -> Self {
        self.output_file = path.map(Path::to_path_buf);
        self
    }

    pub fn output_limit_bytes(mut self, limit: usize) -> Self {
        self.output_limit_bytes = limit;
        self
    }
}

/// What happened when a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// True only when the process exited with status 0 before the deadline.
    pub success: bool,
    /// Combined output, or the launch error text when the process never started.
    pub output: String,
    /// Captured stderr on its own, for callers that need an error excerpt.
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutcome {
    fn launch_failure(message: String) -> Self {
        Self {
            success: false,
            output: message,
            stderr: String::new(),
            exit_code: None,
            timed_out: false,
        }
    }
}

/// Run a command, echoing streamed lines to the console in streaming mode.
pub fn execute(request: &CommandRequest) -> CommandOutcome {
    execute_with_observer(request, &mut ConsoleObserver)
}

/// Run a command, sending streamed lines to `observer` in streaming mode.
#[instrument(skip_all, fields(program = request.argv.first().map(String::as_str).unwrap_or(""), timeout_secs = request.timeout.as_secs(), mode = ?request.mode))]
pub fn execute_with_observer(
    request: &CommandRequest,
    observer: &mut dyn LineObserver,
) -> CommandOutcome {
    let outcome = run(request, observer);
    if let Some(path) = &request.output_file
        && let Err(err) = write_output_file(path, &outcome.output)
    {
        warn!(path = %path.display(), err = %err, "failed to write command output file");
    }
    debug!(
        success = outcome.success,
        exit_code = ?outcome.exit_code,
        timed_out = outcome.timed_out,
        "command finished"
    );
    outcome
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output accumulated under a byte limit, counting what was dropped.
#[derive(Debug, Default)]
struct Bounded {
    text: String,
    truncated: usize,
}

impl Bounded {
    fn push(&mut self, chunk: &str, limit: usize) {
        let remaining = limit.saturating_sub(self.text.len());
        if chunk.len() <= remaining {
            self.text.push_str(chunk);
        } else {
            let kept = truncate_to_boundary(chunk, remaining);
            self.text.push_str(kept);
            self.truncated += chunk.len() - kept.len();
        }
    }
}

fn run(request: &CommandRequest, observer: &mut dyn LineObserver) -> CommandOutcome {
    let Some((program, args)) = request.argv.split_first() else {
        return CommandOutcome::launch_failure("failed to launch command: empty argv".to_string());
    };

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = &request.workdir {
        cmd.current_dir(dir);
    }
    if request.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn command");
            return CommandOutcome::launch_failure(format!("failed to launch {program}: {err}"));
        }
    };

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, Stream::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, Stream::Stderr, tx.clone());
    }
    drop(tx);

    if let (Some(input), Some(mut child_stdin)) = (request.stdin.clone(), child.stdin.take()) {
        // A separate writer keeps a child that ignores stdin from blocking us on a full pipe.
        thread::spawn(move || {
            if let Err(err) = child_stdin.write_all(input.as_bytes()) {
                debug!(err = %err, "child closed stdin early");
            }
        });
    }

    let deadline = Instant::now() + request.timeout;
    let mut collector = Collector::new(request.mode, request.output_limit_bytes, observer);

    let mut timed_out = false;
    let mut status = None;
    loop {
        match child.try_wait() {
            Ok(Some(exited)) => {
                status = Some(exited);
                break;
            }
            Ok(None) => {}
            Err(err) => {
                error!(err = %err, "failed to wait for command");
                collector.note(&format!("failed to wait for {program}: {err}"));
                break;
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            timed_out = true;
            break;
        }
        match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok((stream, line)) => collector.accept(stream, &line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // Both pipes closed, so only the exit status is left to collect.
                let remaining = deadline.saturating_duration_since(Instant::now());
                match child.wait_timeout(remaining) {
                    Ok(Some(exited)) => status = Some(exited),
                    Ok(None) => timed_out = true,
                    Err(err) => {
                        error!(err = %err, "failed to wait for command");
                        collector.note(&format!("failed to wait for {program}: {err}"));
                    }
                }
                break;
            }
        }
    }

    if status.is_some() && !collector.drain_until(&rx, Instant::now() + EXIT_DRAIN_GRACE) {
        // A background process still holds the pipes; the command itself is done.
        debug!("output pipes still open after exit");
    }
    let exit_code = status.and_then(|s| s.code());
    let exited_ok = status.is_some_and(|s| s.success());

    if timed_out {
        warn!(
            timeout_secs = request.timeout.as_secs(),
            "command timed out, killing"
        );
        if let Err(err) = child.kill() {
            debug!(err = %err, "kill after timeout failed");
        }
        let _ = child.wait();
        // Readers may still be blocked if a grandchild holds the pipes; take what already arrived.
        for (stream, line) in rx.try_iter() {
            collector.accept(stream, &line);
        }
    }

    let (mut output, stderr) = collector.finish();
    if timed_out {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&format!(
            "{TIMEOUT_MARKER_PREFIX} {}s]",
            request.timeout.as_secs_f64()
        ));
    }

    CommandOutcome {
        success: exited_ok && !timed_out,
        output,
        stderr,
        exit_code,
        timed_out,
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx
                        .send((stream, String::from_utf8_lossy(&line).into_owned()))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    debug!(err = %err, "output reader stopped");
                    break;
                }
            }
        }
    });
}

struct Collector<'a> {
    mode: StreamMode,
    limit: usize,
    observer: &'a mut dyn LineObserver,
    stdout: Bounded,
    stderr: Bounded,
    combined: Bounded,
}

impl<'a> Collector<'a> {
    fn new(mode: StreamMode, limit: usize, observer: &'a mut dyn LineObserver) -> Self {
        Self {
            mode,
            limit,
            observer,
            stdout: Bounded::default(),
            stderr: Bounded::default(),
            combined: Bounded::default(),
        }
    }

    /// Consume lines until both readers finish. Returns false if the deadline passed first.
    fn drain_until(&mut self, rx: &Receiver<(Stream, String)>, deadline: Instant) -> bool {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match rx.recv_timeout(remaining) {
                Ok((stream, line)) => self.accept(stream, &line),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return true,
            }
        }
    }

    fn accept(&mut self, stream: Stream, line: &str) {
        if self.mode == StreamMode::Streaming {
            self.observer
                .on_line(line.trim_end_matches(['\n', '\r']));
            self.combined.push(line, self.limit.saturating_mul(2));
        }
        match stream {
            Stream::Stdout => self.stdout.push(line, self.limit),
            Stream::Stderr => self.stderr.push(line, self.limit),
        }
    }

    fn note(&mut self, message: &str) {
        let line = format!("{message}\n");
        self.stderr.push(&line, self.limit);
        self.combined.push(&line, self.limit.saturating_mul(2));
    }

    fn finish(self) -> (String, String) {
        let truncated = self.stdout.truncated + self.stderr.truncated;
        if truncated > 0 {
            warn!(
                stdout_truncated = self.stdout.truncated,
                stderr_truncated = self.stderr.truncated,
                "output truncated"
            );
        }

        let mut output = match self.mode {
            StreamMode::Streaming => self.combined.text,
            StreamMode::Buffered => {
                let mut text = self.stdout.text;
                text.push_str(&self.stderr.text);
                text
            }
        };
        if truncated > 0 {
            output.push_str(&format!("\n[output truncated {truncated} bytes]\n"));
        }
        (output, self.stderr.text)
    }
}

fn write_output_file(path: &Path, output: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn buffered_output_is_stdout_then_stderr() {
        let request = CommandRequest::new(sh("echo err 1>&2; echo out"), Duration::from_secs(10));
        let outcome = execute(&request);
        assert!(outcome.success);
        assert_eq!(outcome.output, "out\nerr\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[test]
    fn non_zero_exit_is_failure_not_timeout() {
        let request = CommandRequest::new(sh("echo nope; exit 3"), Duration::from_secs(10));
        let outcome = execute(&request);
        assert!(!outcome.success);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.output.contains(TIMEOUT_MARKER_PREFIX));
    }

    /// Timeouts kill the child and keep what it printed before the deadline.
    #[test]
    fn timeout_is_distinguishable_and_keeps_partial_output() {
        let request = CommandRequest::new(
            sh("echo started; exec sleep 5"),
            Duration::from_millis(300),
        );
        let started = Instant::now();
        let outcome = execute(&request);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert!(outcome.output.starts_with("started\n"));
        assert!(outcome.output.contains(TIMEOUT_MARKER_PREFIX));
    }

    #[test]
    fn background_process_holding_pipes_does_not_mask_success() {
        let request = CommandRequest::new(sh("echo done; sleep 3 & exit 0"), Duration::from_secs(1));
        let started = Instant::now();
        let outcome = execute(&request);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(outcome.success, "output: {}", outcome.output);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.output, "done\n");
    }

    #[test]
    fn streaming_timeout_keeps_streamed_lines() {
        let request = CommandRequest::new(
            sh("echo first; echo second 1>&2; exec sleep 5"),
            Duration::from_millis(500),
        )
        .mode(StreamMode::Streaming);
        let mut seen = Vec::new();
        let outcome =
            execute_with_observer(&request, &mut |line: &str| seen.push(line.to_string()));
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(seen.contains(&"first".to_string()));
        assert!(seen.contains(&"second".to_string()));
        assert!(outcome.output.contains("first\n"));
        assert!(outcome.output.contains("second\n"));
        assert!(outcome.output.ends_with("[command timed out after 0.5s]"));
    }

    #[test]
    fn launch_failure_is_contained() {
        let request = CommandRequest::new(
            vec!["/nonexistent/adw-test-binary".to_string()],
            Duration::from_secs(1),
        );
        let outcome = execute(&request);
        assert!(!outcome.success);
        assert!(!outcome.timed_out);
        assert!(outcome.output.contains("failed to launch"));
    }

    #[test]
    fn empty_argv_is_contained() {
        let outcome = execute(&CommandRequest::new(Vec::new(), Duration::from_secs(1)));
        assert!(!outcome.success);
    }

    #[test]
    fn streaming_forwards_lines_in_order() {
        let request = CommandRequest::new(sh("printf 'a\\nb\\nc\\n'"), Duration::from_secs(10))
            .mode(StreamMode::Streaming);
        let mut seen = Vec::new();
        let outcome = execute_with_observer(&request, &mut |line: &str| seen.push(line.to_string()));
        assert!(outcome.success);
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(outcome.output, "a\nb\nc\n");
    }

    #[test]
    fn buffered_mode_does_not_call_observer() {
        let request = CommandRequest::new(sh("echo quiet"), Duration::from_secs(10));
        let mut calls = 0;
        let outcome = execute_with_observer(&request, &mut |_: &str| calls += 1);
        assert!(outcome.success);
        assert_eq!(calls, 0);
    }

    #[test]
    fn stdin_is_forwarded() {
        let request = CommandRequest::new(vec!["cat".to_string()], Duration::from_secs(10))
            .stdin(Some("hello\nworld".to_string()));
        let outcome = execute(&request);
        assert!(outcome.success);
        assert_eq!(outcome.output, "hello\nworld");
    }

    #[test]
    fn runs_in_requested_workdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("marker.txt"), "here").expect("write marker");
        let request = CommandRequest::new(sh("cat marker.txt"), Duration::from_secs(10))
            .workdir(Some(dir.path()));
        let outcome = execute(&request);
        assert_eq!(outcome.output, "here");
    }

    #[test]
    fn output_file_is_written_even_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agents/run1/planner/raw_output.txt");
        let request = CommandRequest::new(sh("echo boom; exit 1"), Duration::from_secs(10))
            .output_file(Some(&path));
        let outcome = execute(&request);
        assert!(!outcome.success);
        let written = fs::read_to_string(&path).expect("read output file");
        assert_eq!(written, outcome.output);
        assert_eq!(written, "boom\n");
    }

    #[test]
    fn output_limit_truncates_with_notice() {
        let request = CommandRequest::new(sh("printf '0123456789'"), Duration::from_secs(10))
            .output_limit_bytes(4);
        let outcome = execute(&request);
        assert!(outcome.output.starts_with("0123"));
        assert!(outcome.output.contains("[output truncated 6 bytes]"));
    }
}
