//! Multi-stage process runner
//!
//! Stages run strictly one after another. Within a stage, stdout and stderr
//! are drained concurrently and forwarded line by line to an [`OutputSink`].
//! Injected commands run through the platform shell at stage boundaries.

use crate::command::{shell_prefix, Command, Injection};
use crate::error::{BuildError, BuildResult, StageFailure};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{self, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Flags whose following argument is a quoted bundle built by the synthesizer
const FLAG_GROUPS: [&str; 5] = ["-ldflags", "-gcflags", "-asmflags", "-gccgoflags", "-tags"];

/// How a finished stage is judged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Only a non-zero exit fails the stage
    ExitCode,
    /// A non-zero exit or any byte written to stderr fails the stage
    #[default]
    ExitCodeOrStderr,
}

impl FailurePolicy {
    pub fn from_fail_on_stderr(fail_on_stderr: bool) -> Self {
        if fail_on_stderr {
            Self::ExitCodeOrStderr
        } else {
            Self::ExitCode
        }
    }
}

/// Destination for subprocess output lines
pub trait OutputSink: Send + Sync {
    fn stdout_line(&self, line: &str);
    fn stderr_line(&self, line: &str);
}

/// Forwards subprocess output to the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn stdout_line(&self, line: &str) {
        println!("{}", line);
    }

    fn stderr_line(&self, line: &str) {
        eprintln!("{}", line);
    }
}

/// Executes [`Command`] pipelines
#[derive(Clone)]
pub struct ProcessRunner {
    policy: FailurePolicy,
    env: Vec<(String, String)>,
    sink: Arc<dyn OutputSink>,
    last_pid: Arc<AtomicU32>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            policy: FailurePolicy::default(),
            env: Vec::new(),
            sink: Arc::new(ConsoleSink),
            last_pid: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Variables added to the inherited environment of every subprocess.
    /// Later entries win on key collision.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Id of the running stage process, if any
    pub fn pid(&self) -> Option<u32> {
        match self.last_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Forcibly terminate the running stage process
    pub fn kill(&self) -> BuildResult<()> {
        let pid = self.pid().ok_or(BuildError::NoProcess)?;
        let id = pid.to_string();

        let output = if cfg!(windows) {
            process::Command::new("taskkill")
                .args(["/F", "/PID", &id])
                .output()
        } else {
            process::Command::new("kill").args(["-9", &id]).output()
        };

        match output {
            Ok(output) if output.status.success() => {
                debug!(pid, "killed process");
                Ok(())
            }
            Ok(output) => Err(BuildError::KillFailed {
                pid,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(e) => Err(BuildError::KillFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    /// Run every stage of `command`, in `cwd` when given.
    ///
    /// An empty command does nothing. The first failing stage stops the
    /// pipeline once its after-stage injections have run.
    pub fn run(&self, command: &Command, cwd: Option<&Path>) -> BuildResult<()> {
        let stages = command.stages();
        let last = stages.len().saturating_sub(1);

        for (index, stage) in stages.into_iter().enumerate() {
            for injection in command.injections_for(index, true) {
                self.run_injection(index, injection, cwd)?;
            }

            let literal = if index == last {
                command.literal_args()
            } else {
                &[]
            };
            let failure = self.run_stage(index, stage, literal, cwd)?;

            let after = command
                .injections_for(index, false)
                .try_for_each(|injection| self.run_injection(index, injection, cwd));

            if let Some((line, reason)) = failure {
                if let Err(e) = after {
                    warn!(stage = index, error = %e, "after-stage command failed");
                }
                return Err(BuildError::StageFailed {
                    stage: index,
                    command: line,
                    reason,
                });
            }
            after?;
        }
        Ok(())
    }

    /// Launch one stage and wait for it. Returns the command line and the
    /// failure reason when the stage failed.
    ///
    /// `literal` arguments follow the normalized stage tokens untouched.
    fn run_stage(
        &self,
        index: usize,
        stage: &[String],
        literal: &[String],
        cwd: Option<&Path>,
    ) -> BuildResult<Option<(String, StageFailure)>> {
        let mut args = normalize_args(stage);
        args.extend(literal.iter().cloned());
        let Some((program, rest)) = args.split_first() else {
            return Ok(None);
        };
        let line = args.join(" ");
        debug!(stage = index, command = %line, "starting stage");

        let mut process = process::Command::new(program);
        process
            .args(rest)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|e| BuildError::spawn(&line, e))?;
        let pid = child.id();
        self.last_pid.store(pid, Ordering::SeqCst);
        debug!(stage = index, pid, "spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink: &dyn OutputSink = &*self.sink;

        let stderr_bytes = thread::scope(|scope| {
            if let Some(out) = stdout {
                scope.spawn(move || drain(out, |l| sink.stdout_line(l)));
            }
            let errors = stderr.map(|err| scope.spawn(move || drain(err, |l| sink.stderr_line(l))));
            errors.and_then(|handle| handle.join().ok()).unwrap_or(0)
        });

        let status = child.wait().map_err(|e| BuildError::spawn(&line, e));
        let _ = self
            .last_pid
            .compare_exchange(pid, 0, Ordering::SeqCst, Ordering::SeqCst);
        let status = status?;

        let failure = if !status.success() {
            Some(StageFailure::ExitCode(status.code()))
        } else if self.policy == FailurePolicy::ExitCodeOrStderr && stderr_bytes > 0 {
            Some(StageFailure::Stderr {
                bytes: stderr_bytes,
            })
        } else {
            None
        };

        if let Some(reason) = &failure {
            debug!(stage = index, %reason, "stage failed");
        }
        Ok(failure.map(|reason| (line, reason)))
    }

    fn run_injection(&self, stage: usize, injection: &Injection, cwd: Option<&Path>) -> BuildResult<()> {
        debug!(
            stage,
            command = %injection.command,
            before = injection.before,
            "running injected command"
        );

        let mut shell = shell_command(&injection.command);
        shell.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = cwd {
            shell.current_dir(dir);
        }

        let reason = match shell.output() {
            Ok(output) => {
                emit_lines(&output.stdout, |l| self.sink.stdout_line(l));
                emit_lines(&output.stderr, |l| self.sink.stderr_line(l));
                if output.status.success() {
                    return Ok(());
                }
                StageFailure::ExitCode(output.status.code()).to_string()
            }
            Err(e) => e.to_string(),
        };

        if injection.no_error {
            warn!(stage, command = %injection.command, %reason, "injected command failed, continuing");
            return Ok(());
        }

        Err(BuildError::InjectionFailed {
            stage,
            command: injection.command.clone(),
            reason,
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn shell_command(command: &str) -> process::Command {
    let [shell, flag] = shell_prefix();
    let mut cmd = process::Command::new(shell);
    cmd.args([flag, command]);
    cmd
}

/// Forward `reader` line by line and return the number of bytes read
fn drain<R: Read>(reader: R, mut emit: impl FnMut(&str)) -> usize {
    let mut reader = BufReader::new(reader);
    let mut buf: Vec<u8> = Vec::new();
    let mut total = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                let line = String::from_utf8_lossy(&buf);
                emit(line.trim_end_matches(['\n', '\r']));
            }
            Err(_) => break,
        }
    }
    total
}

fn emit_lines(bytes: &[u8], mut emit: impl FnMut(&str)) {
    for line in String::from_utf8_lossy(bytes).lines() {
        emit(line);
    }
}

/// Undo the synthesizer's shell-style quoting before handing tokens to the
/// OS launcher, which does not split or unquote arguments.
pub(crate) fn normalize_args(stage: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(stage.len());
    let mut after_group = false;

    for token in stage {
        let mut arg = token.replace("\\ ", " ");

        if after_group {
            arg = crate::paths::strip_quotes(&arg).to_string();
        } else if let Some((flag, value)) = arg.split_once('=') {
            if FLAG_GROUPS.contains(&flag) {
                arg = format!("{}={}", flag, crate::paths::strip_quotes(value));
            }
        }

        if cfg!(windows) {
            arg = arg.replace('\\', "/");
        }

        after_group = FLAG_GROUPS.contains(&token.as_str());
        args.push(arg);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_strips_bundle_quotes() {
        let stage = strings(&[
            "go",
            "build",
            "-ldflags",
            "\"-X 'main.v=1' -s\"",
            "-tags=\"a,b\"",
            "-gcflags=\"all=-N -l\"",
            "-o",
            "./bin/my\\ app",
        ]);
        assert_eq!(
            normalize_args(&stage),
            strings(&[
                "go",
                "build",
                "-ldflags",
                "-X 'main.v=1' -s",
                "-tags=a,b",
                "-gcflags=all=-N -l",
                "-o",
                "./bin/my app",
            ])
        );
    }

    #[test]
    fn test_normalize_leaves_other_quotes() {
        let stage = strings(&["./bin/app", "\"quoted\"", "--name=\"x\""]);
        assert_eq!(normalize_args(&stage), stage);
    }

    #[test]
    fn test_drain_counts_bytes() {
        let mut lines = Vec::new();
        let bytes = drain("one\ntwo\r\nthree".as_bytes(), |l| lines.push(l.to_string()));
        assert_eq!(bytes, 14);
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_failure_policy_from_flag() {
        assert_eq!(FailurePolicy::from_fail_on_stderr(true), FailurePolicy::ExitCodeOrStderr);
        assert_eq!(FailurePolicy::from_fail_on_stderr(false), FailurePolicy::ExitCode);
        assert_eq!(FailurePolicy::default(), FailurePolicy::ExitCodeOrStderr);
    }

    #[test]
    fn test_kill_without_process() {
        assert!(matches!(ProcessRunner::new().kill(), Err(BuildError::NoProcess)));
    }

    #[test]
    fn test_empty_command_is_noop() {
        assert!(ProcessRunner::new().run(&Command::new(), None).is_ok());
    }
}
