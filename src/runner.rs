//! Process-backed command runner
//!
//! Commands run with piped stdio. Two reader threads drain stdout and stderr
//! while the calling thread owns the `Child` and polls `try_wait` until the
//! deadline, killing the process if it is reached. Reader joins are bounded
//! too: a grandchild that inherited the pipes can keep them open after the
//! child is gone, in which case the reader is abandoned.

use intelligence::{CommandOutput, CommandRunner, Error, ExecOptions};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period for output readers once the child has exited or been killed
const THREAD_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How often an output reader is polled for completion
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs commands on the local machine
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(
        &self,
        command: &str,
        args: &[String],
        opts: &ExecOptions,
    ) -> intelligence::Result<CommandOutput> {
        let command_line = format!("{} {}", command, args.join(" "))
            .trim_end()
            .to_string();
        log::debug!("running command; cmd=\"{command_line}\"");
        let started = Instant::now();

        let mut child = Command::new(command)
            .args(args)
            .envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandFailed {
                command: command_line.clone(),
                exit_code: None,
                stderr: format!("Failed to execute: {e}"),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || drain(stdout));
        let stderr_reader = thread::spawn(move || drain(stderr));

        let status = wait_with_deadline(&mut child, opts.timeout).map_err(|e| {
            Error::CommandFailed {
                command: command_line.clone(),
                exit_code: None,
                stderr: format!("Failed to wait for command: {e}"),
            }
        })?;

        // Readers get the rest of the deadline, and never less than the grace period
        let join_deadline = opts
            .timeout
            .and_then(|timeout| started.checked_add(timeout))
            .map(|deadline| deadline.max(Instant::now() + THREAD_JOIN_TIMEOUT));
        let stdout = join_reader(stdout_reader, join_deadline, &command_line);
        let stderr = join_reader(stderr_reader, join_deadline, &command_line);

        let output = match status {
            Some(status) => CommandOutput {
                exit_code: status.code(),
                stdout,
                stderr,
                failed: !status.success(),
                timed_out: false,
            },
            None => {
                log::warn!(
                    "command timed out after {:?}; cmd=\"{command_line}\"",
                    opts.timeout.unwrap_or_default()
                );
                CommandOutput::timeout(stdout, stderr)
            }
        };

        if opts.reject_on_nonzero && output.failed {
            return Err(Error::CommandFailed {
                command: command_line,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Wait for the child; `None` means it was killed at the deadline
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = timeout.and_then(|timeout| Instant::now().checked_add(timeout)) else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            // Reap so the process does not linger as a zombie
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Collect a reader's output, giving up at the deadline
fn join_reader(
    handle: JoinHandle<String>,
    deadline: Option<Instant>,
    command_line: &str,
) -> String {
    let Some(deadline) = deadline else {
        return handle.join().unwrap_or_default();
    };
    loop {
        if handle.is_finished() {
            return handle.join().unwrap_or_default();
        }
        if Instant::now() >= deadline {
            log::debug!("abandoning output reader; cmd=\"{command_line}\"");
            return String::new();
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_captures_stdout_and_exit_code() {
        let out = SystemRunner
            .execute("sh", &sh("echo hello; echo oops >&2"), &ExecOptions::default())
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.failed);
    }

    #[test]
    fn test_nonzero_exit_is_failed_output() {
        let out = SystemRunner
            .execute("sh", &sh("echo denied >&2; exit 3"), &ExecOptions::default())
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(out.failed);
        assert_eq!(out.stderr.trim(), "denied");
    }

    #[test]
    fn test_nonzero_exit_rejected_when_requested() {
        let err = SystemRunner
            .execute("sh", &sh("exit 1"), &ExecOptions::default().rejecting())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CommandFailed {
                exit_code: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_kills_command() {
        let started = Instant::now();
        let opts = ExecOptions::default().with_timeout(Some(Duration::from_millis(200)));
        let out = SystemRunner.execute("sleep", &["5".to_string()], &opts).unwrap();
        assert!(out.timed_out);
        assert!(out.failed);
        assert_eq!(out.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_bounded_when_grandchild_holds_pipes() {
        // sh is killed at the deadline but its sleep keeps stdout open
        let started = Instant::now();
        let opts = ExecOptions::default().with_timeout(Some(Duration::from_millis(200)));
        let out = SystemRunner
            .execute("sh", &sh("sleep 3; echo done"), &opts)
            .unwrap();
        assert!(out.timed_out);
        assert!(out.failed);
        assert!(!out.stdout.contains("done"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_output_collected_within_timeout() {
        let opts = ExecOptions::default().with_timeout(Some(Duration::from_secs(10)));
        let out = SystemRunner.execute("sh", &sh("echo ready"), &opts).unwrap();
        assert!(!out.timed_out);
        assert_eq!(out.stdout.trim(), "ready");
    }

    #[test]
    fn test_execute_status() {
        let opts = ExecOptions::default();
        assert!(SystemRunner.execute_status("sh", &sh("exit 0"), &opts));
        assert!(!SystemRunner.execute_status("sh", &sh("exit 2"), &opts));
        assert!(!SystemRunner.execute_status("definitely-not-a-real-binary-xyz", &[], &opts));
    }

    #[test]
    fn test_missing_binary() {
        let err = SystemRunner
            .execute("definitely-not-a-real-binary-xyz", &[], &ExecOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }

    #[test]
    fn test_env_is_passed() {
        let opts = ExecOptions {
            env: vec![("VERITECH_TEST".to_string(), "42".to_string())],
            ..Default::default()
        };
        let out = SystemRunner
            .execute("sh", &sh("echo $VERITECH_TEST"), &opts)
            .unwrap();
        assert_eq!(out.stdout.trim(), "42");
    }
}
