// Shell Executor
// Runs a node's commands through the system shell, streaming output

use super::{LogSink, StepFailure};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long output readers may run on after a timed out command is killed
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Configuration for shell execution
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Working directory for every command (inherited when `None`)
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Per-command timeout (None = no timeout)
    pub timeout: Option<Duration>,
}

/// Output collected from one command
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (if available)
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs each command with `sh -c`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: PathBuf,
    config: ShellConfig,
}

impl ShellExecutor {
    pub fn new(config: ShellConfig) -> Self {
        let shell = which::which("sh").unwrap_or_else(|_| PathBuf::from("sh"));
        Self { shell, config }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Run commands in order, stopping at the first one that fails.
    ///
    /// The failure's diagnostic is whatever that command wrote to stderr.
    pub async fn run_commands(&self, commands: &[String], sink: &LogSink) -> Result<(), StepFailure> {
        for command in commands {
            sink.command_started(command);
            let started = Instant::now();
            let output = self.run_command(command, sink).await?;
            sink.command_completed(command, output.exit_code, started.elapsed());

            if output.timed_out {
                return Err(StepFailure::new(
                    format!("command `{}` timed out", command),
                    output.stderr,
                ));
            }
            if !output.success() {
                let status = output
                    .exit_code
                    .map(|code| format!("exit code {}", code))
                    .unwrap_or_else(|| "a signal".to_string());
                return Err(StepFailure::new(
                    format!("command `{}` terminated with {}", command, status),
                    output.stderr,
                ));
            }
        }
        Ok(())
    }

    /// Execute a single command, forwarding each output line to the sink
    pub async fn run_command(&self, command: &str, sink: &LogSink) -> Result<ShellOutput, StepFailure> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c");
        cmd.arg(command);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.config.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(node = %sink.node(), command, "spawning shell command");
        let mut child = cmd.spawn().map_err(|e| {
            StepFailure::new(
                format!("failed to spawn shell process '{}'", self.shell.display()),
                e.to_string(),
            )
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(StepFailure::new("shell output was not captured", String::new()));
        };

        let mut stdout_handle = tokio::spawn(drain_output(stdout, sink.clone(), false));
        let mut stderr_handle = tokio::spawn(drain_output(stderr, sink.clone(), true));

        let (wait_result, timed_out) = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => (result, false),
                Err(_) => {
                    kill_process_group(&child);
                    let _ = child.kill().await;
                    (child.wait().await, true)
                }
            },
            None => (child.wait().await, false),
        };

        let exit_code = wait_result.ok().and_then(|status| status.code());
        let (stdout, mut stderr) = if timed_out {
            // Anything that escaped the kill may still hold the pipes open.
            (
                collect_within(&mut stdout_handle, OUTPUT_GRACE).await,
                collect_within(&mut stderr_handle, OUTPUT_GRACE).await,
            )
        } else {
            (
                stdout_handle.await.unwrap_or_default(),
                stderr_handle.await.unwrap_or_default(),
            )
        };
        if timed_out {
            if let Some(limit) = self.config.timeout {
                if !stderr.is_empty() {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("process timed out after {:?}", limit));
            }
        }

        Ok(ShellOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }
}

/// Forward every line of `reader` to the sink until EOF.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read,
/// so the child never sees a closed pipe.
async fn drain_output<R>(reader: R, sink: LogSink, is_error: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut output = String::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(&['\n', '\r'][..]);
                sink.line(line, is_error);
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(line);
            }
            Err(e) => {
                debug!(node = %sink.node(), error = %e, "output stream closed");
                break;
            }
        }
    }
    output
}

async fn collect_within(handle: &mut JoinHandle<String>, grace: Duration) -> String {
    match tokio::time::timeout(grace, &mut *handle).await {
        Ok(output) => output.unwrap_or_default(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}
