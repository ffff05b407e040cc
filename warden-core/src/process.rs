//! `ManagedProcess`: owns exactly one OS process through its entire lifetime.
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use command_group::AsyncCommandGroup;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cmd::Cmd;
use crate::error::Error;
use crate::options::Sink;
use crate::process_helper::{self, Sig};
use crate::state::{in_states, StateMachine};
use crate::status::Status;
use crate::serialize::SerializeToken;

/// `READY → STARTING → RUNNING → (STOPPING | SMART_STOPPING) → (STOPPED | DEAD)`,
/// plus `READY → DEAD` on spawn failure. `STOPPED`/`DEAD` are terminal: once
/// reached, the process is single-use and must not be started again.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum ProcessState {
    Ready,
    Starting,
    Running,
    Stopping,
    SmartStopping,
    Stopped,
    Dead,
}

struct Inner {
    pid: Option<u32>,
    exit_code: Option<i32>,
    command_line: Option<String>,
    wait_task: Option<JoinHandle<()>>,
}

pub struct ManagedProcess {
    id: String,
    name: String,
    cmd: Cmd,
    state: StateMachine<ProcessState>,
    serialize: SerializeToken,
    inner: Mutex<Inner>,
}

fn generate_id() -> String {
    let bits: u64 = rand::random::<u64>() & 0xff_ffff_ffff;
    format!("{bits:010x}")
}

/// Resolve the two configured sinks into stdio handles for the child.
/// `Sink::Stdout` on stderr is approximated by opening a second, independent
/// handle to whatever stdout resolved to (a real fd-dup isn't available
/// through `tokio::process::Command`'s stdio builder).
fn build_stdio(stdout: &Sink, stderr: &Sink) -> Result<(Stdio, Stdio), Error> {
    let open = |path: &std::path::Path| -> Result<std::fs::File, Error> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::IoPath(path.to_path_buf(), "opening log sink", e))
    };
    let stdout_stdio = match stdout {
        Sink::Null | Sink::Stdout => Stdio::null(),
        Sink::Pipe => Stdio::piped(),
        Sink::File(path) => Stdio::from(open(path)?),
    };
    let stderr_stdio = match stderr {
        Sink::Null => Stdio::null(),
        Sink::Pipe => Stdio::piped(),
        Sink::File(path) => Stdio::from(open(path)?),
        Sink::Stdout => match stdout {
            Sink::File(path) => Stdio::from(open(path)?),
            Sink::Pipe => Stdio::piped(),
            _ => Stdio::null(),
        },
    };
    Ok((stdout_stdio, stderr_stdio))
}

impl ManagedProcess {
    pub fn new(name_prefix: impl Into<String>, cmd: Cmd) -> Arc<Self> {
        Arc::new(ManagedProcess {
            id: generate_id(),
            name: name_prefix.into(),
            cmd,
            state: StateMachine::new(ProcessState::Ready),
            serialize: SerializeToken::new(),
            inner: Mutex::new(Inner { pid: None, exit_code: None, command_line: None, wait_task: None }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state.get()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().expect("process mutex poisoned").pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.inner.lock().expect("process mutex poisoned").exit_code
    }

    pub fn command_line(&self) -> Option<String> {
        self.inner.lock().expect("process mutex poisoned").command_line.clone()
    }

    /// Derived health: `RUNNING` for under 5s still counts as `NOK` since a
    /// process that immediately crash-loops never spends meaningful time
    /// here; callers layering the 5s/10s slot-level rule read `state()` and
    /// `state_age()` directly rather than through this helper.
    pub fn status(&self) -> Status {
        match self.state.get() {
            ProcessState::Stopped => Status::Stopped,
            ProcessState::Dead => Status::Nok,
            ProcessState::Running => Status::Ok,
            ProcessState::Ready | ProcessState::Starting | ProcessState::Stopping | ProcessState::SmartStopping => {
                Status::Warning
            }
        }
    }

    pub fn state_age(&self) -> Duration {
        Duration::from_secs_f64(self.state.seconds_since_last_change())
    }

    pub fn state_since_seconds(&self) -> f64 {
        self.state.seconds_since_last_change()
    }

    /// Guarded (`READY` only, serialized). Spawns the OS process and blocks
    /// until the background wait-for-exit task has begun executing.
    pub async fn start(self: &Arc<Self>) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[ProcessState::Ready]) {
            return;
        }
        self.state.set(ProcessState::Starting);

        self.inner.lock().expect("process mutex poisoned").command_line = Some(self.cmd.command_line());

        let spawned = self.try_spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(process = %self.id, error = %err, "failed to spawn process");
                self.state.set(ProcessState::Dead);
                return;
            }
        };

        let pid = child.id();
        self.inner.lock().expect("process mutex poisoned").pid = pid;
        self.state.set(ProcessState::Running);

        let (ready_tx, ready_rx) = oneshot::channel();
        let me = self.clone();
        let task = tokio::spawn(async move {
            let _ = ready_tx.send(());
            me.run_wait_for_exit(&mut child).await;
        });
        self.inner.lock().expect("process mutex poisoned").wait_task = Some(task);
        let _ = ready_rx.await;
    }

    fn try_spawn(&self) -> Result<command_group::AsyncGroupChild, Error> {
        let program = self.cmd.resolved_program()?;
        let args = self.cmd.resolved_args()?;
        let stdout_sink = self.cmd.stdout_sink()?;
        let stderr_sink = self.cmd.stderr_sink()?;
        let options = self.cmd.options();

        let mut command = if options.needs_external_wrapper(&stdout_sink, &stderr_sink) {
            self.wrap_with_external_log_writer(&program, &args, &stdout_sink, &stderr_sink)
        } else {
            let (stdout_stdio, stderr_stdio) = build_stdio(&stdout_sink, &stderr_sink)?;
            let mut command = Command::new(&program);
            command.args(&args).stdin(Stdio::null()).stdout(stdout_stdio).stderr(stderr_stdio);
            command
        };

        command.envs(self.cmd.envs());
        command.group_spawn().map_err(|err| Error::Spawn(err.to_string()))
    }

    /// Delegates stdout/stderr capture to `warden-log-writer`, a separate
    /// rotating-file process the supervised program's own stdio is piped
    /// into, rather than writing rotated files from inside this process.
    fn wrap_with_external_log_writer(
        &self,
        program: &str,
        args: &[String],
        stdout_sink: &Sink,
        stderr_sink: &Sink,
    ) -> Command {
        let options = self.cmd.options();
        let mut command = Command::new("warden-log-writer");
        command
            .arg(format!("--rotation-size={}", options.stdxxx_rotation_size))
            .arg(format!("--rotation-time={}", options.stdxxx_rotation_time))
            .arg(format!("--stdout={}", stdout_sink.as_wrapper_arg()))
            .arg(format!("--stderr={}", stderr_sink.as_wrapper_arg()))
            .arg("--")
            .arg(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    async fn run_wait_for_exit(self: Arc<Self>, child: &mut command_group::AsyncGroupChild) {
        match child.wait().await {
            Ok(exit_status) => {
                // A process killed by a signal has no exit code; record
                // `-signal_number` instead, matching how a POSIX shell's `$?`
                // reports it.
                use std::os::unix::process::ExitStatusExt;
                let code = exit_status.code().or_else(|| exit_status.signal().map(|sig| -sig));
                let mut inner = self.inner.lock().expect("process mutex poisoned");
                inner.exit_code = Some(code.unwrap_or(-1));
                inner.pid = None;
                drop(inner);
                if code == Some(0) {
                    self.state.set(ProcessState::Stopped);
                } else {
                    self.state.set(ProcessState::Dead);
                }
            }
            Err(err) => {
                tracing::error!(process = %self.id, error = %err, "failed to wait for process exit");
                self.inner.lock().expect("process mutex poisoned").pid = None;
                self.state.set(ProcessState::Dead);
            }
        }
    }

    /// Blocks until the process has terminated. If the call lands mid-spawn
    /// it first rides out `STARTING` before settling into the terminal wait.
    pub async fn wait(&self) {
        while self.state.get() == ProcessState::Starting {
            self.state.wait_for_change(Duration::from_secs(1)).await;
        }
        loop {
            if matches!(self.state.get(), ProcessState::Stopped | ProcessState::Dead) {
                return;
            }
            self.state.wait_for_change(Duration::from_secs(1)).await;
        }
    }

    /// Guarded (`RUNNING` only, serialized). Tries the configured smart-stop
    /// signal first, falling back to SIGKILL on timeout or if smart-stop is
    /// disabled.
    pub async fn stop(&self) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[ProcessState::Running]) {
            return;
        }
        if !self.cmd.options().smart_stop {
            self.non_smart_stop().await;
            return;
        }

        self.state.set(ProcessState::SmartStopping);
        if let Some(pid) = self.pid() {
            let signal = Sig::Raw(self.cmd.options().smart_stop_signal);
            if let Err(err) = process_helper::signal_leader(pid, signal) {
                tracing::warn!(process = %self.id, error = %err, "failed to send smart-stop signal");
            }
        }

        let timeout = Duration::from_secs_f64(self.cmd.options().smart_stop_timeout);
        if tokio::time::timeout(timeout, self.wait()).await.is_ok() {
            return;
        }
        self.non_smart_stop().await;
    }

    async fn non_smart_stop(&self) {
        self.state.set(ProcessState::Stopping);
        if let Some(pid) = self.pid() {
            let result = if self.cmd.options().recursive_sigkill {
                process_helper::signal_group(pid, Sig::Kill)
            } else {
                process_helper::signal_leader(pid, Sig::Kill)
            };
            if let Err(err) = result {
                tracing::warn!(process = %self.id, error = %err, "failed to deliver SIGKILL");
            }
        }
        self.wait().await;
    }

    /// Synchronous, non-serialized. Only valid while `RUNNING` or
    /// `SMART_STOPPING`; used by top-down forced shutdown. When `signal` is
    /// `Sig::Kill` and `recursive_sigkill` is set, descends to the whole
    /// process group rather than just the leader.
    pub async fn kill(&self, signal: Sig) {
        if !in_states(&self.state.get(), &[ProcessState::Running, ProcessState::SmartStopping]) {
            return;
        }
        if let Some(pid) = self.pid() {
            let result = if signal == Sig::Kill && self.cmd.options().recursive_sigkill {
                process_helper::signal_group(pid, signal)
            } else {
                process_helper::signal_leader(pid, signal)
            };
            if let Err(err) = result {
                tracing::warn!(process = %self.id, error = %err, "failed to deliver signal");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::options::Options;

    fn cmd(program: &str, args: &[&str], options: Options) -> Cmd {
        Cmd::new(program, args.iter().map(|s| s.to_string()).collect(), Arc::new(options))
    }

    #[tokio::test]
    async fn clean_self_exit_reaches_stopped() {
        let process = ManagedProcess::new("test", cmd("true", &[], Options::default()));
        process.start().await;
        process.wait().await;
        assert_eq!(process.state(), ProcessState::Stopped);
        assert_eq!(process.exit_code(), Some(0));
        assert!(process.pid().is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_reaches_dead() {
        let process = ManagedProcess::new("test", cmd("false", &[], Options::default()));
        process.start().await;
        process.wait().await;
        assert_eq!(process.state(), ProcessState::Dead);
        assert_eq!(process.exit_code(), Some(1));
    }

    #[tokio::test]
    async fn spawn_failure_goes_straight_to_dead() {
        let process = ManagedProcess::new("test", cmd("/no/such/binary-xyz", &[], Options::default()));
        process.start().await;
        assert_eq!(process.state(), ProcessState::Dead);
    }

    #[tokio::test]
    async fn smart_stop_exits_cleanly_when_process_cooperates() {
        let opts = Options { smart_stop: true, smart_stop_timeout: 2.0, ..Options::default() };
        let process = ManagedProcess::new(
            "test",
            cmd("sh", &["-c", "trap 'exit 0' TERM; sleep 30 & wait"], opts),
        );
        process.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        process.stop().await;
        assert!(matches!(process.state(), ProcessState::Stopped | ProcessState::Dead));
    }

    #[tokio::test]
    async fn smart_stop_escalates_to_sigkill_on_timeout() {
        let opts = Options {
            smart_stop: true,
            smart_stop_timeout: 0.2,
            smart_stop_signal: 15,
            ..Options::default()
        };
        let process =
            ManagedProcess::new("test", cmd("sh", &["-c", "trap '' TERM; sleep 30"], opts));
        process.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        process.stop().await;
        assert_eq!(process.state(), ProcessState::Dead);
    }

    #[tokio::test]
    async fn start_is_rejected_once_terminal() {
        let process = ManagedProcess::new("test", cmd("true", &[], Options::default()));
        process.start().await;
        process.wait().await;
        process.start().await;
        assert_eq!(process.state(), ProcessState::Stopped);
    }
}
