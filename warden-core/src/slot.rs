//! `ProcessSlot`: a replica position that keeps exactly one process alive
//! according to restart policy.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};

use crate::cmd::Cmd;
use crate::process::{ManagedProcess, ProcessState};
use crate::process_helper::Sig;
use crate::serialize::SerializeToken;
use crate::state::{in_states, StateMachine};
use crate::status::Status;

/// `STOPPED ↔ STARTING → RUNNING → (STOPPING → STOPPED) | (self-exit →
/// WAITING_FOR_RESTART → STARTING) | (self-exit, autorespawn off →
/// STOPPED)`, with `SHUTDOWN` terminal and reachable from any non-terminal
/// state.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum SlotState {
    Stopped,
    Starting,
    Running,
    Stopping,
    WaitingForRestart,
    Shutdown,
}

struct Inner {
    process: Option<Arc<ManagedProcess>>,
    backoff_task: Option<AbortHandle>,
    supervisor_task: Option<JoinHandle<()>>,
}

pub struct ProcessSlot {
    service_name: String,
    index: usize,
    cmd: Cmd,
    state: StateMachine<SlotState>,
    serialize: SerializeToken,
    inner: Mutex<Inner>,
}

impl ProcessSlot {
    /// Spawns the background supervisor task immediately; the slot starts
    /// `STOPPED`. `base_cmd` is cloned with a `SLOT=<index>` context
    /// variable so templating can address the slot's own index.
    pub fn new(service_name: impl Into<String>, index: usize, base_cmd: Cmd) -> Arc<Self> {
        let service_name = service_name.into();
        let cmd = base_cmd.with_context_var("SLOT", index.to_string());
        let slot = Arc::new(ProcessSlot {
            service_name,
            index,
            cmd,
            state: StateMachine::new(SlotState::Stopped),
            serialize: SerializeToken::new(),
            inner: Mutex::new(Inner { process: None, backoff_task: None, supervisor_task: None }),
        });
        let supervisor = slot.clone();
        let handle = tokio::spawn(async move { supervisor.supervise().await });
        slot.inner.lock().expect("slot mutex poisoned").supervisor_task = Some(handle);
        slot
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.service_name, self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state.get()
    }

    pub fn state_since_seconds(&self) -> f64 {
        self.state.seconds_since_last_change()
    }

    pub fn process_snapshot(&self) -> Option<Arc<ManagedProcess>> {
        self.inner.lock().expect("slot mutex poisoned").process.clone()
    }

    /// `STOPPED`/`SHUTDOWN` → `STOPPED`; `WAITING_FOR_RESTART` → `NOK`;
    /// `RUNNING`/`STARTING` for under 5s → `NOK`; `RUNNING` for 10s or more
    /// → `OK`; otherwise `WARNING` (the 5-10s gap, and `STARTING` past 5s).
    pub fn status(&self) -> Status {
        let age = self.state.seconds_since_last_change();
        match self.state.get() {
            SlotState::Stopped | SlotState::Shutdown => Status::Stopped,
            SlotState::WaitingForRestart => Status::Nok,
            SlotState::Running if age < 5.0 => Status::Nok,
            SlotState::Starting if age < 5.0 => Status::Nok,
            SlotState::Running if age >= 10.0 => Status::Ok,
            _ => Status::Warning,
        }
    }

    async fn supervise(self: Arc<Self>) {
        loop {
            if self.state.get() == SlotState::Shutdown {
                return;
            }
            if self.state.get() != SlotState::Running {
                self.state.wait_for_change(Duration::from_secs(1)).await;
                continue;
            }

            let process = self.inner.lock().expect("slot mutex poisoned").process.clone();
            let Some(process) = process else {
                // start() is between installing the process and flipping the
                // state; give it a moment rather than busy-loop.
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            };
            process.wait().await;
            self.inner.lock().expect("slot mutex poisoned").process = None;

            if self.state.get() != SlotState::Running {
                // stop()/shutdown() already observed this exit and moved
                // state on; nothing left for us to do.
                continue;
            }

            if !self.cmd.options().autorespawn {
                self.state.set(SlotState::Stopped);
                continue;
            }

            self.state.set(SlotState::WaitingForRestart);
            let delay = Duration::from_secs_f64(self.cmd.options().waiting_for_restart_delay);
            let backoff = tokio::spawn(tokio::time::sleep(delay));
            self.inner.lock().expect("slot mutex poisoned").backoff_task = Some(backoff.abort_handle());
            let _ = backoff.await;
            self.inner.lock().expect("slot mutex poisoned").backoff_task = None;
            self.autorestart().await;
        }
    }

    /// The common tail of `start()`/`autorestart()`: `STARTING` → spawn a
    /// fresh `ManagedProcess` → start it → `RUNNING`.
    async fn spawn_and_run(self: &Arc<Self>) {
        self.state.set(SlotState::Starting);
        let process = ManagedProcess::new(self.key(), self.cmd.clone());
        process.start().await;
        self.inner.lock().expect("slot mutex poisoned").process = Some(process);
        self.state.set(SlotState::Running);
    }

    /// Guarded (`STOPPED` or `WAITING_FOR_RESTART`, serialized). Cancels a
    /// pending backoff first if one is active.
    pub async fn start(self: &Arc<Self>) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[SlotState::Stopped, SlotState::WaitingForRestart]) {
            return;
        }
        if let Some(handle) = self.inner.lock().expect("slot mutex poisoned").backoff_task.take() {
            handle.abort();
        }
        self.spawn_and_run().await;
    }

    /// Same final path as `start()`, but uses the no-wait serialization mode
    /// and is only valid from `WAITING_FOR_RESTART`: a concurrent
    /// user-issued `stop()` racing the backoff wins outright, and this call
    /// is silently dropped rather than queued behind it.
    async fn autorestart(self: &Arc<Self>) {
        let Some(_permit) = self.serialize.try_acquire() else {
            return;
        };
        if !in_states(&self.state.get(), &[SlotState::WaitingForRestart]) {
            return;
        }
        self.spawn_and_run().await;
    }

    async fn stop_locked(&self) {
        match self.state.get() {
            SlotState::WaitingForRestart => {
                if let Some(handle) = self.inner.lock().expect("slot mutex poisoned").backoff_task.take() {
                    handle.abort();
                }
                self.state.set(SlotState::Stopped);
            }
            SlotState::Running => {
                self.state.set(SlotState::Stopping);
                let process = self.inner.lock().expect("slot mutex poisoned").process.clone();
                if let Some(process) = process {
                    process.stop().await;
                }
                self.state.set(SlotState::Stopped);
            }
            _ => {}
        }
    }

    /// Guarded (`RUNNING` or `WAITING_FOR_RESTART`, serialized).
    pub async fn stop(&self) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[SlotState::Running, SlotState::WaitingForRestart]) {
            return;
        }
        self.stop_locked().await;
    }

    /// Guarded (`STOPPED`, `RUNNING`, or `WAITING_FOR_RESTART`). Terminal:
    /// awaits the supervisor task's own exit before returning.
    pub async fn shutdown(&self) {
        {
            let _permit = self.serialize.acquire().await;
            if !in_states(
                &self.state.get(),
                &[SlotState::Stopped, SlotState::Running, SlotState::WaitingForRestart],
            ) {
                return;
            }
            self.stop_locked().await;
            self.state.set(SlotState::Shutdown);
        }
        let task = self.inner.lock().expect("slot mutex poisoned").supervisor_task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Synchronous; only in `RUNNING` or `STOPPING`; forwards to the
    /// current `ManagedProcess`.
    pub async fn kill(&self, signal: Sig) {
        if !in_states(&self.state.get(), &[SlotState::Running, SlotState::Stopping]) {
            return;
        }
        let process = self.inner.lock().expect("slot mutex poisoned").process.clone();
        if let Some(process) = process {
            process.kill(signal).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::options::Options;

    fn slot_with(program: &str, args: &[&str], options: Options) -> Arc<ProcessSlot> {
        let cmd = Cmd::new(program, args.iter().map(|s| s.to_string()).collect(), Arc::new(options));
        ProcessSlot::new("svc", 0, cmd)
    }

    #[tokio::test]
    async fn start_then_stop_reaches_stopped() {
        let slot = slot_with("sleep", &["5"], Options::default());
        slot.start().await;
        assert_eq!(slot.state(), SlotState::Running);
        slot.stop().await;
        assert_eq!(slot.state(), SlotState::Stopped);
    }

    #[tokio::test]
    async fn self_exit_with_autorespawn_reaches_waiting_then_running_again() {
        let opts = Options { autorespawn: true, waiting_for_restart_delay: 0.05, ..Options::default() };
        let slot = slot_with("true", &[], opts);
        slot.start().await;
        // Give the supervisor loop time to observe the exit, wait out the
        // backoff and land a fresh process.
        for _ in 0..50 {
            if slot.state() == SlotState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(slot.state(), SlotState::Running);
    }

    #[tokio::test]
    async fn self_exit_without_autorespawn_reaches_stopped() {
        let opts = Options { autorespawn: false, ..Options::default() };
        let slot = slot_with("true", &[], opts);
        slot.start().await;
        for _ in 0..50 {
            if slot.state() == SlotState::Stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(slot.state(), SlotState::Stopped);
    }

    #[tokio::test]
    async fn start_during_backoff_collapses_the_wait() {
        let opts = Options { autorespawn: true, waiting_for_restart_delay: 5.0, ..Options::default() };
        let slot = slot_with("true", &[], opts);
        slot.start().await;
        for _ in 0..50 {
            if slot.state() == SlotState::WaitingForRestart {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(slot.state(), SlotState::WaitingForRestart);
        slot.start().await;
        assert_eq!(slot.state(), SlotState::Running);
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let slot = slot_with("sleep", &["5"], Options::default());
        slot.start().await;
        slot.shutdown().await;
        assert_eq!(slot.state(), SlotState::Shutdown);
        slot.start().await;
        assert_eq!(slot.state(), SlotState::Shutdown);
    }
}
