//! `Service`: owns N slots running one command; implements scale up/down.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cmd::Cmd;
use crate::process_helper::Sig;
use crate::serialize::SerializeToken;
use crate::state::{in_states, StateMachine};
use crate::slot::{ProcessSlot, SlotState};
use crate::status::{self, Status};

/// `STOPPED → STARTING → RUNNING → (STOPPING → STOPPED) | (SCALING_UP |
/// SCALING_DOWN → RUNNING) | (SHUTDOWN)`. Terminal: `SHUTDOWN`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    ScalingUp,
    ScalingDown,
    Shutdown,
}

struct Inner {
    replicas: usize,
    slots: BTreeMap<usize, Arc<ProcessSlot>>,
}

pub struct Service {
    name: String,
    cmd: Cmd,
    state: StateMachine<ServiceState>,
    serialize: SerializeToken,
    inner: Mutex<Inner>,
}

impl Service {
    pub fn new(name: impl Into<String>, replicas: usize, cmd: Cmd) -> Arc<Self> {
        Arc::new(Service {
            name: name.into(),
            cmd,
            state: StateMachine::new(ServiceState::Stopped),
            serialize: SerializeToken::new(),
            inner: Mutex::new(Inner { replicas, slots: BTreeMap::new() }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmd(&self) -> &Cmd {
        &self.cmd
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    pub fn state_since_seconds(&self) -> f64 {
        self.state.seconds_since_last_change()
    }

    pub fn replicas(&self) -> usize {
        self.inner.lock().expect("service mutex poisoned").replicas
    }

    pub fn slots(&self) -> Vec<Arc<ProcessSlot>> {
        self.inner.lock().expect("service mutex poisoned").slots.values().cloned().collect()
    }

    pub fn slot(&self, index: usize) -> Option<Arc<ProcessSlot>> {
        self.inner.lock().expect("service mutex poisoned").slots.get(&index).cloned()
    }

    /// In `RUNNING`, the slot map's cardinality equals the declared replica
    /// count and a transient mid-scale state contributes an extra
    /// `WARNING`, per the rollup rule.
    pub fn status(&self) -> Status {
        let slot_statuses: Vec<Status> = self.slots().iter().map(|s| s.status()).collect();
        let transient = matches!(
            self.state.get(),
            ServiceState::Starting | ServiceState::Stopping | ServiceState::ScalingUp | ServiceState::ScalingDown
        );
        if matches!(self.state.get(), ServiceState::Stopped | ServiceState::Shutdown) {
            return Status::Stopped;
        }
        status::rollup_with_transient(slot_statuses, transient)
    }

    async fn start_slots(self: &Arc<Self>, range: std::ops::Range<usize>) {
        // Sequential on purpose: ordered startup errors are easier to
        // reason about than a thundering herd of simultaneous spawns.
        for index in range {
            let slot = ProcessSlot::new(self.name.clone(), index, self.cmd.clone());
            slot.start().await;
            self.inner.lock().expect("service mutex poisoned").slots.insert(index, slot);
        }
    }

    /// Guarded (`STOPPED` only, serialized).
    pub async fn start(self: &Arc<Self>) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[ServiceState::Stopped]) {
            return;
        }
        self.state.set(ServiceState::Starting);
        let count = self.inner.lock().expect("service mutex poisoned").replicas;
        self.start_slots(0..count).await;
        self.state.set(ServiceState::Running);
    }

    async fn stop_or_shutdown(&self, shutdown: bool) {
        self.state.set(ServiceState::Stopping);
        let slots: Vec<Arc<ProcessSlot>> = self.slots();
        let mut handles = Vec::new();
        for slot in slots {
            handles.push(tokio::spawn(async move {
                if shutdown {
                    slot.shutdown().await;
                } else {
                    slot.stop().await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        self.state.set(if shutdown { ServiceState::Shutdown } else { ServiceState::Stopped });
    }

    /// Guarded (`RUNNING` only, serialized).
    pub async fn stop(&self) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[ServiceState::Running]) {
            return;
        }
        self.stop_or_shutdown(false).await;
    }

    /// Guarded (`RUNNING` or `STOPPED`). Terminal: awaits its own `wait()`.
    pub async fn shutdown(&self) {
        {
            let _permit = self.serialize.acquire().await;
            if !in_states(&self.state.get(), &[ServiceState::Running, ServiceState::Stopped]) {
                return;
            }
            self.stop_or_shutdown(true).await;
            self.state.set(ServiceState::Shutdown);
        }
        self.wait().await;
    }

    pub async fn wait(&self) {
        loop {
            if self.state.get() == ServiceState::Shutdown {
                return;
            }
            self.state.wait_for_change(Duration::from_secs(1)).await;
        }
    }

    /// Guarded (`RUNNING` or `STOPPED`). In `STOPPED`, just records the new
    /// replica count. Otherwise scales the live slot map up or down;
    /// removal happens before `shutdown()` so a slot mid-teardown is no
    /// longer addressable by control-plane operations.
    pub async fn set_slot_number(self: &Arc<Self>, target: usize) {
        let _permit = self.serialize.acquire().await;
        if !in_states(&self.state.get(), &[ServiceState::Running, ServiceState::Stopped]) {
            return;
        }
        if self.state.get() == ServiceState::Stopped {
            self.inner.lock().expect("service mutex poisoned").replicas = target;
            return;
        }

        let current = self.inner.lock().expect("service mutex poisoned").replicas;
        if target > current {
            self.state.set(ServiceState::ScalingUp);
            self.start_slots(current..target).await;
            self.inner.lock().expect("service mutex poisoned").replicas = target;
            self.state.set(ServiceState::Running);
        } else if target < current {
            self.state.set(ServiceState::ScalingDown);
            let removed: Vec<Arc<ProcessSlot>> = {
                let mut inner = self.inner.lock().expect("service mutex poisoned");
                (target..current).rev().filter_map(|index| inner.slots.remove(&index)).collect()
            };
            let mut handles = Vec::new();
            for slot in removed {
                handles.push(tokio::spawn(async move { slot.shutdown().await }));
            }
            for handle in handles {
                let _ = handle.await;
            }
            self.inner.lock().expect("service mutex poisoned").replicas = target;
            self.state.set(ServiceState::Running);
        }
    }

    /// Synchronous; only in `RUNNING`, `SCALING_DOWN`, or `STOPPING`;
    /// forwarded to every current slot.
    pub async fn kill(&self, signal: Sig) {
        if !in_states(
            &self.state.get(),
            &[ServiceState::Running, ServiceState::ScalingDown, ServiceState::Stopping],
        ) {
            return;
        }
        for slot in self.slots() {
            slot.kill(signal).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::options::Options;

    fn service_with(replicas: usize) -> Arc<Service> {
        let cmd = Cmd::new("sleep", vec!["5".into()], Arc::new(Options::default()));
        Service::new("svc", replicas, cmd)
    }

    #[tokio::test]
    async fn start_creates_dense_slot_map() {
        let service = service_with(3);
        service.start().await;
        assert_eq!(service.state(), ServiceState::Running);
        let indices: Vec<usize> = service.slots().iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn scale_up_adds_slots_and_keeps_existing_ones() {
        let service = service_with(2);
        service.start().await;
        service.set_slot_number(4).await;
        assert_eq!(service.state(), ServiceState::Running);
        assert_eq!(service.replicas(), 4);
        let indices: Vec<usize> = service.slots().iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn scale_down_removes_highest_indices_first() {
        let service = service_with(4);
        service.start().await;
        service.set_slot_number(2).await;
        assert_eq!(service.replicas(), 2);
        let indices: Vec<usize> = service.slots().iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1]);
        for slot in service.slots() {
            assert_eq!(slot.state(), SlotState::Running);
        }
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let service = service_with(1);
        service.start().await;
        service.shutdown().await;
        assert_eq!(service.state(), ServiceState::Shutdown);
        service.start().await;
        assert_eq!(service.state(), ServiceState::Shutdown);
    }
}
