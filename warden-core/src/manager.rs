//! `Manager`: owns the set of services; drives global add/remove and
//! orderly system-wide shutdown.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Error;
use crate::process_helper::Sig;
use crate::service::Service;
use crate::state::{in_states, require_in, StateMachine};
use crate::status::{self, Status};

/// `RUNNING → STOPPING → SHUTDOWN`. Terminal: `SHUTDOWN`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum ManagerState {
    Running,
    Stopping,
    Shutdown,
}

pub struct Manager {
    state: StateMachine<ManagerState>,
    services: Mutex<HashMap<String, Arc<Service>>>,
}

impl Manager {
    pub fn new() -> Arc<Self> {
        Arc::new(Manager { state: StateMachine::new(ManagerState::Running), services: Mutex::new(HashMap::new()) })
    }

    pub fn state(&self) -> ManagerState {
        self.state.get()
    }

    pub fn state_since_seconds(&self) -> f64 {
        self.state.seconds_since_last_change()
    }

    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.services.lock().expect("manager mutex poisoned").get(name).cloned()
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.lock().expect("manager mutex poisoned").values().cloned().collect()
    }

    pub fn status(&self) -> Status {
        let statuses: Vec<Status> = self.services().iter().map(|s| s.status()).collect();
        status::rollup_with_transient(statuses, self.state.get() == ManagerState::Stopping)
    }

    /// Guarded (`RUNNING`, or-raise). Idempotent: a service already
    /// registered under that name is left untouched. Starts the service only
    /// if its command declares `autostart`.
    pub async fn add_service(&self, service: Arc<Service>) -> Result<(), Error> {
        require_in("Manager", &self.state.get(), &[ManagerState::Running])?;
        let already_present = {
            let mut services = self.services.lock().expect("manager mutex poisoned");
            if services.contains_key(service.name()) {
                true
            } else {
                services.insert(service.name().to_string(), service.clone());
                false
            }
        };
        if already_present {
            return Ok(());
        }
        if service.cmd().options().autostart {
            service.start().await;
        }
        Ok(())
    }

    /// Guarded (`RUNNING`, or-raise). Does not change Manager state.
    pub async fn stop_all(&self) -> Result<(), Error> {
        require_in("Manager", &self.state.get(), &[ManagerState::Running])?;
        let services = self.services();
        let mut handles = Vec::new();
        for service in services {
            handles.push(tokio::spawn(async move { service.stop().await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Guarded (`RUNNING`, or-raise). Terminal: awaits its own `wait()`.
    pub async fn shutdown(&self) -> Result<(), Error> {
        require_in("Manager", &self.state.get(), &[ManagerState::Running])?;
        self.state.set(ManagerState::Stopping);
        let services = self.services();
        let mut handles = Vec::new();
        for service in services {
            handles.push(tokio::spawn(async move { service.shutdown().await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        self.state.set(ManagerState::Shutdown);
        self.wait().await;
        Ok(())
    }

    /// Guarded (`RUNNING`, or-raise).
    pub async fn shutdown_and_remove_service(&self, name: &str) -> Result<(), Error> {
        require_in("Manager", &self.state.get(), &[ManagerState::Running])?;
        let service = self.services.lock().expect("manager mutex poisoned").get(name).cloned();
        if let Some(service) = service {
            service.shutdown().await;
            self.services.lock().expect("manager mutex poisoned").remove(name);
        }
        Ok(())
    }

    pub async fn wait(&self) {
        loop {
            if self.state.get() == ManagerState::Shutdown {
                return;
            }
            self.state.wait_for_change(Duration::from_secs(1)).await;
        }
    }

    /// Synchronous; only in `RUNNING` or `STOPPING`; broadcast to every
    /// service, which recursively SIGKILLs its own process trees.
    pub async fn kill(&self, signal: Sig) {
        if !in_states(&self.state.get(), &[ManagerState::Running, ManagerState::Stopping]) {
            return;
        }
        for service in self.services() {
            service.kill(signal).await;
        }
    }
}
