//! Serializable point-in-time views over the supervision tree, returned by
//! the HTTP control plane and printed by the CLI's `status` command.
use serde::{Deserialize, Serialize};

use crate::manager::Manager;
use crate::process::ManagedProcess;
use crate::service::Service;
use crate::slot::ProcessSlot;
use crate::status::Status;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub id: String,
    pub name: String,
    pub state: String,
    pub state_since: f64,
    pub status: Status,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub command_line: Option<String>,
}

impl ProcessSnapshot {
    pub fn of(process: &ManagedProcess) -> Self {
        ProcessSnapshot {
            id: process.id().to_string(),
            name: process.name().to_string(),
            state: process.state().to_string(),
            state_since: process.state_since_seconds(),
            status: process.status(),
            pid: process.pid(),
            exit_code: process.exit_code(),
            command_line: process.command_line(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub state: String,
    pub state_since: f64,
    pub status: Status,
    pub pid: Option<u32>,
    pub cmd_line: Option<String>,
    pub process: Option<ProcessSnapshot>,
}

impl SlotSnapshot {
    pub fn of(slot: &ProcessSlot) -> Self {
        let process = slot.process_snapshot();
        SlotSnapshot {
            index: slot.index(),
            state: slot.state().to_string(),
            state_since: slot.state_since_seconds(),
            status: slot.status(),
            pid: process.as_ref().and_then(|p| p.pid()),
            cmd_line: process.as_ref().and_then(|p| p.command_line()),
            process: process.as_deref().map(ProcessSnapshot::of),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub state: String,
    pub state_since: f64,
    pub status: Status,
    pub replicas: usize,
    pub slots: Vec<SlotSnapshot>,
}

impl ServiceSnapshot {
    pub fn of(service: &Service) -> Self {
        ServiceSnapshot {
            name: service.name().to_string(),
            state: service.state().to_string(),
            state_since: service.state_since_seconds(),
            status: service.status(),
            replicas: service.replicas(),
            slots: service.slots().iter().map(|s| SlotSnapshot::of(s)).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub state: String,
    pub state_since: f64,
    pub status: Status,
    pub services: Vec<ServiceSnapshot>,
}

impl ManagerSnapshot {
    pub fn of(manager: &Manager) -> Self {
        ManagerSnapshot {
            state: manager.state().to_string(),
            state_since: manager.state_since_seconds(),
            status: manager.status(),
            services: manager.services().iter().map(|s| ServiceSnapshot::of(s)).collect(),
        }
    }
}
