//! A thin blocking HTTP client for the daemon's control plane, used by every
//! CLI subcommand that isn't `run-forever`/`start-daemon` itself.
use comfy_table::presets::UTF8_HORIZONTAL_ONLY;
use comfy_table::{Cell, ContentArrangement, Table};
use serde::Serialize;
use serde_json::json;
use warden_core::snapshot::ManagerSnapshot;

use crate::internal_prelude::*;

pub struct Client {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(host: &str, port: u16) -> Self {
        Client { base_url: format!("http://{host}:{port}"), http: reqwest::blocking::Client::new() }
    }

    pub fn shutdown_daemon(&self) -> Result<()> {
        self.http
            .post(format!("{}/manager/shutdown", self.base_url))
            .send()
            .wrap_err("failed to reach daemon")?
            .error_for_status()
            .wrap_err("daemon rejected shutdown request")?;
        Ok(())
    }

    pub fn manager_snapshot(&self) -> Result<ManagerSnapshot> {
        let snapshot = self
            .http
            .get(format!("{}/manager", self.base_url))
            .send()
            .wrap_err("failed to reach daemon")?
            .error_for_status()
            .wrap_err("daemon returned an error")?
            .json()
            .wrap_err("failed to parse manager status")?;
        Ok(snapshot)
    }

    pub fn scale_service(&self, name: &str, workers: usize) -> Result<()> {
        #[derive(Serialize)]
        struct Body {
            workers: usize,
        }
        self.http
            .post(format!("{}/services/{name}/scale", self.base_url))
            .json(&Body { workers })
            .send()
            .wrap_err("failed to reach daemon")?
            .error_for_status()
            .wrap_err("daemon rejected scale request")?;
        Ok(())
    }

    pub fn add_service(&self, name: &str, workers: usize, program: &str, args: &[String]) -> Result<()> {
        let body = json!({ "name": name, "workers": workers, "program": program, "args": args });
        self.http
            .post(format!("{}/services/add", self.base_url))
            .json(&body)
            .send()
            .wrap_err("failed to reach daemon")?
            .error_for_status()
            .wrap_err("daemon rejected add-service request")?;
        Ok(())
    }
}

/// One row per slot, flattened across every service: `status` cares about
/// "what's running right now", not the service tree shape.
pub fn print_status(snapshot: &ManagerSnapshot) {
    println!("Manager state: {} (since {} seconds)", snapshot.state, snapshot.state_since.round());
    println!();

    if snapshot.services.is_empty() {
        println!("No services registered.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic).load_preset(UTF8_HORIZONTAL_ONLY).set_header(vec![
        Cell::new("Service"),
        Cell::new("Service State"),
        Cell::new("Slot"),
        Cell::new("Slot State"),
        Cell::new("Since (s)"),
        Cell::new("Pid"),
        Cell::new("Command"),
    ]);

    for service in &snapshot.services {
        for slot in &service.slots {
            table.add_row(vec![
                Cell::new(&service.name),
                Cell::new(&service.state),
                Cell::new(slot.index),
                Cell::new(&slot.state),
                Cell::new(slot.state_since.round()),
                Cell::new(slot.pid.map(|pid| pid.to_string()).unwrap_or_default()),
                Cell::new(slot.cmd_line.as_deref().unwrap_or("")),
            ]);
        }
    }

    println!("{table}");
}
