//! Wires a `Manager` to the HTTP control plane and owns the
//! shutdown-then-kill signal escalation protocol.
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal as unix_signal, Signal as SignalStream, SignalKind};
use warden_core::manager::Manager;
use warden_core::options::Options;
use warden_core::process_helper::Sig;

use crate::internal_prelude::*;

pub mod daemonize;
pub mod http;

pub struct DaemonOptions {
    pub bind_host: String,
    pub port: u16,
    pub default_options: Options,
}

/// Binds the configured port up front so a conflict fails fast with the
/// documented exit code, before any async machinery starts.
fn check_port_available(bind_host: &str, port: u16) -> Result<()> {
    TcpListener::bind((bind_host, port))
        .map(|_| ())
        .wrap_err_with(|| format!("port {port} on {bind_host} is already in use"))
}

/// Runs the daemon to completion: binds the HTTP control plane, then blocks
/// on the signal escalation protocol until the manager reaches SHUTDOWN.
pub async fn run(opts: DaemonOptions, manager: Arc<Manager>) -> Result<()> {
    check_port_available(&opts.bind_host, opts.port)?;

    let addr: SocketAddr =
        format!("{}:{}", opts.bind_host, opts.port).parse().wrap_err("invalid bind address")?;
    let app = http::router(manager.clone(), opts.default_options);
    let listener = tokio::net::TcpListener::bind(addr).await.wrap_err("failed to bind HTTP listener")?;
    info!(%addr, "listening");

    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "HTTP server exited with an error");
        }
    });

    run_signal_escalation(manager).await;
    server.abort();
    Ok(())
}

/// First SIGINT/SIGTERM enqueues a graceful `manager.shutdown()`; a second
/// one received while that's still in flight escalates straight to
/// `manager.kill(9)`, which recursively SIGKILLs every process tree.
/// Returns once the manager has reached SHUTDOWN by either path.
async fn run_signal_escalation(manager: Arc<Manager>) {
    let mut sigint = unix_signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = unix_signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    info!("received shutdown signal, stopping all services");

    let shutdown = tokio::spawn({
        let manager = manager.clone();
        async move {
            if let Err(err) = manager.shutdown().await {
                tracing::error!(%err, "manager shutdown failed");
            }
        }
    });

    tokio::select! {
        _ = shutdown => {}
        _ = wait_for_one(&mut sigint, &mut sigterm) => {
            warn!("second shutdown signal received, escalating to SIGKILL");
            manager.kill(Sig::Kill).await;
            manager.wait().await;
        }
    }
}

async fn wait_for_one(sigint: &mut SignalStream, sigterm: &mut SignalStream) {
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

/// Sends this process `SIGTERM`. Used after an HTTP-triggered shutdown so
/// the daemon exits through the same signal-driven path regardless of
/// whether shutdown was requested over HTTP or by a real signal.
pub fn self_terminate() {
    if let Err(err) = signal::kill(Pid::this(), Signal::SIGTERM) {
        tracing::error!(%err, "failed to self-signal SIGTERM");
    }
}
