use clap::Parser;
use warden::cli::{CliArguments, Command};
use warden::client::Client;
use warden::daemon::{self, DaemonOptions};
use warden::errors::*;
use warden_core::cmd::Cmd;
use warden_core::manager::Manager;
use warden_core::options::Options;
use warden_core::service::Service;
use warden_core::settings::Settings;

/// Daemonization has to happen before the tokio runtime exists: forking a
/// process with other threads already running is unsound. So `main` stays
/// synchronous, daemonizes if asked, and only then builds the runtime.
fn main() -> Result<()> {
    color_eyre::install()?;
    let args = CliArguments::parse();

    match &args.command {
        Command::RunForever { daemonize: true, daemonize_stdout, daemonize_stderr, .. } => {
            daemon::daemonize::daemonize(daemonize_stdout.as_deref(), daemonize_stderr.as_deref())
                .wrap_err("failed to daemonize")?;
        }
        Command::StartDaemon { foreground: false, daemonize_stdout, daemonize_stderr, .. } => {
            daemon::daemonize::daemonize(daemonize_stdout.as_deref(), daemonize_stderr.as_deref())
                .wrap_err("failed to daemonize")?;
        }
        _ => {}
    }

    tokio::runtime::Runtime::new().wrap_err("failed to start async runtime")?.block_on(dispatch(args))
}

async fn dispatch(args: CliArguments) -> Result<()> {
    warden::tracing::install_tracing(args.verbose)?;

    match args.command {
        Command::RunForever { workers, bind_host, port, program, .. } => {
            let (program, rest) = program.split_first().wrap_err("a program to run is required")?;
            let manager = Manager::new();
            let cmd = Cmd::new(program.clone(), rest.to_vec(), std::sync::Arc::new(Options::default()));
            let service = Service::new("run-forever", workers, cmd);
            manager.add_service(service).await?;
            daemon::run(DaemonOptions { bind_host, port, default_options: Options::default() }, manager).await
        }
        Command::StartDaemon { bind_host, port, config, .. } => {
            let config_path = config.unwrap_or_else(Settings::default_path);
            let settings = Settings::read(&config_path)?;
            let manager = Manager::new();
            daemon::run(
                DaemonOptions { bind_host, port, default_options: settings.default_options },
                manager,
            )
            .await
        }
        Command::ShutdownDaemon { host, port } => {
            Client::new(&host, port).shutdown_daemon()?;
            println!("shutdown requested");
            Ok(())
        }
        Command::Status { host, port } => {
            let snapshot = Client::new(&host, port).manager_snapshot()?;
            warden::client::print_status(&snapshot);
            Ok(())
        }
        Command::ScaleService { name, workers, host, port } => {
            Client::new(&host, port).scale_service(&name, workers)?;
            println!("{name} scaled to {workers} workers");
            Ok(())
        }
    }
}
