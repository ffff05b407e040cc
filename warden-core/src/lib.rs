#![doc = include_str!("../README.md")]

/// The command a slot runs: program, arguments, options, template context.
pub mod cmd;
/// warden-core's own error type.
pub mod error;
/// `Manager`: owns the set of services; global add/remove and shutdown.
pub mod manager;
/// Immutable per-service configuration.
pub mod options;
/// Signal delivery to a spawned process or its process group.
pub mod process_helper;
/// `ManagedProcess`: owns exactly one OS process through its entire lifetime.
pub mod process;
/// Per-instance serialization of guarded operations.
pub mod serialize;
/// Daemon-wide configuration: bind address and default `Options`.
pub mod settings;
/// Serializable snapshots of the supervision tree, for HTTP/CLI consumers.
pub mod snapshot;
/// `Service`: owns N slots running one command; scale up/down.
pub mod service;
/// `ProcessSlot`: a replica position that restarts its process on crashes.
pub mod slot;
/// The shared state-machine primitive composed into every supervised entity.
pub mod state;
/// Derived, read-only four-valued health status.
pub mod status;
