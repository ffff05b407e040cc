//! Signal delivery is platform specific. This module keeps that behind a
//! small surface so [`crate::process::ManagedProcess`] never touches
//! `command_group` or `nix` directly.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::unix::*;

/// Signals the engine needs to send, independent of the underlying signal
/// crate so callers don't need to depend on it directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sig {
    Term,
    Kill,
    /// A raw signal number, used for `Options::smart_stop_signal`.
    Raw(i32),
}
