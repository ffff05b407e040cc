use nix::sys::signal::{self, Signal as NixSignal};
use nix::unistd::Pid;

use super::Sig;
use crate::error::Error;

fn nix_signal(sig: Sig) -> NixSignal {
    match sig {
        Sig::Term => NixSignal::SIGTERM,
        Sig::Kill => NixSignal::SIGKILL,
        Sig::Raw(n) => NixSignal::try_from(n).unwrap_or(NixSignal::SIGTERM),
    }
}

/// A lookup error for an already-dead process is not our problem: the
/// process is gone either way.
fn ignore_missing_process(err: nix::Error) -> Result<(), Error> {
    if err == nix::Error::ESRCH {
        Ok(())
    } else {
        Err(Error::Io("signalling process".into(), std::io::Error::from(err)))
    }
}

/// Send a signal to only the leader process, not its descendants. Used for
/// the smart-stop signal, which is defined as non-recursive.
pub fn signal_leader(pid: u32, sig: Sig) -> Result<(), Error> {
    signal::kill(Pid::from_raw(pid as i32), nix_signal(sig)).or_else(ignore_missing_process)
}

/// Send a signal to the whole process group led by the process at `pid`.
/// `ManagedProcess` never hands us the `AsyncGroupChild` itself: it's owned
/// by the background wait task for the lifetime of the process, and routing
/// signals through the raw pid instead avoids contending for it.
pub fn signal_group(pid: u32, sig: Sig) -> Result<(), Error> {
    signal::killpg(Pid::from_raw(pid as i32), nix_signal(sig)).or_else(ignore_missing_process)
}
