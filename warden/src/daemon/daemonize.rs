//! Classic double-fork daemonization, done before the tokio runtime starts:
//! forking a multi-threaded async runtime is unsound, so `main` must
//! daemonize first and only build the runtime in the detached child.
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::unistd::{chdir, dup2, fork, setsid, ForkResult};

use crate::internal_prelude::*;

/// Forks twice (so the daemon can never reacquire a controlling terminal),
/// detaches from the session, `chdir`s to `/`, and redirects stdin to
/// `/dev/null` and stdout/stderr to the given paths (or `/dev/null` if
/// unset). Returns in the final, detached child; the two intermediate
/// processes `exit(0)` without returning.
pub fn daemonize(stdout: Option<&Path>, stderr: Option<&Path>) -> Result<()> {
    // SAFETY: called at the top of `main`, before the tokio runtime (or any
    // other thread) exists, so there's nothing else to fork unsafely around.
    match unsafe { fork() }.wrap_err("first fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().wrap_err("setsid failed")?;

    match unsafe { fork() }.wrap_err("second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    chdir("/").wrap_err("chdir to / failed")?;
    redirect_stdio(stdout, stderr)?;
    Ok(())
}

fn redirect_stdio(stdout: Option<&Path>, stderr: Option<&Path>) -> Result<()> {
    let devnull_r = File::open("/dev/null").wrap_err("failed to open /dev/null")?;
    dup2(devnull_r.as_raw_fd(), 0).wrap_err("failed to redirect stdin")?;

    let open_or_devnull = |path: Option<&Path>| -> Result<File> {
        match path {
            Some(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("failed to open {} for daemon output", path.display())),
            None => File::create("/dev/null").wrap_err("failed to open /dev/null"),
        }
    };

    let out = open_or_devnull(stdout)?;
    dup2(out.as_raw_fd(), 1).wrap_err("failed to redirect stdout")?;
    let err = open_or_devnull(stderr)?;
    dup2(err.as_raw_fd(), 2).wrap_err("failed to redirect stderr")?;

    // `devnull_r`/`out`/`err` drop here, closing their original fds; 0/1/2
    // now point at independent duplicates and stay open.
    Ok(())
}
