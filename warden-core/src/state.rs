//! The shared state-machine primitive composed into every supervised entity.
//!
//! Each entity (`ManagedProcess`, `ProcessSlot`, `Service`, `Manager`) owns one
//! [`StateMachine<S>`] rather than inheriting shared behaviour, per the
//! capability-and-composition re-architecture: a small value type offering
//! read/write/wait, instead of a mixin.
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::sync::Notify;

use crate::error::Error;

struct Inner<S> {
    state: S,
    since: Instant,
    changed_at: DateTime<Local>,
}

/// A state cell with edge-triggered wakeups.
///
/// `set` is idempotent: setting the already-current state is a no-op and
/// does not wake waiters. Waiters registered via [`StateMachine::wait_for_change`]
/// only observe changes that happen *after* they register; a change that
/// already happened before a waiter subscribes is invisible to it, matching
/// the "waiters are one-shot, edge-triggered" contract.
pub struct StateMachine<S> {
    inner: std::sync::Mutex<Inner<S>>,
    notify: Notify,
}

impl<S> StateMachine<S>
where
    S: Clone + PartialEq,
{
    pub fn new(initial: S) -> Self {
        StateMachine {
            inner: std::sync::Mutex::new(Inner {
                state: initial,
                since: Instant::now(),
                changed_at: Local::now(),
            }),
            notify: Notify::new(),
        }
    }

    /// Lock-free (modulo the short internal mutex) snapshot of the current state.
    pub fn get(&self) -> S {
        self.inner.lock().expect("state mutex poisoned").state.clone()
    }

    pub fn changed_at(&self) -> DateTime<Local> {
        self.inner.lock().expect("state mutex poisoned").changed_at
    }

    pub fn seconds_since_last_change(&self) -> f64 {
        self.inner
            .lock()
            .expect("state mutex poisoned")
            .since
            .elapsed()
            .as_secs_f64()
    }

    /// Transition to `new_state`. A no-op, including no wakeups, if `new_state`
    /// equals the current state.
    pub fn set(&self, new_state: S) {
        {
            let mut inner = self.inner.lock().expect("state mutex poisoned");
            if inner.state == new_state {
                return;
            }
            inner.state = new_state;
            inner.since = Instant::now();
            inner.changed_at = Local::now();
        }
        self.notify.notify_waiters();
    }

    /// Wait up to `timeout` for the next state change. Returns `true` if a
    /// change was observed, `false` on timeout.
    ///
    /// The [`Notify::notified`] future is created before we yield control, so
    /// a change that happens concurrently with the call but before the
    /// `select!` polls it is still observed; a change that happened strictly
    /// before this call is not (by design: edge-triggered, not level-triggered).
    pub async fn wait_for_change(&self, timeout: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(timeout) => false,
        }
    }
}

/// Guard helper: is `current` one of the `allowed` states?
pub fn in_states<S: PartialEq>(current: &S, allowed: &[S]) -> bool {
    allowed.contains(current)
}

/// "Only in these states, else fail" guard. Called as the first statement of
/// a guarded operation; on rejection the caller returns the produced error.
pub fn require_in<S: PartialEq + std::fmt::Debug>(
    entity: &str,
    current: &S,
    allowed: &[S],
) -> Result<(), Error> {
    if in_states(current, allowed) {
        Ok(())
    } else {
        Err(Error::bad_state(entity, current))
    }
}

/// "Not in these states, else fail" guard; the dual of [`require_in`].
pub fn require_not_in<S: PartialEq + std::fmt::Debug>(
    entity: &str,
    current: &S,
    forbidden: &[S],
) -> Result<(), Error> {
    if in_states(current, forbidden) {
        Err(Error::bad_state(entity, current))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[derive(Clone, PartialEq, Eq, Debug)]
    enum Toy {
        A,
        B,
        C,
    }

    #[test]
    fn set_to_same_state_is_a_noop() {
        let sm = StateMachine::new(Toy::A);
        let before = sm.seconds_since_last_change();
        std::thread::sleep(Duration::from_millis(5));
        sm.set(Toy::A);
        // since `set` to the same state doesn't reset `since`, the elapsed time
        // should have strictly grown rather than reset to ~0.
        assert!(sm.seconds_since_last_change() >= before);
        assert_eq!(sm.get(), Toy::A);
    }

    #[tokio::test]
    async fn waiter_registered_after_change_does_not_observe_it() {
        let sm = Arc::new(StateMachine::new(Toy::A));
        sm.set(Toy::B);
        // Registering now must not see the transition that already happened.
        let observed = sm.wait_for_change(Duration::from_millis(50)).await;
        assert!(!observed);
    }

    #[tokio::test]
    async fn waiter_observes_a_concurrent_change() {
        let sm = Arc::new(StateMachine::new(Toy::A));
        let sm2 = sm.clone();
        let waiter = tokio::spawn(async move { sm2.wait_for_change(Duration::from_secs(2)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        sm.set(Toy::C);
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn require_in_rejects_disallowed_state() {
        let err = require_in("toy", &Toy::A, &[Toy::B, Toy::C]).unwrap_err();
        assert!(matches!(err, Error::BadState { .. }));
    }

    #[test]
    fn require_not_in_rejects_listed_state() {
        let err = require_not_in("toy", &Toy::A, &[Toy::A]).unwrap_err();
        assert!(matches!(err, Error::BadState { .. }));
    }
}
