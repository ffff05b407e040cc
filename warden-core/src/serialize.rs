//! Per-instance serialization: at most one guarded operation runs on a given
//! entity at a time.
//!
//! Two acquisition modes are offered, matching the two call sites the engine
//! needs: a queueing `wait` mode for user-issued operations, and a
//! non-blocking `try` mode for the slot's internal autorestart path, which
//! must silently lose a race against a concurrent `stop()` rather than queue
//! behind it.
use tokio::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct SerializeToken(Mutex<()>);

impl SerializeToken {
    pub fn new() -> Self {
        SerializeToken(Mutex::new(()))
    }

    /// Queue for the token, waiting for any in-flight operation to finish.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }

    /// Take the token only if it's free right now; otherwise return `None`
    /// so the caller can drop the operation silently.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, ()>> {
        self.0.try_lock().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let token = Arc::new(SerializeToken::new());
        let guard = token.acquire().await;
        assert!(token.try_acquire().is_none());
        drop(guard);
        assert!(token.try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_serializes_concurrent_callers() {
        let token = Arc::new(SerializeToken::new());
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let token = token.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = token.acquire().await;
                let before = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                // No other task should have incremented the counter while we held the guard.
                assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), before + 1);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 8);
    }
}
