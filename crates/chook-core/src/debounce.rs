//! Keyed, cancelable one-shot timers.
//!
//! [`DebounceScheduler`] collapses bursts of triggers into a single delayed
//! action per key. Re-scheduling a key aborts its pending timer task before
//! it fires, so a superseded action never runs. Timers use `tokio::time`,
//! which lets tests drive them with a paused clock.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// Coalesces rapid triggers into one delayed action per key.
///
/// Must be used from within a tokio runtime. Dropping the scheduler cancels
/// every pending timer.
pub struct DebounceScheduler<K> {
    timers: HashMap<K, JoinHandle<()>>,
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }

    /// Arm a timer under `key`, cancelling any earlier timer for the same key
    /// that has not fired yet. `action` runs exactly once after `delay`
    /// unless superseded or cancelled first.
    pub fn schedule<F>(&mut self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(previous) = self.timers.remove(&key) {
            previous.abort();
        }
        trace!(?key, delay_ms = delay.as_millis() as u64, "timer armed");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        self.timers.insert(key, handle);
    }

    /// Cancel the timer under `key`. Idempotent.
    ///
    /// Returns `true` if a timer was still pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                if pending {
                    trace!(?key, "timer cancelled");
                }
                pending
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    /// Whether a timer under `key` is armed and has not fired.
    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.get(key).is_some_and(|h| !h.is_finished())
    }
}

impl<K> Default for DebounceScheduler<K>
where
    K: Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for DebounceScheduler<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("keys", &self.timers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K> Drop for DebounceScheduler<K> {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_fire_once_after_delay() {
        let (count, action) = counter();
        let mut scheduler = DebounceScheduler::new();

        scheduler.schedule("edit", Duration::from_millis(500), action());
        assert!(scheduler.is_pending(&"edit"));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&"edit"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_collapse_rapid_reschedules() {
        let (count, action) = counter();
        let mut scheduler = DebounceScheduler::new();

        for _ in 0..5 {
            scheduler.schedule("edit", Duration::from_millis(500), action());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_not_fire_after_cancel() {
        let (count, action) = counter();
        let mut scheduler = DebounceScheduler::new();

        scheduler.schedule("edit", Duration::from_millis(500), action());
        assert!(scheduler.cancel(&"edit"));
        assert!(!scheduler.cancel(&"edit"), "second cancel is a no-op");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_keep_keys_independent() {
        let (count, action) = counter();
        let mut scheduler = DebounceScheduler::new();

        scheduler.schedule("a", Duration::from_millis(100), action());
        scheduler.schedule("b", Duration::from_millis(200), action());
        scheduler.cancel(&"a");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_cancel_everything_on_drop() {
        let (count, action) = counter();
        let mut scheduler = DebounceScheduler::new();
        scheduler.schedule("a", Duration::from_millis(100), action());
        scheduler.schedule("b", Duration::from_millis(100), action());
        drop(scheduler);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
