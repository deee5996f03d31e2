//! A running-task counter with a one-shot "drained" signal, per spec
//! §4.9's wait group and §4.9's shutdown contract ("`join` completes after
//! the wait group drains").
//!
//! Grounded in `original_source`'s
//! `detail/connection_pool/wait_group.hpp` (`running_tasks_` incremented on
//! `on_task_start`, decremented on `on_task_finish`, firing a
//! `steady_timer` cancellation at zero) — reshaped onto `tokio::sync::Notify`
//! since this crate has no ASIO-style timer to cancel for its wakeup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Tracks the pool's in-flight background tasks (per-connection
/// connect/retry loops, the return-processing loop, the health-ping loop)
/// so [`crate::pool::Pool::shutdown`] can wait for every one of them to
/// notice cancellation and exit before returning.
#[derive(Debug, Default)]
pub struct WaitGroup {
    count: AtomicUsize,
    drained: Notify,
}

impl WaitGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one more in-flight task. Pairs with a guard whose `Drop`
    /// calls [`WaitGroup::on_task_finish`], so a task that panics still
    /// counts as finished rather than wedging `join` forever.
    pub fn spawn_guard(self: &Arc<Self>) -> TaskGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        TaskGuard { group: Arc::clone(self) }
    }

    fn on_task_finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Completes once every [`TaskGuard`] handed out so far has been
    /// dropped. Safe to call concurrently with further `spawn_guard` calls
    /// racing in (as long as the caller has already stopped starting new
    /// tasks, e.g. after marking the pool cancelled) — a guard created
    /// after the count last hit zero simply extends the wait.
    pub async fn join(&self) {
        loop {
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.drained.notified();
            // Re-check under the notification's registration to avoid the
            // classic "count hit zero, notify fired, then we start
            // listening" lost-wakeup race.
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII membership in a [`WaitGroup`]; hold this for the lifetime of a
/// spawned background task.
pub struct TaskGuard {
    group: Arc<WaitGroup>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.group.on_task_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_returns_immediately_with_no_tasks() {
        let wg = WaitGroup::new();
        wg.join().await;
    }

    #[tokio::test]
    async fn join_waits_for_every_guard_to_drop() {
        let wg = WaitGroup::new();
        let guard_a = wg.spawn_guard();
        let guard_b = wg.spawn_guard();

        let wg2 = Arc::clone(&wg);
        let joined = tokio::spawn(async move {
            wg2.join().await;
        });

        tokio::task::yield_now().await;
        assert!(!joined.is_finished());

        drop(guard_a);
        tokio::task::yield_now().await;
        assert!(!joined.is_finished());

        drop(guard_b);
        joined.await.unwrap();
    }
}
