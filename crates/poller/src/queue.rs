use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::check::Check;

/// Holding area for checks awaiting execution, ordered by due time.
#[async_trait]
pub trait CheckQueue: Send + Sync {
    async fn enqueue(&self, check: Check);

    /// Remove and return the earliest-due check, but only if it is due right
    /// now. Non-blocking; returns `None` when nothing is due.
    async fn dequeue(&self) -> Option<Check>;

    /// Discard all queued checks.
    async fn flush(&self);

    async fn count(&self) -> u64;
}

struct QueueInner {
    /// Checks bucketed by priority (due time as epoch seconds); each bucket
    /// preserves insertion order.
    buckets: HashMap<i64, VecDeque<Check>>,
    /// Lowest priority currently present, or `i64::MAX` when empty.
    min_priority: i64,
    total: u64,
}

/// In-memory `CheckQueue`. Mutations take the write half of the lock;
/// `count` only needs the read half.
pub struct MemoryCheckQueue {
    inner: RwLock<QueueInner>,
}

impl MemoryCheckQueue {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(QueueInner {
                buckets: HashMap::new(),
                min_priority: i64::MAX,
                total: 0,
            }),
        }
    }
}

impl Default for MemoryCheckQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckQueue for MemoryCheckQueue {
    async fn enqueue(&self, check: Check) {
        let priority = check.due_at().timestamp();

        let mut inner = self.inner.write().await;
        inner.buckets.entry(priority).or_default().push_back(check);
        inner.total += 1;
        if priority < inner.min_priority {
            inner.min_priority = priority;
        }
    }

    async fn dequeue(&self) -> Option<Check> {
        let mut inner = self.inner.write().await;
        let min = inner.min_priority;

        {
            let bucket = inner.buckets.get(&min)?;
            // priorities are time-based: if the head of the earliest bucket
            // is not due, nothing is
            if !bucket.front()?.is_due(Utc::now()) {
                return None;
            }
        }

        let bucket = inner.buckets.get_mut(&min)?;
        let check = bucket.pop_front()?;
        let emptied = bucket.is_empty();
        inner.total -= 1;

        if emptied {
            inner.buckets.remove(&min);
            inner.min_priority = inner.buckets.keys().copied().min().unwrap_or(i64::MAX);
        }

        Some(check)
    }

    async fn flush(&self) {
        let mut inner = self.inner.write().await;
        inner.buckets.clear();
        inner.min_priority = i64::MAX;
        inner.total = 0;
    }

    async fn count(&self) -> u64 {
        self.inner.read().await.total
    }
}
