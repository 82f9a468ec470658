//! Lock-free work queue for distributing shards across parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Env var overriding the detected hardware parallelism
pub const THREADS_ENV: &str = "OACRAWL_THREADS";

/// Lock-free work queue distributing items to workers.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next
/// unclaimed index. Claims are greedy, so a worker stuck on a huge shard
/// never holds back work that others could pick up.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
    completed: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Claim the next item (lock-free). `None` once every index is claimed.
    pub fn next(&self) -> Option<(usize, &S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|item| (i, item))
    }

    /// Mark one claimed item as finished; returns the new completed count
    pub fn complete(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Approximate number of finished items
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}

/// Worker parallelism: `OACRAWL_THREADS` if it is a positive integer,
/// otherwise detected hardware parallelism. Never below 1.
pub fn available_workers() -> usize {
    let detected = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    parse_thread_override(std::env::var(THREADS_ENV).ok().as_deref())
        .unwrap_or(detected)
        .max(1)
}

fn parse_thread_override(value: Option<&str>) -> Option<usize> {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

/// `T = min(parallelism, file_count)`, at least 1
pub fn worker_count(parallelism: usize, file_count: usize) -> usize {
    parallelism.min(file_count).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_returns_all() {
        let q = WorkQueue::new(vec![1, 2, 3]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some((0, &1)));
        assert_eq!(q.next(), Some((1, &2)));
        assert_eq!(q.next(), Some((2, &3)));
        assert_eq!(q.next(), None);
        // Further claims keep failing
        assert_eq!(q.next(), None);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<i32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        let q = WorkQueue::new((0..1000).collect::<Vec<_>>());
        let claimed = std::sync::Mutex::new(Vec::new());
        rayon::scope(|s| {
            for _ in 0..8 {
                s.spawn(|_| {
                    while let Some((_, v)) = q.next() {
                        claimed.lock().unwrap().push(*v);
                        q.complete();
                    }
                });
            }
        });
        let mut claimed = claimed.into_inner().unwrap();
        claimed.sort_unstable();
        assert_eq!(claimed, (0..1000).collect::<Vec<_>>());
        assert_eq!(q.completed(), 1000);
    }

    #[test]
    fn thread_override_parsing() {
        assert_eq!(parse_thread_override(Some("12")), Some(12));
        assert_eq!(parse_thread_override(Some(" 3 ")), Some(3));
        assert_eq!(parse_thread_override(Some("0")), None);
        assert_eq!(parse_thread_override(Some("many")), None);
        assert_eq!(parse_thread_override(None), None);
    }

    #[test]
    fn worker_count_capped_by_files() {
        assert_eq!(worker_count(16, 3), 3);
        assert_eq!(worker_count(4, 100), 4);
        assert_eq!(worker_count(8, 0), 1);
    }

    #[test]
    fn available_workers_at_least_one() {
        assert!(available_workers() >= 1);
    }
}
