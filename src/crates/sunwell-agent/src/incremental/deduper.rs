//! In-flight work deduplication
//!
//! Guarantees at-most-once execution per content hash within a run: when
//! two concurrent callers ask for the same `input_hash`, one becomes the
//! leader and does the work while the others await the shared result.
//!
//! If the leader's future is dropped (cancellation, panic), the watch
//! sender closes and a waiter promotes itself to leader, so the key cannot
//! wedge permanently.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

/// Deduplicates concurrent async work by key
pub struct WorkDeduper<T: Clone + Send + Sync + 'static> {
    inflight: DashMap<String, watch::Receiver<Option<T>>>,
}

impl<T: Clone + Send + Sync + 'static> WorkDeduper<T> {
    /// Empty deduper
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Number of keys currently executing
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run `work` for `key`, sharing the result with concurrent callers
    ///
    /// Exactly one concurrent caller per key executes its closure; the
    /// rest receive a clone of the leader's result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let mut work = Some(work);

        loop {
            // Subscribe if someone is already executing this key. The map
            // guard must drop before awaiting.
            let existing = self.inflight.get(key).map(|entry| entry.value().clone());
            if let Some(mut rx) = existing {
                let leader_vanished = {
                    match rx.wait_for(|value| value.is_some()).await {
                        Ok(value) => {
                            return value.clone().expect("wait_for guarantees Some");
                        }
                        Err(_) => true,
                    }
                };
                if leader_vanished {
                    // Leader dropped without publishing; clear the dead
                    // channel (and only that one) and take over.
                    debug!(key, "dedup leader vanished; promoting waiter");
                    self.inflight
                        .remove_if(key, |_, stored| stored.same_channel(&rx));
                    continue;
                }
            }

            // Try to become the leader.
            let tx = match self.inflight.entry(key.to_string()) {
                Entry::Occupied(_) => continue, // raced; subscribe next loop
                Entry::Vacant(vacant) => {
                    let (tx, rx) = watch::channel(None);
                    vacant.insert(rx);
                    tx
                }
            };

            let result = work.take().expect("leader path runs once")().await;
            // Publish before removing so late subscribers still observe it.
            let _ = tx.send(Some(result.clone()));
            self.inflight.remove(key);
            return result;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for WorkDeduper<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_caller_executes() {
        let deduper = WorkDeduper::new();
        let result = deduper.run("k", || async { 42 }).await;
        assert_eq!(result, 42);
        assert_eq!(deduper.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let deduper = Arc::new(WorkDeduper::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let deduper = Arc::clone(&deduper);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                deduper
                    .run("shared-key", || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "result".to_string()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "result");
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_execute_independently() {
        let deduper = Arc::new(WorkDeduper::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let deduper = Arc::clone(&deduper);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                deduper
                    .run(&format!("key-{i}"), || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        i
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_sequential_calls_rerun() {
        // Dedup is for in-flight work only; completed keys run again.
        let deduper = WorkDeduper::new();
        let first = deduper.run("k", || async { 1 }).await;
        let second = deduper.run("k", || async { 2 }).await;
        assert_eq!((first, second), (1, 2));
    }

    #[tokio::test]
    async fn test_dropped_leader_promotes_waiter() {
        let deduper = Arc::new(WorkDeduper::new());

        // Leader that never completes: spawn and abort it.
        let leader = {
            let deduper = Arc::clone(&deduper);
            tokio::spawn(async move {
                deduper
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        0
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let deduper = Arc::clone(&deduper);
            tokio::spawn(async move { deduper.run("k", || async { 7 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter must not hang")
            .unwrap();
        assert_eq!(result, 7);
    }
}
