//! Keyed single-flight: at most one in-flight computation per key.
//!
//! Concurrent callers for the same key share the leader's result. The
//! entry is dropped once the flight lands, so the next caller starts a
//! fresh one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Result of [`SingleFlight::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landed<T> {
    pub value: T,
    /// True for the caller that ran the computation.
    pub leader: bool,
}

#[derive(Debug)]
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` unless a flight for `key` is already airborne, in which case
    /// wait for it and return its value.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> Landed<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().unwrap();
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let mut leader = false;
        let value = cell
            .get_or_init(|| {
                leader = true;
                f()
            })
            .await
            .clone();

        {
            let mut inflight = self.inflight.lock().unwrap();
            if inflight.get(key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                inflight.remove(key);
            }
        }

        Landed { value, leader }
    }

    /// Keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_run() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("env", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        42
                    })
                    .await
            }));
        }

        let mut leaders = 0;
        for handle in handles {
            let landed = handle.await.unwrap();
            assert_eq!(landed.value, 42);
            if landed.leader {
                leaders += 1;
            }
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let flight = SingleFlight::<u32>::new();
        let first = flight.run("env", || async { 1 }).await;
        let second = flight.run("env", || async { 2 }).await;
        assert_eq!(first.value, 1);
        assert_eq!(second.value, 2);
        assert!(second.leader);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let flight = SingleFlight::<&'static str>::new();
        let (a, b) = tokio::join!(
            flight.run("a", || async { "a" }),
            flight.run("b", || async { "b" })
        );
        assert_eq!((a.value, b.value), ("a", "b"));
        assert!(a.leader && b.leader);
    }
}
