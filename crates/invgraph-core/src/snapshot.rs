// Snapshot Cell - whole-value publication for read-mostly shared state.
//
// Readers take an `Arc` to the current value and keep using it for as long as
// they like; writers publish a complete replacement. Nobody ever sees a value
// that is half old and half new. Reads go through an atomic pointer load and
// never take a lock; the watch channel only wakes subscribers.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::watch;

pub struct SnapshotCell<T> {
    current: ArcSwap<T>,
    tx: watch::Sender<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        let value = Arc::new(value);
        let (tx, _rx) = watch::channel(Arc::clone(&value));
        Self {
            current: ArcSwap::new(value),
            tx,
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Publish `value`, returning the snapshot it replaced.
    pub fn replace(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let mut previous = Arc::clone(&next);
        // Writers serialize on the channel so subscribers and `load` agree.
        self.tx.send_modify(|slot| {
            previous = self.current.swap(Arc::clone(&next));
            *slot = next;
        });
        previous
    }

    /// Receiver notified on every replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_snapshot_survives_replace() {
        let cell = SnapshotCell::new(vec![1, 2, 3]);
        let before = cell.load();
        let replaced = cell.replace(vec![4]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&before, &replaced));
        assert_eq!(*cell.load(), vec![4]);
    }

    #[tokio::test]
    async fn test_subscribers_see_replacement() {
        let cell = SnapshotCell::new(String::from("v1"));
        let mut rx = cell.subscribe();
        cell.replace(String::from("v2"));

        rx.changed().await.expect("sender alive");
        assert_eq!(rx.borrow().as_str(), "v2");
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_values() {
        let cell = Arc::new(SnapshotCell::new(vec![0u32; 64]));
        let mut handles = Vec::new();

        for round in 1..=8u32 {
            let writer = cell.clone();
            handles.push(tokio::spawn(async move {
                writer.replace(vec![round; 64]);
            }));
            let reader = cell.clone();
            handles.push(tokio::spawn(async move {
                let snap = reader.load();
                let first = snap[0];
                assert!(snap.iter().all(|v| *v == first));
            }));
        }

        for handle in handles {
            handle.await.expect("task panicked");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribers_and_readers_agree_after_racing_writers() {
        let cell = Arc::new(SnapshotCell::new(0u32));
        let rx = cell.subscribe();

        let writers: Vec<_> = (1..=32u32)
            .map(|n| {
                let cell = cell.clone();
                tokio::spawn(async move {
                    cell.replace(n);
                })
            })
            .collect();
        for writer in writers {
            writer.await.expect("writer panicked");
        }

        let loaded = cell.load();
        assert!(Arc::ptr_eq(&loaded, &rx.borrow()));
        assert_ne!(*loaded, 0);
    }
}
