//! Process-local single-flight coordination.
//!
//! Concurrent operations on the same cache path are collapsed so that at
//! most one upstream fetch per entry is ever in flight: the first caller
//! to acquire a path proceeds immediately, later callers park in FIFO
//! order and are handed the path one at a time as each holder releases.
//!
//! Coordination is keyed by the local file path, not the URL, so it sits
//! with the resource being materialized. It is strictly in-process; the
//! filesystem itself is the only medium shared with other processes.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

/// The table of currently owned cache paths.
///
/// A path appears here iff some task holds logical ownership of it.
#[derive(Default)]
pub(crate) struct PathLocker {
    /// Owned paths, each with its queue of parked waiters.
    entries: Mutex<HashMap<PathBuf, LockEntry>>,
}

/// Book-keeping for one owned path.
struct LockEntry {
    /// Waiters parked in arrival order.
    waiters: VecDeque<oneshot::Sender<()>>,
    /// Instant of the most recent ownership change.
    updated_at: Instant,
}

impl PathLocker {
    /// Acquires ownership of `path`, parking until any current holder and
    /// earlier waiters have released.
    ///
    /// There is no acquisition timeout; liveness relies on every guard
    /// eventually being dropped.
    pub(crate) async fn acquire(self: &Arc<Self>, path: PathBuf) -> PathGuard {
        let parked = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&path) {
                Some(entry) => {
                    let (tx, rx) = oneshot::channel();
                    entry.waiters.push_back(tx);
                    Some(rx)
                }
                None => {
                    entries.insert(
                        path.clone(),
                        LockEntry {
                            waiters: VecDeque::new(),
                            updated_at: Instant::now(),
                        },
                    );
                    None
                }
            }
        };

        if let Some(rx) = parked {
            Waiter {
                locker: self,
                path: &path,
                rx,
                served: false,
            }
            .await;
        }

        PathGuard {
            locker: Arc::clone(self),
            path,
        }
    }

    /// Hands `path` to its next live waiter, or retires the entry.
    fn release(&self, path: &Path) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(path) else {
            return;
        };
        while let Some(waiter) = entry.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                let held = entry.updated_at.elapsed();
                entry.updated_at = Instant::now();
                trace!(
                    path = %path.display(),
                    held_ms = held.as_millis() as u64,
                    "cache path handed to next waiter"
                );
                return;
            }
            // Waiter gave up before being served; skip it.
        }
        entries.remove(path);
    }

    /// Number of owned paths, for tests.
    #[cfg(test)]
    fn owned(&self) -> usize {
        self.entries.lock().len()
    }
}

/// A parked acquisition.
///
/// If this future is dropped after the holder has already handed the
/// path over, ownership is passed straight on to the next waiter;
/// closing the channel first means `release` sees a waiter that gave up
/// strictly before or strictly after handoff, never ambiguously.
struct Waiter<'a> {
    /// The owning table.
    locker: &'a Arc<PathLocker>,
    /// The path being acquired.
    path: &'a Path,
    /// Handoff channel from the releasing holder.
    rx: oneshot::Receiver<()>,
    /// Set once handoff has been observed by `poll`.
    served: bool,
}

impl Future for Waiter<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match Pin::new(&mut self.rx).poll(cx) {
            // An errored channel means the table entry vanished out from
            // under us; claim ownership rather than wait forever.
            Poll::Ready(_) => {
                self.served = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.served {
            return;
        }
        // Refuse any future handoff, then check whether one already won
        // the race; if so we briefly own the path and must pass it on.
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.locker.release(self.path);
        }
    }
}

/// Ownership of a cache path; released on drop.
///
/// Pairing of acquire and release in every success and error path is
/// structural: the guard cannot outlive the operation that holds it.
pub(crate) struct PathGuard {
    /// The owning table.
    locker: Arc<PathLocker>,
    /// The owned path.
    path: PathBuf,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        self.locker.release(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;

    fn key(name: &str) -> PathBuf {
        PathBuf::from("/cache/aa").join(name)
    }

    #[tokio::test]
    async fn uncontended_acquire_is_immediate() {
        let locker = Arc::new(PathLocker::default());
        let guard = locker.acquire(key("entry")).await;
        assert_eq!(locker.owned(), 1);
        drop(guard);
        assert_eq!(locker.owned(), 0);
    }

    #[tokio::test]
    async fn distinct_paths_do_not_contend() {
        let locker = Arc::new(PathLocker::default());
        let a = locker.acquire(key("a")).await;
        let b = locker.acquire(key("b")).await;
        assert_eq!(locker.owned(), 2);
        drop(a);
        drop(b);
        assert_eq!(locker.owned(), 0);
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let locker = Arc::new(PathLocker::default());
        let holder = locker.acquire(key("entry")).await;

        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handles = Vec::new();
        for i in 0..5 {
            let locker = Arc::clone(&locker);
            let order_tx = order_tx.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locker.acquire(key("entry")).await;
                order_tx.send(i).unwrap();
            }));
            // Let the task park before enqueueing the next.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(holder);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut served = Vec::new();
        while let Ok(i) = order_rx.try_recv() {
            served.push(i);
        }
        assert_eq!(served, vec![0, 1, 2, 3, 4]);
        assert_eq!(locker.owned(), 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_is_skipped() {
        let locker = Arc::new(PathLocker::default());
        let holder = locker.acquire(key("entry")).await;

        let abandoned = {
            let locker = Arc::clone(&locker);
            tokio::spawn(async move {
                let _guard = locker.acquire(key("entry")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();
        let _ = abandoned.await;

        let survivor = {
            let locker = Arc::clone(&locker);
            tokio::spawn(async move {
                let _guard = locker.acquire(key("entry")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(holder);
        survivor.await.unwrap();
        assert_eq!(locker.owned(), 0);
    }

    #[tokio::test]
    async fn ownership_excludes_other_tasks() {
        let locker = Arc::new(PathLocker::default());
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locker = Arc::clone(&locker);
            let active = Arc::clone(&active);
            handles.push(tokio::spawn(async move {
                let _guard = locker.acquire(key("entry")).await;
                assert_eq!(
                    active.fetch_add(1, Ordering::SeqCst),
                    0,
                    "two tasks held the same path"
                );
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(locker.owned(), 0);
    }
}
