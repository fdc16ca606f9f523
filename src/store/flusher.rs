//! Debounced background flushing.
//!
//! One dedicated thread owns all disk writes for an engine. The first dirty
//! mark after a quiet period wakes it; it then sleeps one debounce window so
//! a burst of mutations coalesces into a single write-replace per collection,
//! and hands the drained batch to the engine's flush callback.
//!
//! Shutdown drains whatever is still pending before the thread exits, and
//! [`Flusher::stop`] joins the thread, so no write can land after it returns.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::model::CollectionName;

type FlushFn = Box<dyn Fn(Vec<CollectionName>) + Send + 'static>;

/// Handle to the flusher thread.
pub struct Flusher {
    shared: Arc<FlushShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct FlushShared {
    state: Mutex<FlushState>,
    cond: Condvar,
}

struct FlushState {
    pending: BTreeSet<CollectionName>,
    shutdown: bool,
}

impl Flusher {
    /// Spawn the flusher thread. `flush` receives each drained batch of
    /// dirty collection names.
    pub fn spawn(debounce: Duration, flush: impl Fn(Vec<CollectionName>) + Send + 'static) -> Self {
        let shared = Arc::new(FlushShared {
            state: Mutex::new(FlushState {
                pending: BTreeSet::new(),
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let flush: FlushFn = Box::new(flush);
        let handle = std::thread::Builder::new()
            .name("polystore-flush".to_string())
            .spawn(move || run(thread_shared, debounce, flush))
            .expect("failed to spawn flusher thread");

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a collection for flushing after the debounce window.
    pub fn mark_dirty(&self, name: CollectionName) {
        let mut state = self.shared.state.lock();
        let was_idle = state.pending.is_empty();
        state.pending.insert(name);
        // only the first mark of a burst wakes the thread; later marks ride
        // the same debounce window
        if was_idle {
            self.shared.cond.notify_one();
        }
    }

    /// Stop the thread, draining pending work first. Blocks until any
    /// in-flight write has completed.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.cond.notify_one();
        }

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<FlushShared>, debounce: Duration, flush: FlushFn) {
    loop {
        let batch = {
            let mut state = shared.state.lock();

            while state.pending.is_empty() && !state.shutdown {
                shared.cond.wait(&mut state);
            }

            if state.pending.is_empty() {
                // shutdown with nothing left to write
                return;
            }

            // coalesce the burst: sleep out the window unless shutting down
            if !state.shutdown {
                shared.cond.wait_for(&mut state, debounce);
            }

            let drained = std::mem::take(&mut state.pending);
            drained.into_iter().collect::<Vec<_>>()
        };

        flush(batch);

        let state = shared.state.lock();
        if state.shutdown && state.pending.is_empty() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_burst_coalesces_to_one_batch() {
        let batches = Arc::new(AtomicUsize::new(0));
        let names = Arc::new(AtomicUsize::new(0));

        let b = batches.clone();
        let n = names.clone();
        let flusher = Flusher::spawn(Duration::from_millis(50), move |batch| {
            b.fetch_add(1, Ordering::SeqCst);
            n.fetch_add(batch.len(), Ordering::SeqCst);
        });

        let name = CollectionName::new("tools").unwrap();
        for _ in 0..10 {
            flusher.mark_dirty(name.clone());
        }

        std::thread::sleep(Duration::from_millis(400));
        flusher.stop();

        assert_eq!(batches.load(Ordering::SeqCst), 1);
        assert_eq!(names.load(Ordering::SeqCst), 1); // set-deduplicated
    }

    #[test]
    fn test_distinct_collections_share_a_batch() {
        let names = Arc::new(Mutex::new(Vec::new()));

        let n = names.clone();
        let flusher = Flusher::spawn(Duration::from_millis(50), move |batch| {
            n.lock().extend(batch);
        });

        flusher.mark_dirty(CollectionName::new("tools").unwrap());
        flusher.mark_dirty(CollectionName::new("users").unwrap());

        std::thread::sleep(Duration::from_millis(400));
        flusher.stop();

        let seen = names.lock();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_stop_drains_pending() {
        let batches = Arc::new(AtomicUsize::new(0));

        let b = batches.clone();
        // long window so stop() must cut it short
        let flusher = Flusher::spawn(Duration::from_secs(60), move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        flusher.mark_dirty(CollectionName::new("tools").unwrap());
        flusher.stop();

        assert_eq!(batches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_without_work_is_clean() {
        let flusher = Flusher::spawn(Duration::from_millis(10), |_| {});
        flusher.stop();
    }
}
