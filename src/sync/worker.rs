//! Background sync loop.
//!
//! One thread per git-sync provider, sleeping on a condition variable so
//! shutdown can interrupt the interval wait immediately. Each tick runs one
//! cycle; errors are the cycle's to log — nothing escapes the loop, because
//! an uncaught failure here would silently kill all future syncing.
//! [`SyncWorker::stop`] joins the thread, so any in-flight cycle finishes
//! before resources are released.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Handle to the background sync thread.
pub(crate) struct SyncWorker {
    shared: Arc<WorkerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct WorkerShared {
    shutdown: Mutex<bool>,
    cond: Condvar,
}

impl SyncWorker {
    /// Spawn the loop; `cycle` runs once per interval and handles its own
    /// errors.
    pub fn spawn(interval: Duration, cycle: impl Fn() + Send + 'static) -> Self {
        let shared = Arc::new(WorkerShared {
            shutdown: Mutex::new(false),
            cond: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("polystore-sync".to_string())
            .spawn(move || loop {
                {
                    let mut shutdown = thread_shared.shutdown.lock();
                    if !*shutdown {
                        thread_shared.cond.wait_for(&mut shutdown, interval);
                    }
                    if *shutdown {
                        return;
                    }
                }
                cycle();
            })
            .expect("failed to spawn sync worker thread");

        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the loop, waiting for any in-flight cycle to complete.
    pub fn stop(&self) {
        {
            let mut shutdown = self.shared.shutdown.lock();
            *shutdown = true;
            self.shared.cond.notify_one();
        }

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
