use crate::native::Native;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

struct Running {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

/// Periodically refreshes every language's translations in the background.
///
/// One task at most: starting while running is a no-op. The task holds only
/// a weak reference to the orchestrator and exits once it is dropped.
pub struct BackgroundSync {
    native: Weak<Native>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl BackgroundSync {
    pub fn new(native: &Arc<Native>, interval: Duration) -> Self {
        Self {
            native: Arc::downgrade(native),
            interval,
            running: Mutex::new(None),
        }
    }

    /// Spawn the sync task. Returns `false` if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Background sync already running");
            return false;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(run_sync_loop(
            self.native.clone(),
            self.interval,
            Arc::clone(&stop),
            Arc::clone(&wake),
        ));
        *running = Some(Running { handle, stop, wake });
        info!("Background sync started (every {:?})", self.interval);
        true
    }

    /// Signal the task to stop and wait for it to exit.
    ///
    /// A fetch in progress is allowed to finish; a pending sleep is cut short.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        running.stop.store(true, Ordering::SeqCst);
        running.wake.notify_one();
        if let Err(e) = running.handle.await {
            error!("Background sync task ended abnormally: {}", e);
        }
        info!("Background sync stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn run_sync_loop(
    native: Weak<Native>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    while !stop.load(Ordering::SeqCst) {
        let Some(native) = native.upgrade() else {
            debug!("Orchestrator dropped, background sync exiting");
            break;
        };

        debug!("Background sync: fetching translations");
        let outcome = AssertUnwindSafe(native.fetch_translations(None))
            .catch_unwind()
            .await;
        drop(native);

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Fetching daemon exception: {}", e),
            Err(panic) => error!("Fetching daemon exception: {}", panic_message(panic.as_ref())),
        }

        if stop.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.notified() => {}
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
