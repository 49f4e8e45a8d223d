//! Single-shot, re-armable flush timer.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Coalesces repeated triggers into one run after a quiet period.
///
/// Every `schedule` call restarts the timer. Once the timer fires the task
/// runs to completion on its own; later calls cannot abort it.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Creates a debouncer with a fixed delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: Mutex::new(None),
        }
    }

    /// The quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer, replacing any armed one.
    ///
    /// Outside a tokio runtime nothing is scheduled; the work stays queued
    /// until the next explicit sync.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, flush not scheduled");
            return;
        };

        let delay = self.delay;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(task);
        });
        if let Some(previous) = self.timer.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Disarms the timer.
    pub fn cancel(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    /// Returns true while the timer is armed.
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
