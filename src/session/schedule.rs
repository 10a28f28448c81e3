use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Fixed(Duration),
    /// A fresh uniformly random delay in `[min, max]` before every run.
    Jittered { min: Duration, max: Duration },
}

impl Cadence {
    pub fn next_delay(&self) -> Duration {
        match *self {
            Cadence::Fixed(period) => period,
            Cadence::Jittered { min, max } if max > min => {
                let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
                Duration::from_millis(millis)
            }
            Cadence::Jittered { min, .. } => min,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    Stop,
}

/// A cancellable repeating task on the tokio runtime.
///
/// `cancel` never interrupts a run in progress; the loop exits at its next
/// check. Dropping the handle cancels and aborts the task.
pub struct PeriodicTask {
    name: &'static str,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, cadence: Cadence, mut body: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TaskControl> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let task_cancelled = Arc::clone(&cancelled);
        let task_wake = Arc::clone(&wake);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(cadence.next_delay()) => {}
                    _ = task_wake.notified() => {}
                }
                if task_cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if body().await == TaskControl::Stop {
                    break;
                }
            }
            task_cancelled.store(true, Ordering::SeqCst);
            debug!("Periodic task '{}' stopped", name);
        });

        Self {
            name,
            cancelled,
            wake,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Cancelling periodic task '{}'", self.name);
        }
        self.wake.notify_one();
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
        self.handle.abort();
    }
}
