//! Background task that keeps the host application's windows out of sight
//! while the debugger comes up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Platform hook for hiding the windows of a process.
pub trait WindowHider: Send + Sync {
    fn hide_windows(&self, pid: u32);
}

/// Hider that leaves windows alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWindowHider;

impl WindowHider for NoopWindowHider {
    fn hide_windows(&self, _pid: u32) {}
}

/// Handle to a running monitor.
pub struct WindowMonitor {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<u64>>,
}

impl WindowMonitor {
    /// Call `hider` for `pid` every `interval` until stopped.
    pub fn spawn(hider: Arc<dyn WindowHider>, pid: u32, interval: Duration) -> Self {
        let (tx, mut rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut passes = 0u64;
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        hider.hide_windows(pid);
                        passes += 1;
                    }
                }
            }
            passes
        });
        tracing::debug!(pid, ?interval, "window monitor started");
        Self {
            stop: Some(tx),
            task: Some(task),
        }
    }

    /// Signal the monitor and wait for it to finish. Returns the number of passes made.
    pub async fn stop(mut self) -> u64 {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        let passes = match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        };
        tracing::debug!(passes, "window monitor stopped");
        passes
    }
}

impl Drop for WindowMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
