//! Expiry Sweeper Task
//!
//! Background task that periodically purges expired in-process state
//! (cache entries, rate-limit windows).

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something holding entries that expire passively.
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Short label used in log output.
    fn name(&self) -> &'static str;

    /// Drops expired entries, returning how many were removed.
    async fn sweep(&self) -> usize;
}

/// Owner of a running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the task. Safe to call more than once.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a task that sweeps `target` every `interval`.
///
/// The task only holds a weak reference, so it also ends on its own once the
/// target has been dropped.
pub fn spawn_sweeper<T: Sweep>(target: Weak<T>, interval: Duration) -> SweeperHandle {
    let handle = tokio::spawn(async move {
        let name = match target.upgrade() {
            Some(t) => t.name(),
            None => return,
        };
        info!("Starting {} sweeper with interval of {:?}", name, interval);

        loop {
            tokio::time::sleep(interval).await;

            let Some(target) = target.upgrade() else {
                debug!("{} sweeper: target dropped, exiting", name);
                break;
            };

            let removed = target.sweep().await;
            if removed > 0 {
                info!("{} sweep: removed {} expired entries", name, removed);
            } else {
                debug!("{} sweep: no expired entries found", name);
            }
        }
    });

    SweeperHandle { handle }
}
