//! Background sweep task
//!
//! Periodically asks every backend for expired (and, for the bounded
//! backend, evicted) keys and reconciles them one key lock at a time.
//! The task only holds a weak reference to the manager, so dropping the
//! manager ends the loop at the next tick even if nobody calls stop.

use crate::cache::manager::ManagerInner;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a running sweep task
pub struct SweepHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Spawn on the current runtime, `None` outside of one
    pub(crate) fn spawn(inner: Weak<ManagerInner>, interval: Duration) -> Option<Self> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Background sweep not started, no async runtime: {}", e);
                return None;
            }
        };

        let token = CancellationToken::new();
        let task = runtime.spawn(run(inner, interval, token.clone()));
        Some(Self { token, task })
    }

    /// Signal the task to stop; a sweep already in progress completes
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

async fn run(inner: Weak<ManagerInner>, period: Duration, shutdown: CancellationToken) {
    info!(interval_ms = period.as_millis() as u64, "Background cache sweep starting");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the first immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Background cache sweep shutting down");
                break;
            }

            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    debug!("Cache manager dropped, ending background sweep");
                    break;
                };

                let event = inner.sweep().await;
                if !event.is_empty() {
                    debug!(removed = event.len(), "Background sweep removed entries");
                }
            }
        }
    }
}
