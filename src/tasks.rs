//! Background task registry: the event dispatcher and the maintenance sweeps.
//!
//! Every task listens on one shared [`CancellationToken`]; [`BackgroundTasks::shutdown`]
//! cancels it and joins the handles.

use std::{fmt, future::Future, panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::now,
    events::{EventStream, Notifier, dispatch},
    services::maintenance_service,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Listener,
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Listener => write!(f, "Listener"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn `future`, logging a panic instead of losing it silently.
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) if !shutdown.is_cancelled() => {
                    tracing::warn!(task = %name, kind = %kind, "background task exited early");
                }
                Ok(()) => {}
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(task = %name, kind = %kind, panic = %message, "background task panicked");
                }
            }
        };

        let handle = tokio::spawn(wrapped);
        tracing::debug!(task = %name, kind = %kind, "background task registered");
        self.tasks.push(RegisteredTask { name, handle });
    }

    /// Forward post-commit events to `notifier` until shutdown.
    pub fn spawn_dispatcher<N: Notifier>(&mut self, events: EventStream, notifier: N) {
        let token = self.shutdown_token();
        self.spawn("event_dispatcher", TaskKind::Listener, dispatch(events, notifier, token));
    }

    /// Register the expiration, cleanup and delivery-retry sweeps.
    pub fn spawn_maintenance(&mut self, state: &AppState) {
        let config = state.maintenance.clone();

        let s = state.clone();
        self.spawn_periodic("order_expiration", config.expire_interval, move || {
            let state = s.clone();
            async move {
                if let Err(err) = maintenance_service::expire_pending_orders(&state, now()).await {
                    tracing::warn!(error = %err, "expiration sweep failed");
                }
            }
        });

        let s = state.clone();
        self.spawn_periodic("order_cleanup", config.cleanup_interval, move || {
            let state = s.clone();
            async move {
                if let Err(err) = maintenance_service::purge_expired_orders(&state, now()).await {
                    tracing::warn!(error = %err, "cleanup sweep failed");
                }
            }
        });

        let s = state.clone();
        self.spawn_periodic("delivery_retry", config.retry_interval, move || {
            let state = s.clone();
            async move {
                match maintenance_service::retry_failed_deliveries(&state, now()).await {
                    Ok(report) if report != Default::default() => {
                        tracing::info!(?report, "delivery retry sweep finished");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "delivery retry sweep failed"),
                }
            }
        });
    }

    fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut sweep: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown_token();
        self.spawn(name, TaskKind::Periodic, async move {
            let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                // Cancelling mid-sweep drops the open order transaction, which rolls it back.
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sweep() => {}
                }
            }
            tracing::info!(task = name, "sweep stopped");
        });
    }

    pub async fn shutdown(self) {
        tracing::info!(count = self.tasks.len(), "shutting down background tasks");
        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => tracing::debug!(task = %task.name, "task stopped"),
                Err(e) if e.is_cancelled() => tracing::debug!(task = %task.name, "task cancelled"),
                Err(e) => tracing::error!(task = %task.name, error = ?e, "task join failed"),
            }
        }
        tracing::info!("all background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn periodic_task_runs_until_shutdown() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut tasks = BackgroundTasks::new();

        let counter = runs.clone();
        tasks.spawn_periodic("counter", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(tasks.len(), 1);

        tokio::time::sleep(Duration::from_secs(35)).await;
        tasks.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
