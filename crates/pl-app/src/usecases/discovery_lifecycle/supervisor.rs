use futures::FutureExt;
use pl_core::ports::{CycleSignal, ServiceContext, ServiceWorker};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Counts coordinator-owned tasks that are still alive.
#[derive(Clone, Default)]
pub(super) struct TaskCounter(Arc<AtomicUsize>);

impl TaskCounter {
    pub(super) fn track(&self) -> TaskToken {
        self.0.fetch_add(1, Ordering::SeqCst);
        TaskToken(self.0.clone())
    }

    pub(super) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements the counter when the owning task's future is dropped, whether
/// it finished or was aborted.
pub(super) struct TaskToken(Arc<AtomicUsize>);

impl Drop for TaskToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run `worker` until the context is cancelled. Errors and panics are
/// contained here and the worker is restarted after `restart_delay`.
pub(super) async fn supervise(
    name: &'static str,
    worker: Arc<dyn ServiceWorker>,
    ctx: ServiceContext,
    restart_delay: Duration,
    _token: TaskToken,
) {
    let span = info_span!("app.supervisor", service = name);
    async move {
        loop {
            match AssertUnwindSafe(worker.run(ctx.clone())).catch_unwind().await {
                Ok(Ok(())) => {
                    if !ctx.is_cancelled() {
                        info!("Service finished on its own");
                    }
                    break;
                }
                Ok(Err(err)) => error!(error = %err, "Service failed"),
                Err(_) => error!("Service panicked"),
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(restart_delay) => {
                    warn!(delay_secs = restart_delay.as_secs(), "Restarting service");
                }
            }
        }
        debug!("Service stopped");
    }
    .instrument(span)
    .await
}

/// Shared discovery schedule. The first heartbeat fires one period after
/// start; services do their own initial round when they start.
pub(super) async fn heartbeat(
    cycles: broadcast::Sender<CycleSignal>,
    cancel: CancellationToken,
    period: Duration,
    _token: TaskToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // No subscribers just means every service is between runs.
                let _ = cycles.send(CycleSignal::Heartbeat);
            }
        }
    }
}
