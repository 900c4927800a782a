//! Continuous mode: converge on startup, then on every settled change and
//! every fallback interval, until SIGINT or SIGTERM.

use crate::debounce::Debouncer;
use crate::reconcile::{Reconciler, Trigger};
use crate::scheduler::FallbackScheduler;
use crate::watcher::EventSource;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Capacity of the channel between the event source and the debouncer.
const CHANGE_CHANNEL_CAPACITY: usize = 100;

/// Timing for the two trigger paths.
#[derive(Debug, Clone, Copy)]
pub struct DaemonSettings {
    pub debounce: Duration,
    pub fallback_interval: Duration,
}

/// Run the daemon on a fresh runtime until a termination signal arrives.
pub fn run(reconciler: Arc<Reconciler>, settings: DaemonSettings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        tracing::info!("termination requested");
        let _ = shutdown_tx.send(true);
    })
    .map_err(|e| Error::Other(format!("failed to install signal handler: {}", e)))?;

    runtime.block_on(serve(reconciler, settings, shutdown_rx));
    Ok(())
}

/// Drive reconciliation until `shutdown` turns true.
///
/// Passes run on the blocking pool; a pass already under way when shutdown
/// arrives runs to completion.
pub async fn serve(reconciler: Arc<Reconciler>, settings: DaemonSettings, shutdown: watch::Receiver<bool>) {
    tracing::info!(
        target_file = %reconciler.settings().target.display(),
        overrides = %reconciler.settings().overrides.display(),
        debounce_secs = settings.debounce.as_secs_f64(),
        fallback_secs = settings.fallback_interval.as_secs_f64(),
        "stickyconf daemon starting"
    );

    run_pass(reconciler.clone(), Trigger::Startup).await;

    let (changes_tx, changes_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
    let source = EventSource::new(&reconciler.watched_files());
    let source_task = tokio::spawn(source.run(changes_tx, shutdown.clone()));

    let debounce_task = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move {
            Debouncer::new(settings.debounce)
                .run(changes_rx, move || {
                    tokio::spawn(run_pass(reconciler.clone(), Trigger::Event));
                })
                .await;
        })
    };

    let scheduler_task = {
        let reconciler = reconciler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            FallbackScheduler::new(settings.fallback_interval)
                .run(shutdown, move || run_pass(reconciler.clone(), Trigger::Fallback))
                .await;
        })
    };

    let (source_res, debounce_res, scheduler_res) =
        tokio::join!(source_task, debounce_task, scheduler_task);
    for (task, res) in [
        ("event source", source_res),
        ("debouncer", debounce_res),
        ("fallback scheduler", scheduler_res),
    ] {
        if let Err(e) = res {
            tracing::error!(task, error = %e, "daemon task failed");
        }
    }

    tracing::info!("stickyconf daemon stopped");
}

/// Run one pass on the blocking pool and wait for it.
///
/// Failures were already logged by the reconciler; the next trigger retries.
async fn run_pass(reconciler: Arc<Reconciler>, trigger: Trigger) {
    match tokio::task::spawn_blocking(move || reconciler.reconcile(trigger)).await {
        Ok(Ok(outcome)) if outcome.changed => {
            tracing::info!(%trigger, decision = %outcome.decision, "converged");
        }
        Ok(Ok(outcome)) => {
            tracing::debug!(%trigger, decision = %outcome.decision, "no change");
        }
        Ok(Err(_)) => {}
        Err(e) => {
            tracing::error!(%trigger, error = %e, "reconciliation task panicked");
        }
    }
}
