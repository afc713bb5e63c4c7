//! Runs a [`Component`] for a bounded duration and prints its metrics.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use rama::{
    error::{BoxError, ErrorContext as _},
    graceful,
    telemetry::tracing,
};
use tokio::sync::oneshot;

use crate::component::Component;

/// Run the component until `run_duration` elapsed or the base shutdown
/// signal fired, whichever comes first, then print its metrics.
///
/// A fatal error returned by the component stops the run early.
/// Metrics are printed regardless, after which that error is returned.
pub async fn run_for<F>(
    component: Component,
    run_duration: Duration,
    base_shutdown_signal: F,
) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let component = Arc::new(component);
    let failure: Arc<Mutex<Option<BoxError>>> = Default::default();

    let (fatal_tx, fatal_rx) = oneshot::channel::<()>();
    let graceful = graceful::Shutdown::new(new_stop_signal(
        run_duration,
        fatal_rx,
        base_shutdown_signal,
    ));

    tracing::info!(
        component = component.name(),
        ?run_duration,
        "run component until stop signal"
    );

    graceful.spawn_task_fn({
        let component = component.clone();
        let failure = failure.clone();
        async move |guard| {
            if let Err(err) = component.run(guard).await {
                tracing::error!(component = component.name(), "component run failed: {err}");
                *failure.lock() = Some(err);
                let _ = fatal_tx.send(());
            }
        }
    });

    let delay = graceful.shutdown().await;
    tracing::debug!("gracefully shutdown with a delay of: {delay:?}");

    component.print_metric();

    match failure.lock().take() {
        Some(err) => Err(err)
            .context("run component")
            .context_field("component", component.name()),
        None => Ok(()),
    }
}

fn new_stop_signal(
    run_duration: Duration,
    fatal_rx: oneshot::Receiver<()>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        tokio::select! {
            _ = tokio::time::sleep(run_duration) => {
                tracing::info!("run duration of {run_duration:?} elapsed: init graceful shutdown");
            }
            _ = base_shutdown_signal => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            result = fatal_rx => {
                match result {
                    Ok(()) => {
                        tracing::error!("fatal err received; abort");
                    },
                    Err(_) => {
                        tracing::debug!("component is finished without error, return control");
                    },
                }
            }
        }
    }
}
