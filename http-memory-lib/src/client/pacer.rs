use std::{sync::Arc, time::Duration};

use rama::error::BoxError;
use tokio::{
    sync::Mutex,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};

/// Translate a target rate (queries per second) into the fixed tick interval.
///
/// The rate has to be a finite, strictly positive number whose interval
/// does not round down to zero.
pub fn tick_interval(qps: f64) -> Result<Duration, BoxError> {
    if !qps.is_finite() || qps <= 0. {
        return Err(BoxError::from(format!(
            "qps must be a finite number > 0, got: {qps}"
        )));
    }

    match Duration::try_from_secs_f64(1. / qps) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(BoxError::from(format!(
            "qps {qps} is too high to be paced by a timer"
        ))),
    }
}

/// Fixed interval pacer shared by all dispatch loops of a pool.
///
/// Every tick is handed to exactly one waiting loop, so the pool as a whole
/// dispatches at the target rate. The first tick happens one interval after
/// creation. Ticks missed because no loop was waiting are skipped, never
/// bursted.
#[derive(Debug, Clone)]
pub(super) struct SharedPacer {
    interval: Arc<Mutex<Interval>>,
}

impl SharedPacer {
    pub(super) fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval: Arc::new(Mutex::new(interval)),
        }
    }

    /// Wait for the next tick. Cancel safe.
    pub(super) async fn tick(&self) -> Instant {
        self.interval.lock().await.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{task::yield_now, time};

    #[test]
    fn tick_interval_is_inverse_of_rate() {
        assert_eq!(Duration::from_millis(100), tick_interval(10.).unwrap());
        assert_eq!(Duration::from_secs(2), tick_interval(0.5).unwrap());
    }

    #[test]
    fn tick_interval_rejects_invalid_rates() {
        for qps in [0., -1., f64::NAN, f64::INFINITY, 1e12] {
            assert!(tick_interval(qps).is_err(), "qps = {qps}");
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn first_tick_is_one_period_away() {
        time::pause();

        let pacer = SharedPacer::new(Duration::from_millis(100));
        let h = tokio::spawn({
            let pacer = pacer.clone();
            async move { pacer.tick().await }
        });

        yield_now().await;
        assert!(!h.is_finished());

        time::advance(Duration::from_millis(99)).await;
        yield_now().await;
        assert!(!h.is_finished());

        time::advance(Duration::from_millis(1)).await;
        h.await.expect("task join");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ticks_are_shared_between_waiters() {
        time::pause();

        let pacer = SharedPacer::new(Duration::from_millis(10));
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for _ in 0..4 {
            let pacer = pacer.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                loop {
                    pacer.tick().await;
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            });
        }

        time::sleep(Duration::from_millis(105)).await;
        assert_eq!(10, counter.load(std::sync::atomic::Ordering::SeqCst));
    }
}
