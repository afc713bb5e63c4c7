//! Rate-paced client pool.
//!
//! A fixed number of slots, each owning its own HTTP client, dispatch
//! GET requests against a single endpoint at a shared fixed rate until
//! the shutdown guard is cancelled. Each dispatch runs detached from the
//! pacing loop, so a slow or stalled request never delays the next tick.

use std::{path::PathBuf, sync::Arc, time::Duration};

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{Body, Request, Response, Uri},
    telemetry::tracing::{self, Instrument as _},
};
use tokio::{task::JoinSet, time::Instant};

use crate::latency::LatencyRecorder;

mod pacer;
mod web;

pub use self::pacer::tick_interval;
pub use self::web::{WebClient, new_web_client, try_load_trust_root};

use self::pacer::SharedPacer;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientPoolConfig {
    /// target of every dispatched GET request
    pub endpoint: Uri,
    /// requests per second, shared by all slots
    pub qps: f64,
    /// PEM file with the CA certificate(s) used to verify the server
    pub trust_root: PathBuf,
    pub pool_size: usize,
    /// log a warning for every call slower than this
    pub threshold: Option<Duration>,
    pub request_timeout: Duration,
}

#[derive(Debug)]
pub struct ClientPool<S = WebClient> {
    clients: Vec<Arc<S>>,
    tick: Duration,
    ctx: Arc<DispatchContext>,
}

#[derive(Debug)]
struct DispatchContext {
    endpoint: Uri,
    threshold: Option<Duration>,
    recorder: LatencyRecorder,
}

impl ClientPool {
    /// Create a pool of `pool_size` web clients.
    ///
    /// Fails if the configuration is invalid or the trust root cannot be used,
    /// in which case no client is created at all.
    pub async fn try_new(cfg: ClientPoolConfig) -> Result<Self, BoxError> {
        if cfg.pool_size == 0 {
            return Err(BoxError::from("client pool size must be at least 1"));
        }
        // validate the rate before any client is built
        tick_interval(cfg.qps)?;

        let tls_config = try_load_trust_root(&cfg.trust_root)
            .await
            .context("load client pool trust root")?;

        let clients = (0..cfg.pool_size)
            .map(|_| new_web_client(tls_config.clone(), cfg.request_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            endpoint = %cfg.endpoint,
            qps = cfg.qps,
            pool_size = cfg.pool_size,
            threshold = ?cfg.threshold,
            "client pool ready",
        );

        Self::try_with_clients(cfg.endpoint, cfg.qps, cfg.threshold, clients)
    }
}

impl<S> ClientPool<S>
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    /// Create a pool with one slot per provided client.
    pub fn try_with_clients(
        endpoint: Uri,
        qps: f64,
        threshold: Option<Duration>,
        clients: Vec<S>,
    ) -> Result<Self, BoxError> {
        if clients.is_empty() {
            return Err(BoxError::from("client pool requires at least one client"));
        }
        let tick = tick_interval(qps)?;

        Ok(Self {
            clients: clients.into_iter().map(Arc::new).collect(),
            tick,
            ctx: Arc::new(DispatchContext {
                endpoint,
                threshold: threshold.filter(|d| !d.is_zero()),
                recorder: LatencyRecorder::new(),
            }),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.clients.len()
    }

    pub fn recorder(&self) -> &LatencyRecorder {
        &self.ctx.recorder
    }

    /// Dispatch requests from all slots until the guard is cancelled.
    ///
    /// Returns once every dispatch loop has exited. Requests still in flight
    /// at that point are not awaited, nor cancelled.
    pub async fn run(&self, guard: ShutdownGuard) {
        let pacer = SharedPacer::new(self.tick);
        let mut loops = JoinSet::new();

        for (index, client) in self.clients.iter().enumerate() {
            loops.spawn(dispatch_loop(
                index,
                client.clone(),
                pacer.clone(),
                self.ctx.clone(),
                guard.clone(),
            ));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(err) = result {
                tracing::error!("client dispatch loop failed to join: {err}");
            }
        }

        tracing::debug!("all client dispatch loops stopped");
    }

    /// Log the latency percentiles of all successful calls.
    pub fn print_metric(&self) {
        match self.ctx.recorder.summarize() {
            Some(summary) => summary.log(),
            None => tracing::info!("Nothing to print"),
        }
    }
}

async fn dispatch_loop<S>(
    index: usize,
    client: Arc<S>,
    pacer: SharedPacer,
    ctx: Arc<DispatchContext>,
    guard: ShutdownGuard,
) where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    loop {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!(slot = index, "exit client dispatch loop: guard shutdown");
                return;
            }
            _ = pacer.tick() => {
                tokio::spawn(
                    dispatch(index, client.clone(), ctx.clone())
                        .instrument(tracing::trace_span!("dispatch", slot = index)),
                );
            }
        }
    }
}

async fn dispatch<S>(index: usize, client: Arc<S>, ctx: Arc<DispatchContext>)
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    let mut req = Request::new(Body::empty());
    *req.uri_mut() = ctx.endpoint.clone();

    let start = Instant::now();
    let result = client.serve(req).await;
    let elapsed = start.elapsed();

    let resp = match result {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!("Client {index} error: {err}");
            return;
        }
    };
    tracing::trace!(
        slot = index,
        status = resp.status().as_u16(),
        version = ?resp.version(),
        ?elapsed,
        "client call done",
    );

    if let Some(threshold) = ctx.threshold
        && elapsed > threshold
    {
        tracing::warn!(slot = index, ?threshold, "Client {index} call duration {elapsed:?}");
    }

    ctx.recorder.record(elapsed);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rama::{graceful::Shutdown, http::StatusCode, telemetry::tracing};
    use tokio::time;
    use tracing_test::traced_test;

    use super::*;

    #[derive(Debug, Clone)]
    struct FakeClient {
        calls: Arc<AtomicUsize>,
        latency: Duration,
        fail: bool,
    }

    impl FakeClient {
        fn new(latency: Duration) -> Self {
            Self {
                calls: Default::default(),
                latency,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Duration::from_millis(1))
            }
        }
    }

    impl Service<Request> for FakeClient {
        type Output = Response;
        type Error = BoxError;

        async fn serve(&self, _req: Request) -> Result<Self::Output, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            time::sleep(self.latency).await;
            if self.fail {
                return Err(BoxError::from("connection refused"));
            }
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::OK;
            Ok(resp)
        }
    }

    fn endpoint() -> Uri {
        Uri::from_static("https://localhost:8080/")
    }

    async fn run_for(pool: &ClientPool<FakeClient>, duration: Duration) {
        let shutdown = Shutdown::new(time::sleep(duration));
        pool.run(shutdown.guard()).await;
        shutdown.shutdown().await;
    }

    /// Let the detached dispatch tasks run to completion.
    async fn settle() {
        time::sleep(Duration::from_secs(60)).await;
    }

    #[test]
    fn invalid_pools_are_rejected() {
        assert!(
            ClientPool::<FakeClient>::try_with_clients(endpoint(), 10., None, vec![]).is_err()
        );
        assert!(
            ClientPool::try_with_clients(
                endpoint(),
                0.,
                None,
                vec![FakeClient::new(Duration::ZERO)]
            )
            .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn single_slot_dispatches_at_configured_rate() {
        let client = FakeClient::new(Duration::from_millis(5));
        let calls = client.calls.clone();
        let pool = ClientPool::try_with_clients(
            endpoint(),
            10.,
            Some(Duration::from_millis(50)),
            vec![client],
        )
        .unwrap();

        run_for(&pool, Duration::from_secs(1)).await;
        settle().await;

        let count = calls.load(Ordering::SeqCst);
        assert!((9..=11).contains(&count), "count = {count}");
        assert_eq!(count, pool.recorder().len());
        assert!(!logs_contain("call duration"));

        pool.print_metric();
        for label in ["Perc  50", "Perc  90", "Perc  99", "Perc 99.9", "Perc 99.99", "Perc 100"] {
            assert!(logs_contain(label), "missing line: {label}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_dispatch_after_stop() {
        let client = FakeClient::new(Duration::ZERO);
        let calls = client.calls.clone();
        let pool =
            ClientPool::try_with_clients(endpoint(), 100., None, vec![client]).unwrap();

        run_for(&pool, Duration::from_millis(500)).await;
        time::sleep(Duration::from_millis(1)).await;
        let count = calls.load(Ordering::SeqCst);

        settle().await;
        assert_eq!(count, calls.load(Ordering::SeqCst));
        assert!((49..=51).contains(&count), "count = {count}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_never_delay_pacing() {
        let client = FakeClient::new(Duration::from_secs(30));
        let calls = client.calls.clone();
        let pool = ClientPool::try_with_clients(endpoint(), 10., None, vec![client]).unwrap();

        let start = Instant::now();
        run_for(&pool, Duration::from_secs(1)).await;

        // run returns at the stop signal, not after the in-flight calls
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(pool.recorder().is_empty());

        let count = calls.load(Ordering::SeqCst);
        assert!((9..=11).contains(&count), "count = {count}");

        settle().await;
        assert_eq!(count, pool.recorder().len());
    }

    #[tokio::test(start_paused = true)]
    async fn slots_share_the_rate() {
        let clients: Vec<_> = (0..4)
            .map(|i| FakeClient::new(Duration::from_millis(if i == 0 { 10_000 } else { 1 })))
            .collect();
        let calls: Vec<_> = clients.iter().map(|c| c.calls.clone()).collect();
        let pool = ClientPool::try_with_clients(endpoint(), 20., None, clients).unwrap();
        assert_eq!(4, pool.pool_size());

        run_for(&pool, Duration::from_secs(2)).await;
        settle().await;

        let per_slot: Vec<_> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        let total: usize = per_slot.iter().sum();
        assert!((39..=41).contains(&total), "total = {total}");
        assert_eq!(total, pool.recorder().len());

        // ticks go round the waiting slots, a slow call does not hold its slot back
        for (slot, count) in per_slot.iter().enumerate() {
            assert!((8..=12).contains(count), "slot {slot}: {count} of {total}");
        }
        let fast: usize = per_slot[1..].iter().sum();
        assert!(fast >= total * 3 / 4 - 3, "fast slots: {fast} of {total}");
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn slow_call_is_flagged_and_still_recorded() {
        let client = FakeClient::new(Duration::from_millis(50));
        let pool = ClientPool::try_with_clients(
            endpoint(),
            1.,
            Some(Duration::from_millis(10)),
            vec![client],
        )
        .unwrap();

        run_for(&pool, Duration::from_millis(1_500)).await;
        settle().await;

        assert_eq!(1, pool.recorder().len());
        assert!(logs_contain("Client 0 call duration"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn failed_calls_are_logged_not_recorded() {
        let client = FakeClient::failing();
        let calls = client.calls.clone();
        let pool = ClientPool::try_with_clients(endpoint(), 10., None, vec![client]).unwrap();

        run_for(&pool, Duration::from_secs(1)).await;
        settle().await;

        assert!(calls.load(Ordering::SeqCst) >= 9);
        assert!(pool.recorder().is_empty());
        assert!(logs_contain("Client 0 error: connection refused"));

        pool.print_metric();
        assert!(logs_contain("Nothing to print"));
    }

    #[tokio::test]
    async fn missing_trust_root_fails_pool_creation() {
        let result = ClientPool::try_new(ClientPoolConfig {
            endpoint: endpoint(),
            qps: 10.,
            trust_root: PathBuf::from("/this/path/does/not/exist/ca.crt"),
            pool_size: 2,
            threshold: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_pool_size_is_rejected() {
        let result = ClientPool::try_new(ClientPoolConfig {
            endpoint: endpoint(),
            qps: 10.,
            trust_root: PathBuf::from("/this/path/does/not/exist/ca.crt"),
            pool_size: 0,
            threshold: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
        .await;

        assert!(result.is_err());
    }
}
