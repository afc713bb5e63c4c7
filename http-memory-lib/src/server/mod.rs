//! Lifecycle server: an HTTPS (HTTP/2 + HTTP/1.1) server around an injected
//! handler, which drains within a bounded grace period once stopped.

use std::{convert::Infallible, path::PathBuf, sync::Arc, time::Duration};

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    graceful::{Shutdown, ShutdownGuard},
    http::{
        HeaderValue, Request, Response,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
    },
    net::{address::SocketAddress, socket::Interface, tls::server::TlsPeekRouter},
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
    tls::boring::server::TlsAcceptorLayer,
};
use tokio::sync::oneshot;

use crate::utils::env::server_identifier;

mod tls;

pub use self::tls::try_new_tls_acceptor_layer;

pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LifecycleServerConfig {
    pub bind: Interface,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// time given to in-flight requests once the stop signal fired
    pub grace: Duration,
}

pub struct LifecycleServer<H> {
    bind: Interface,
    grace: Duration,
    tls_acceptor: TlsAcceptorLayer,
    handler: Arc<H>,
}

impl<H> LifecycleServer<H>
where
    H: Service<Request, Output = Response, Error = Infallible>,
{
    /// Create a new server, loading and validating its TLS identity.
    pub async fn try_new(cfg: LifecycleServerConfig, handler: H) -> Result<Self, BoxError> {
        let tls_acceptor = try_new_tls_acceptor_layer(&cfg.cert_path, &cfg.key_path)
            .await
            .context("prepare lifecycle server TLS acceptor")?;

        Ok(Self {
            bind: cfg.bind,
            grace: cfg.grace,
            tls_acceptor,
            handler: Arc::new(handler),
        })
    }

    /// Serve until the guard is cancelled, then drain within the grace period.
    pub async fn run(&self, guard: ShutdownGuard) -> Result<(), BoxError> {
        self.run_with_bound_address(guard, None).await
    }

    /// Same as [`Self::run`], reporting the bound socket address once listening.
    pub async fn run_with_bound_address(
        &self,
        guard: ShutdownGuard,
        bound_tx: Option<oneshot::Sender<SocketAddress>>,
    ) -> Result<(), BoxError> {
        let stop_signal = {
            let cancelled = guard.clone_weak().into_cancelled();
            async move {
                cancelled.await;
                tracing::info!("Shutting down sleep server");
            }
        };
        let shutdown = Shutdown::new(stop_signal);

        let exec = Executor::graceful(shutdown.guard());

        let http_svc = (
            TraceLayer::new_for_http(),
            AddRequiredResponseHeadersLayer::new()
                .with_server_header_value(HeaderValue::from_static(server_identifier())),
        )
            .into_layer(self.handler.clone());
        let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));

        let tcp_svc = TlsPeekRouter::new(self.tls_acceptor.clone().into_layer(http_server.clone()))
            .with_fallback(http_server);

        let tcp_listener = TcpListener::bind(self.bind.clone(), exec)
            .await
            .context("bind lifecycle server")
            .with_context_debug_field("interface", || self.bind.clone())?;

        let addr: SocketAddress = tcp_listener
            .local_addr()
            .context("get bound address for lifecycle server")?
            .into();
        tracing::info!("Serving on https://{addr}");
        if let Some(bound_tx) = bound_tx {
            let _ = bound_tx.send(addr);
        }

        shutdown.spawn_task_fn(async move |_guard| {
            tcp_listener.serve(tcp_svc).await;
            tracing::debug!("lifecycle server stopped accepting connections");
        });

        match shutdown.shutdown_with_limit(self.grace).await {
            Ok(delay) => {
                tracing::info!("lifecycle server shut down gracefully in {delay:?}");
            }
            Err(err) => {
                tracing::warn!(
                    grace = ?self.grace,
                    "lifecycle server grace deadline exceeded, abandon open connections: {err}",
                );
            }
        }

        Ok(())
    }

    /// The server does not measure anything itself.
    pub fn print_metric(&self) {}
}
