//! The deployment shapes the harness can run as, behind one contract:
//! run until the stop signal fired, then print what was measured.

use std::convert::Infallible;

use rama::{
    Service,
    error::BoxError,
    graceful::ShutdownGuard,
    http::{Request, Response},
    telemetry::tracing::{self, Instrument as _},
};

use crate::{
    client::ClientPool,
    handler::{ApiServerHandler, EtcdHandler},
    server::LifecycleServer,
    utils::env::project_name,
};

/// A lifecycle server with the memory churn handler and a client pool,
/// running side by side under the same stop signal.
pub struct ApiServer {
    server: LifecycleServer<ApiServerHandler>,
    client_pool: ClientPool,
}

impl ApiServer {
    pub fn new(server: LifecycleServer<ApiServerHandler>, client_pool: ClientPool) -> Self {
        Self {
            server,
            client_pool,
        }
    }

    /// Run server and client pool until the guard is cancelled,
    /// returning only once both of them are done.
    ///
    /// A server failure is returned immediately, dropping the dispatch loops.
    pub async fn run(&self, guard: ShutdownGuard) -> Result<(), BoxError> {
        tokio::try_join!(run_server(&self.server, guard.clone()), async {
            self.client_pool.run(guard).await;
            Ok::<_, BoxError>(())
        })?;
        Ok(())
    }

    /// Only the client pool measures latency.
    pub fn print_metric(&self) {
        self.server.print_metric();
        self.client_pool.print_metric();
    }
}

pub enum Component {
    /// pure client pool
    Client(ClientPool),
    /// server and client pool combined
    ApiServer(ApiServer),
    /// standalone server answering with a payload
    Etcd(LifecycleServer<EtcdHandler>),
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::ApiServer(_) => "apiserver",
            Self::Etcd(_) => "etcd",
        }
    }

    pub async fn run(&self, guard: ShutdownGuard) -> Result<(), BoxError> {
        match self {
            Self::Client(pool) => {
                pool.run(guard).await;
                Ok(())
            }
            Self::ApiServer(api_server) => api_server.run(guard).await,
            Self::Etcd(server) => run_server(server, guard).await,
        }
    }

    pub fn print_metric(&self) {
        match self {
            Self::Client(pool) => pool.print_metric(),
            Self::ApiServer(api_server) => api_server.print_metric(),
            Self::Etcd(server) => server.print_metric(),
        }
    }
}

async fn run_server<H>(server: &LifecycleServer<H>, guard: ShutdownGuard) -> Result<(), BoxError>
where
    H: Service<Request, Output = Response, Error = Infallible>,
{
    tracing::info!("spawning lifecycle server...");
    let result = server
        .run(guard)
        .instrument(tracing::debug_span!(
            "lifecycle server lifetime",
            server.service.name = project_name(),
            otel.kind = "server",
            network.protocol.name = "http",
        ))
        .await;
    if let Err(err) = &result {
        tracing::error!("lifecycle server exited with an error: {err}");
    }
    result
}
