use std::{convert::Infallible, path::PathBuf, time::Duration};

use rama::{
    Service,
    error::BoxError,
    http::{Request, Response, Uri},
    net::socket::Interface,
};

use clap::Args;
use http_memory_lib::{
    client::{ClientPool, ClientPoolConfig},
    handler::DEFAULT_PAYLOAD_SIZE,
    server::{LifecycleServer, LifecycleServerConfig},
};

pub mod apiserver;
pub mod client;
pub mod etcd;

/// Parse a human duration such as `20m`, `50ms` or `1h 30m`.
pub fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s.trim())
}

#[derive(Debug, Clone, Args)]
pub struct ClientArgs {
    /// endpoint every client sends its GET requests to
    #[arg(long, value_name = "URI", required = true)]
    pub endpoint: Uri,

    /// requests per second, shared by all clients
    #[arg(long, default_value_t = 1.)]
    pub qps: f64,

    /// amount of concurrent clients, each with its own connections
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub pool_size: usize,

    /// log a warning for every call slower than this (0 = disabled)
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    pub threshold: Duration,

    /// give up on a single request after this duration
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    pub timeout: Duration,
}

impl ClientArgs {
    pub async fn try_new_client_pool(&self, trust_root: PathBuf) -> Result<ClientPool, BoxError> {
        ClientPool::try_new(ClientPoolConfig {
            endpoint: self.endpoint.clone(),
            qps: self.qps,
            trust_root,
            pool_size: self.pool_size,
            threshold: Some(self.threshold),
            request_timeout: self.timeout,
        })
        .await
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// network interface to bind the server to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "0.0.0.0:8080"
    )]
    pub bind: Interface,

    /// PEM private key of the server certificate
    #[arg(long, value_name = "FILE", required = true)]
    pub key_path: PathBuf,

    /// time each request is kept in flight by the handler
    #[arg(long, value_parser = parse_duration, default_value = "50ms")]
    pub sleep_duration: Duration,

    /// bytes allocated (apiserver) or returned (etcd) per request
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_PAYLOAD_SIZE)]
    pub payload_size: usize,

    /// time given to in-flight requests once the run is over
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub grace: Duration,
}

impl ServerArgs {
    pub async fn try_new_server<H>(
        &self,
        cert_path: PathBuf,
        handler: H,
    ) -> Result<LifecycleServer<H>, BoxError>
    where
        H: Service<Request, Output = Response, Error = Infallible>,
    {
        LifecycleServer::try_new(
            LifecycleServerConfig {
                bind: self.bind.clone(),
                cert_path,
                key_path: self.key_path.clone(),
                grace: self.grace,
            },
            handler,
        )
        .await
    }
}
