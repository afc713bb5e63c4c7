//! Workload simulating request handlers for the lifecycle server.
//!
//! Neither handler does real work: they hold on to memory and time
//! the way an API server, respectively a key-value store, would under load.

use std::{convert::Infallible, time::Duration};

use rama::{
    Service,
    http::{
        Body, Request, Response, StatusCode,
        headers::ContentType,
        service::web::response::{Headers, IntoResponse},
    },
    telemetry::tracing,
};

pub const DEFAULT_SLEEP_DURATION: Duration = Duration::from_millis(50);
pub const DEFAULT_PAYLOAD_SIZE: usize = 80_000;

/// Amount of separate allocations the API server payload is split into.
const CHUNK_COUNT: usize = 80;

/// Simulates an API server: memory is allocated per request and kept
/// alive while the request "waits" on its backend. Responds with an empty body.
#[derive(Debug, Clone)]
pub struct ApiServerHandler {
    sleep_duration: Duration,
    payload_size: usize,
}

impl ApiServerHandler {
    pub fn new(sleep_duration: Duration, payload_size: usize) -> Self {
        Self {
            sleep_duration,
            payload_size,
        }
    }

    fn allocate(&self) -> Vec<Vec<u8>> {
        let chunk_size = self.payload_size / CHUNK_COUNT;
        (0..CHUNK_COUNT).map(|_| vec![0u8; chunk_size]).collect()
    }
}

impl Default for ApiServerHandler {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_DURATION, DEFAULT_PAYLOAD_SIZE)
    }
}

impl Service<Request> for ApiServerHandler {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        let mut chunks = self.allocate();

        let version = req.version();
        tracing::info!("Got connection: sleep: {version:?}");
        tokio::time::sleep(self.sleep_duration).await;
        tracing::info!("Close connection: sleep: {version:?}");

        // write after the sleep so the allocation lives for the whole request
        for chunk in chunks.iter_mut() {
            if let Some(byte) = chunk.first_mut() {
                *byte = 1;
            }
        }
        std::hint::black_box(&chunks);

        Ok(StatusCode::OK.into_response())
    }
}

/// Simulates a key-value store: every request is answered after a fixed
/// delay with a payload of a fixed size.
#[derive(Debug, Clone)]
pub struct EtcdHandler {
    sleep_duration: Duration,
    payload_size: usize,
}

impl EtcdHandler {
    pub fn new(sleep_duration: Duration, payload_size: usize) -> Self {
        Self {
            sleep_duration,
            payload_size,
        }
    }
}

impl Default for EtcdHandler {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_DURATION, DEFAULT_PAYLOAD_SIZE)
    }
}

impl Service<Request> for EtcdHandler {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        tracing::info!("Got connection: {:?}", req.version());
        tokio::time::sleep(self.sleep_duration).await;

        Ok((
            StatusCode::OK,
            Headers::single(ContentType::octet_stream()),
            Body::from(vec![0u8; self.payload_size]),
        )
            .into_response())
    }
}
