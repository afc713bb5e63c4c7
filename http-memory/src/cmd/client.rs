use std::path::PathBuf;

use rama::error::{BoxError, ErrorContext as _};

use clap::Args;
use http_memory_lib::component::Component;

use super::ClientArgs;

#[derive(Debug, Clone, Args)]
/// send requests at a fixed rate and report their latency
pub struct ClientCommand {
    #[clap(flatten)]
    pub client: ClientArgs,

    /// PEM CA certificate(s) used to verify the server
    #[arg(long, value_name = "FILE", required = true)]
    pub cert_path: PathBuf,
}

pub async fn try_new_component(args: ClientCommand) -> Result<Component, BoxError> {
    let pool = args
        .client
        .try_new_client_pool(args.cert_path)
        .await
        .context("create client pool")?;
    Ok(Component::Client(pool))
}
