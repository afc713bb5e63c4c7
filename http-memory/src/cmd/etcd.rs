use std::path::PathBuf;

use rama::error::{BoxError, ErrorContext as _};

use clap::Args;
use http_memory_lib::{component::Component, handler::EtcdHandler};

use super::ServerArgs;

#[derive(Debug, Clone, Args)]
/// run a server answering every request with a fixed payload
pub struct EtcdCommand {
    #[clap(flatten)]
    pub server: ServerArgs,

    /// PEM certificate (chain) of the server
    #[arg(long, value_name = "FILE", required = true)]
    pub cert_path: PathBuf,
}

pub async fn try_new_component(args: EtcdCommand) -> Result<Component, BoxError> {
    let handler = EtcdHandler::new(args.server.sleep_duration, args.server.payload_size);
    let server = args
        .server
        .try_new_server(args.cert_path, handler)
        .await
        .context("create etcd server")?;
    Ok(Component::Etcd(server))
}
