use std::path::PathBuf;

use rama::error::{BoxError, ErrorContext as _};

use clap::Args;
use http_memory_lib::{
    component::{ApiServer, Component},
    handler::ApiServerHandler,
};

use super::{ClientArgs, ServerArgs};

#[derive(Debug, Clone, Args)]
/// run a memory churning server next to a client pool
pub struct ApiServerCommand {
    #[clap(flatten)]
    pub client: ClientArgs,

    #[clap(flatten)]
    pub server: ServerArgs,

    /// PEM certificate of the server, also the trust root of the clients
    #[arg(long, value_name = "FILE", required = true)]
    pub cert_path: PathBuf,
}

pub async fn try_new_component(args: ApiServerCommand) -> Result<Component, BoxError> {
    let handler = ApiServerHandler::new(args.server.sleep_duration, args.server.payload_size);
    let server = args
        .server
        .try_new_server(args.cert_path.clone(), handler)
        .await
        .context("create apiserver")?;

    let pool = args
        .client
        .try_new_client_pool(args.cert_path)
        .await
        .context("create client pool")?;

    Ok(Component::ApiServer(ApiServer::new(server, pool)))
}
