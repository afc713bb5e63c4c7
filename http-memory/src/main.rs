#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{path::PathBuf, time::Duration};

use rama::{error::BoxError, graceful, telemetry::tracing};

#[cfg(target_family = "unix")]
use rama::error::ErrorContext as _;

use clap::{Parser, Subcommand};
use http_memory_lib::{component::Component, orchestrator, utils};

pub mod cmd;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// CLI arguments for configuring the load and memory pressure harness.
#[derive(Debug, Clone, Parser)]
#[command(name = "http-memory")]
#[command(bin_name = "http-memory")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    cmds: CliCommands,

    /// total duration of the run, after which metrics are printed
    #[arg(long, value_parser = cmd::parse_duration, default_value = "20m", global = true)]
    pub duration: Duration,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false, global = true)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    #[cfg(target_family = "unix")]
    /// Set the limit of max open file descriptors for this process and its children.
    #[arg(long, value_name = "N", default_value_t = 262_144, global = true)]
    pub ulimit: utils::os::rlim_t,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommands {
    Client(self::cmd::client::ClientCommand),
    #[command(name = "apiserver")]
    ApiServer(self::cmd::apiserver::ApiServerCommand),
    Etcd(self::cmd::etcd::EtcdCommand),
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    })?;

    #[cfg(target_family = "unix")]
    {
        let limit = utils::os::raise_nofile(args.ulimit).context("set file descriptor limit")?;
        tracing::debug!("open file descriptor limit: {limit}");
    }

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Build the component of the selected command and run it
/// for the configured duration.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let component = try_new_component(args.cmds).await?;
    orchestrator::run_for(component, args.duration, base_shutdown_signal).await
}

async fn try_new_component(cmds: CliCommands) -> Result<Component, BoxError> {
    match cmds {
        CliCommands::Client(args) => self::cmd::client::try_new_component(args).await,
        CliCommands::ApiServer(args) => self::cmd::apiserver::try_new_component(args).await,
        CliCommands::Etcd(args) => self::cmd::etcd::try_new_component(args).await,
    }
}
