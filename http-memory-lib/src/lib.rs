#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod client;
pub mod component;
pub mod handler;
pub mod latency;
pub mod orchestrator;
pub mod server;
pub mod utils;
