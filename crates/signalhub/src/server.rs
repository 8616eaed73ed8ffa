use std::net::SocketAddr;

use anyhow::{Context, Result};
use signalhub_service::config::Config;
use signalhub_service::metric;
use signalhub_service::services::SharedServices;

use crate::endpoints;

/// Creates all services and serves HTTP based on the loaded config.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let io_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("signalhub-io")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("signalhub-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let services = SharedServices::new(&config, io_pool.handle().to_owned())
        .context("failed to create services")?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .context("invalid bind address")?;
    let server = axum_server::bind(socket)
        .serve(endpoints::create_app(services).into_make_service());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(server)?;
    tracing::info!("System shutdown complete");

    Ok(())
}
