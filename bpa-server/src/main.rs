mod aap_server;
mod clas;
mod config;
mod config_protocol;
mod dtn_clock;
mod management;
mod static_routes;

use std::sync::Arc;
use tracing::{error, info};

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

async fn wait_for_terminate() {
    #[cfg(unix)]
    {
        let mut term_handler = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register signal handlers");
        term_handler.recv().await;
    }
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

fn listen_for_cancel(tasks: &Arc<hardy_async::TaskPool>) {
    let tasks = tasks.clone();
    tasks.spawn(async move {
        tokio::select! {
            _ = wait_for_terminate() => {
                info!("received terminate signal, stopping...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, stopping...");
            }
        }
        tasks.cancel_token().cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some((config, config_source)) = config::init() else {
        return Ok(());
    };

    tracing_subscriber::fmt().with_env_filter(config::log_filter(&config)).init();

    info!("{PKG_NAME} version {PKG_VERSION} starting...");
    info!("{config_source}");

    inner_main(config).await.inspect_err(|e| error!("{e}"))
}

async fn inner_main(config: config::Config) -> anyhow::Result<()> {
    let bpa = Arc::new(hardy_bpa::Bpa::new(&config.bpa)?);
    let tasks = Arc::new(hardy_async::TaskPool::new());

    // Kept alive for the lifetime of the agent: its background watch task
    // holds its own clone, but dropping this handle early would still be
    // safe since nothing else in this binary looks routes up through it
    // yet (`static_routes`'s own doc comment: routing decisions aren't
    // wired into the router).
    let _static_routes = match config.static_routes {
        Some(routes_config) => Some(static_routes::StaticRoutes::init(routes_config).await?),
        None => None,
    };

    bpa.start();

    clas::init(config.clas, &bpa).await?;

    management::spawn(&bpa, bpa.processor().local_eid(), tasks.as_ref(), tasks.cancel_token().clone());
    config_protocol::spawn(&bpa, bpa.processor().local_eid(), tasks.as_ref(), tasks.cancel_token().clone());

    aap_server::serve(config.aap_addr, bpa.clone(), config.aap_max_payload_length, tasks.clone()).await?;

    listen_for_cancel(&tasks);

    info!("started successfully");

    tasks.cancel_token().cancelled().await;
    tasks.shutdown().await;
    bpa.shutdown().await;

    info!("stopped");

    Ok(())
}
