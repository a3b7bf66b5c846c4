use tracing::{error, info};

mod auth;
mod bus;
mod chat;
mod config;
mod context;
mod entity;
mod error;
mod feed;
mod interface;
mod store;
#[cfg(test)]
mod testing;
mod view;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Chatroom starting...");

    let bind_addr = config.bind_addr();
    let ctx = context::AppContext::start(config).await?;

    let app = interface::web::WebInterface::new(ctx.clone()).router()?;

    info!("Serving chat page on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
    }

    ctx.shutdown().await;

    Ok(())
}
