pub use crate::common::{ApiError, ApiResult};

use axum::Router;
use database::PgDatabase;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use transit::{client::Client, engine::EngineHandle};

use crate::security::AuthConfig;

pub mod api;
pub mod common;
pub mod security;

#[derive(Clone)]
pub struct WebState {
    pub transit_client: Client<PgDatabase>,
    pub engine: EngineHandle,
    pub auth: AuthConfig,
}

pub async fn start_web_server(state: WebState) -> std::io::Result<()> {
    let routes: Router = api::routes(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    axum::serve(listener, routes.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(why) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {why}");
    }
}
