use axum::{routing::get, Router};

use crate::WebState;

pub mod auth;
pub mod irregularities;
pub mod paradas;
pub mod route_planning;
pub mod tracking;
pub mod ws;

pub fn routes(state: WebState) -> Router {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/tracking", tracking::routes())
        .nest("/ruta", route_planning::routes())
        .nest("/paradas", paradas::routes())
        .nest("/irregularities", irregularities::routes())
        .route("/ws/location/:user_id", get(ws::location_stream))
        .with_state(state)
}
