use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use model::stop::{Location, StopWithRoutes};
use serde::{Deserialize, Serialize};

use crate::{
    common::{ApiError, ApiResult},
    security::CurrentUser,
    WebState,
};

const DEFAULT_RADIUS_METERS: f64 = 300.0;

pub(crate) fn routes() -> Router<WebState> {
    Router::new().route("/cercanas-con-rutas", get(cercanas_con_rutas))
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    latitude: f64,
    longitude: f64,
    radius_meters: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RutaEnParadaResponse {
    id: i32,
    nombre: String,
}

#[derive(Debug, Serialize)]
struct ParadaDetalleResponse {
    id: i32,
    nombre: String,
    latitude: f64,
    longitude: f64,
    rutas: Vec<RutaEnParadaResponse>,
}

impl From<StopWithRoutes> for ParadaDetalleResponse {
    fn from(entry: StopWithRoutes) -> Self {
        Self {
            id: entry.stop.id.raw(),
            nombre: entry.stop.content.name,
            latitude: entry.stop.content.location.latitude,
            longitude: entry.stop.content.location.longitude,
            rutas: entry
                .routes
                .into_iter()
                .map(|route| RutaEnParadaResponse {
                    id: route.id.raw(),
                    nombre: route.content.name,
                })
                .collect(),
        }
    }
}

async fn cercanas_con_rutas(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Query(params): Query<NearbyQuery>,
) -> ApiResult<Json<Vec<ParadaDetalleResponse>>> {
    let location = Location::new(params.latitude, params.longitude);
    if !location.is_valid() {
        return Err(ApiError::bad_request("invalid latitude/longitude"));
    }
    let radius = params.radius_meters.unwrap_or(DEFAULT_RADIUS_METERS);
    if radius <= 0.0 {
        return Err(ApiError::bad_request("radius must be positive"));
    }

    let stops = state
        .transit_client
        .stops_nearby_with_routes(&location, radius)
        .await?;
    Ok(Json(stops.into_iter().map(Into::into).collect()))
}
