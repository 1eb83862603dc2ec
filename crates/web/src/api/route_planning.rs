use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use model::{route::RouteWithStops, stop::Location};
use serde::{Deserialize, Serialize};
use transit::planner::TripPlan;
use utility::id::Id;

use crate::{
    common::{ApiError, ApiResult},
    security::CurrentUser,
    WebState,
};

pub(crate) fn routes() -> Router<WebState> {
    Router::new()
        .route("/calculate_route", post(calculate_route))
        .route("/rutas", get(all_routes))
        .route("/rutas/:id", get(route_by_id))
}

#[derive(Debug, Deserialize)]
struct CalculateRouteRequest {
    origen_lat: f64,
    origen_lon: f64,
    destino_lat: f64,
    destino_lon: f64,
}

#[derive(Debug, Serialize)]
struct SimplifiedParadaResponse {
    nombre: String,
    ruta_nombre: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct SimplifiedCalculatedRouteResponse {
    tiempo_estimado_minutos: f64,
    distancia_origen_primera_parada_metros: f64,
    distancia_ultima_parada_destino_metros: f64,
    paradas_trayecto: Vec<SimplifiedParadaResponse>,
}

impl From<TripPlan> for SimplifiedCalculatedRouteResponse {
    fn from(plan: TripPlan) -> Self {
        Self {
            tiempo_estimado_minutos: plan.estimated_minutes,
            distancia_origen_primera_parada_metros: plan.origin_walk_m,
            distancia_ultima_parada_destino_metros: plan.destination_walk_m,
            paradas_trayecto: plan
                .stops
                .into_iter()
                .map(|stop| SimplifiedParadaResponse {
                    nombre: stop.name,
                    ruta_nombre: stop.route_name,
                    latitude: stop.location.latitude,
                    longitude: stop.location.longitude,
                })
                .collect(),
        }
    }
}

async fn calculate_route(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Json(body): Json<CalculateRouteRequest>,
) -> ApiResult<Json<SimplifiedCalculatedRouteResponse>> {
    let origin = Location::new(body.origen_lat, body.origen_lon);
    let destination = Location::new(body.destino_lat, body.destino_lon);
    if !origin.is_valid() || !destination.is_valid() {
        return Err(ApiError::bad_request("invalid latitude/longitude"));
    }

    let plan = state.transit_client.plan_trip(origin, destination).await?;
    Ok(Json(plan.into()))
}

#[derive(Debug, Serialize)]
struct ParadaEnRutaResponse {
    id: i32,
    nombre: String,
    latitude: f64,
    longitude: f64,
    orden: i32,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize)]
struct RutaDetalleResponse {
    id: i32,
    nombre: String,
    descripcion: Option<String>,
    paradas: Vec<ParadaEnRutaResponse>,
}

impl From<RouteWithStops> for RutaDetalleResponse {
    fn from(route: RouteWithStops) -> Self {
        Self {
            id: route.route.id.raw(),
            nombre: route.route.content.name,
            descripcion: route.route.content.description,
            paradas: route
                .stops
                .into_iter()
                .map(|entry| ParadaEnRutaResponse {
                    id: entry.stop.id.raw(),
                    nombre: entry.stop.content.name,
                    latitude: entry.stop.content.location.latitude,
                    longitude: entry.stop.content.location.longitude,
                    orden: entry.ordinal,
                })
                .collect(),
        }
    }
}

async fn all_routes(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
) -> ApiResult<Json<Vec<RutaDetalleResponse>>> {
    let routes = state.transit_client.routes_with_stops().await?;
    Ok(Json(routes.into_iter().map(Into::into).collect()))
}

async fn route_by_id(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<RutaDetalleResponse>> {
    let route = state.transit_client.route_with_stops(Id::new(id)).await?;
    Ok(Json(route.into()))
}
