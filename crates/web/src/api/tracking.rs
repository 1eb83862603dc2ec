use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use model::{bus::VirtualBus, WithId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utility::id::Id;
use uuid::Uuid;

use crate::{common::ApiResult, security::CurrentUser, WebState};

pub(crate) fn routes() -> Router<WebState> {
    Router::new()
        .route("/start-session", post(start_session))
        .route("/set-on-bus", post(set_on_bus))
        .route("/stop-session", post(stop_session))
        .route("/active-buses", get(active_buses))
        .route("/bus/:bus_id/status", get(bus_status))
        .route("/bus/:bus_id/route", get(bus_route))
}

#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    user_id: i32,
    selected_route_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct SetOnBusRequest {
    user_id: i32,
    reported_route_id: i32,
    is_on_bus: bool,
}

#[derive(Debug, Deserialize)]
struct StopSessionRequest {
    user_id: i32,
}

#[derive(Debug, Serialize)]
struct BusLocationResponse {
    id: Uuid,
    route_id: i32,
    latitude: f64,
    longitude: f64,
    current_speed: Option<f64>,
    current_heading: Option<f64>,
    assigned_user_ids: Vec<i32>,
    last_update: DateTime<Utc>,
    status: String,
}

impl From<WithId<VirtualBus>> for BusLocationResponse {
    fn from(bus: WithId<VirtualBus>) -> Self {
        Self {
            id: bus.id.raw(),
            route_id: bus.content.route_id.raw(),
            latitude: bus.content.location.latitude,
            longitude: bus.content.location.longitude,
            current_speed: bus.content.current_speed,
            current_heading: bus.content.current_heading,
            assigned_user_ids: bus
                .content
                .assigned_user_ids
                .iter()
                .map(|id| id.raw())
                .collect(),
            last_update: bus.content.last_update,
            status: bus.content.status.as_str().to_owned(),
        }
    }
}

async fn start_session(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Json(body): Json<StartSessionRequest>,
) -> ApiResult<Json<Value>> {
    let session = state
        .transit_client
        .start_session(
            Id::new(body.user_id),
            body.selected_route_id.map(Id::new),
        )
        .await?;
    Ok(Json(json!({
        "message": "tracking session started",
        "session_id": session.id.raw(),
    })))
}

async fn set_on_bus(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Json(body): Json<SetOnBusRequest>,
) -> ApiResult<Json<Value>> {
    state
        .transit_client
        .set_on_bus(
            Id::new(body.user_id),
            Id::new(body.reported_route_id),
            body.is_on_bus,
        )
        .await?;
    Ok(Json(json!({
        "message": format!(
            "user {} marked as {} route {}",
            body.user_id,
            if body.is_on_bus { "on bus" } else { "off bus" },
            body.reported_route_id,
        ),
    })))
}

async fn stop_session(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Json(body): Json<StopSessionRequest>,
) -> ApiResult<Json<Value>> {
    state
        .transit_client
        .stop_session(Id::new(body.user_id))
        .await?;
    Ok(Json(json!({ "message": "tracking session stopped" })))
}

#[derive(Debug, Deserialize)]
struct ActiveBusesQuery {
    route_id: Option<i32>,
}

async fn active_buses(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Query(params): Query<ActiveBusesQuery>,
) -> ApiResult<Json<Vec<BusLocationResponse>>> {
    let buses = state
        .transit_client
        .active_buses(params.route_id.map(Id::new))
        .await?;
    Ok(Json(buses.into_iter().map(Into::into).collect()))
}

async fn bus_status(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Path(bus_id): Path<Uuid>,
) -> ApiResult<Json<BusLocationResponse>> {
    let bus = state.transit_client.bus_status(&Id::new(bus_id)).await?;
    Ok(Json(bus.into()))
}

async fn bus_route(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Path(bus_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let route = state.transit_client.bus_route(&Id::new(bus_id)).await?;
    Ok(Json(json!({
        "route_id": route.id.raw(),
        "nombre": route.content.name,
        "descripcion": route.content.description,
    })))
}
