use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use model::{
    irregularity::{Irregularity, Vote},
    stop::Location,
    WithId,
};
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{
    common::{ApiError, ApiResult},
    security::CurrentUser,
    WebState,
};

pub(crate) fn routes() -> Router<WebState> {
    Router::new()
        .route("/report", post(report))
        .route("/search/:id", get(search))
        .route("/active", get(active))
        .route("/vote/:id/like", post(like))
        .route("/vote/:id/dislike", post(dislike))
}

#[derive(Debug, Deserialize)]
struct IrregularityCreate {
    titulo: String,
    descripcion: Option<String>,
    latitud: f64,
    longitud: f64,
}

#[derive(Debug, Serialize)]
struct IrregularityResponse {
    id: i32,
    titulo: String,
    descripcion: Option<String>,
    latitud: f64,
    longitud: f64,
    activa: bool,
    likes: i32,
    dislikes: i32,
    created_at: DateTime<Utc>,
    ultimo_like_at: Option<DateTime<Utc>>,
}

impl From<WithId<Irregularity>> for IrregularityResponse {
    fn from(irregularity: WithId<Irregularity>) -> Self {
        Self {
            id: irregularity.id.raw(),
            titulo: irregularity.content.title,
            descripcion: irregularity.content.description,
            latitud: irregularity.content.location.latitude,
            longitud: irregularity.content.location.longitude,
            activa: irregularity.content.active,
            likes: irregularity.content.likes,
            dislikes: irregularity.content.dislikes,
            created_at: irregularity.content.created_at,
            ultimo_like_at: irregularity.content.last_like_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct IrregularityVoteResponse {
    id: i32,
    user_id: i32,
    irregularity_id: i32,
    is_like: bool,
    created_at: DateTime<Utc>,
}

impl From<WithId<Vote>> for IrregularityVoteResponse {
    fn from(vote: WithId<Vote>) -> Self {
        Self {
            id: vote.id.raw(),
            user_id: vote.content.user_id.raw(),
            irregularity_id: vote.content.irregularity_id.raw(),
            is_like: vote.content.is_like,
            created_at: vote.content.created_at,
        }
    }
}

async fn report(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Json(body): Json<IrregularityCreate>,
) -> ApiResult<(StatusCode, Json<IrregularityResponse>)> {
    let location = Location::new(body.latitud, body.longitud);
    if !location.is_valid() {
        return Err(ApiError::bad_request("invalid latitude/longitude"));
    }

    let irregularity = state
        .transit_client
        .report_irregularity(body.titulo, body.descripcion, location)
        .await?;
    Ok((StatusCode::CREATED, Json(irregularity.into())))
}

async fn search(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<IrregularityResponse>> {
    let irregularity = state.transit_client.irregularity(Id::new(id)).await?;
    Ok(Json(irregularity.into()))
}

async fn active(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
) -> ApiResult<Json<Vec<IrregularityResponse>>> {
    let irregularities = state.transit_client.active_irregularities().await?;
    Ok(Json(irregularities.into_iter().map(Into::into).collect()))
}

async fn like(
    State(state): State<WebState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<(StatusCode, Json<IrregularityVoteResponse>)> {
    let vote = state
        .transit_client
        .vote_irregularity(user.id, Id::new(id), true)
        .await?;
    Ok((StatusCode::CREATED, Json(vote.into())))
}

async fn dislike(
    State(state): State<WebState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i32>,
) -> ApiResult<(StatusCode, Json<IrregularityVoteResponse>)> {
    let vote = state
        .transit_client
        .vote_irregularity(user.id, Id::new(id), false)
        .await?;
    Ok((StatusCode::CREATED, Json(vote.into())))
}
