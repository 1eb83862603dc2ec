use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use model::{user::User, WithId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use transit::client::{NewUser, ProfileUpdate};
use utility::id::Id;

use crate::{
    common::{ApiError, ApiResult},
    security::{hash_password, verify_password, CurrentUser},
    WebState,
};

pub(crate) fn routes() -> Router<WebState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/users/:id", put(update_user))
}

#[derive(Debug, Deserialize)]
struct UserRegister {
    username: String,
    password: String,
    first_name: String,
    last_name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct UserLogin {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UserUpdate {
    username: String,
    first_name: String,
    last_name: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: i32,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<WithId<User>> for UserResponse {
    fn from(user: WithId<User>) -> Self {
        Self {
            id: user.id.raw(),
            username: user.content.username,
            first_name: user.content.first_name,
            last_name: user.content.last_name,
            email: user.content.email,
            created_at: user.content.created_at,
        }
    }
}

async fn register(
    State(state): State<WebState>,
    Json(body): Json<UserRegister>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = state
        .transit_client
        .register_user(NewUser {
            username: body.username,
            password_hash: hash_password(&body.password)?,
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "user registered",
            "user_id": user.id.raw(),
        })),
    ))
}

async fn login(
    State(state): State<WebState>,
    Json(body): Json<UserLogin>,
) -> ApiResult<Json<Value>> {
    let user = state
        .transit_client
        .user_by_username(&body.username)
        .await?
        .filter(|user| verify_password(&body.password, &user.content.password_hash))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "incorrect username or password",
            )
        })?;

    let access_token = state.auth.create_access_token(&user.content.username)?;
    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "bearer",
        "user": UserResponse::from(user),
    })))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

async fn update_user(
    State(state): State<WebState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<i32>,
    Json(body): Json<UserUpdate>,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .transit_client
        .update_profile(
            Id::new(id),
            ProfileUpdate {
                username: body.username,
                first_name: body.first_name,
                last_name: body.last_name,
                email: body.email,
            },
        )
        .await?;
    Ok(Json(user.into()))
}
