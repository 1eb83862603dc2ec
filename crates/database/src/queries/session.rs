use model::{bus::VirtualBus, session::TrackingSession, user::User, WithId};
use sqlx::{Executor, Postgres};
use transit::database::Result;
use utility::id::Id;

use crate::data_model::{session::SessionRow, with_id, with_ids};

use super::convert_error;

const SESSION_COLUMNS: &str = "id, user_id, selected_route_id, reported_route_id, \
     is_on_bus, assigned_bus_id, status, started_at, ended_at";

pub async fn get_active_for_user<'c, E>(
    executor: E,
    user_id: Id<User>,
) -> Result<Option<WithId<TrackingSession>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<SessionRow> = sqlx::query_as(&format!(
        "
        SELECT {SESSION_COLUMNS}
        FROM tracking_sessions
        WHERE user_id = $1 AND status = 'active';
        "
    ))
    .bind(user_id.raw())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;
    row.map(with_id).transpose()
}

pub async fn get_active_for_users<'c, E>(
    executor: E,
    user_ids: &[Id<User>],
) -> Result<Vec<WithId<TrackingSession>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let raw_ids: Vec<i32> = user_ids.iter().map(|id| id.raw()).collect();
    let rows: Vec<SessionRow> = sqlx::query_as(&format!(
        "
        SELECT {SESSION_COLUMNS}
        FROM tracking_sessions
        WHERE user_id = ANY($1) AND status = 'active';
        "
    ))
    .bind(&raw_ids)
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}

pub async fn insert<'c, E>(
    executor: E,
    session: TrackingSession,
) -> Result<WithId<TrackingSession>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: SessionRow = sqlx::query_as(&format!(
        "
        INSERT INTO tracking_sessions (
            user_id, selected_route_id, reported_route_id,
            is_on_bus, assigned_bus_id, status, started_at, ended_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {SESSION_COLUMNS};
        "
    ))
    .bind(session.user_id.raw())
    .bind(session.selected_route_id.map(|id| id.raw()))
    .bind(session.reported_route_id.map(|id| id.raw()))
    .bind(session.is_on_bus)
    .bind(session.assigned_bus_id.map(|id| id.raw()))
    .bind(session.status.as_str())
    .bind(session.started_at)
    .bind(session.ended_at)
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn update<'c, E>(
    executor: E,
    session: &WithId<TrackingSession>,
) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE tracking_sessions
        SET selected_route_id = $1,
            reported_route_id = $2,
            is_on_bus = $3,
            assigned_bus_id = $4,
            status = $5,
            ended_at = $6
        WHERE id = $7;
        ",
    )
    .bind(session.content.selected_route_id.map(|id| id.raw()))
    .bind(session.content.reported_route_id.map(|id| id.raw()))
    .bind(session.content.is_on_bus)
    .bind(session.content.assigned_bus_id.map(|id| id.raw()))
    .bind(session.content.status.as_str())
    .bind(session.content.ended_at)
    .bind(session.id.raw())
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

pub async fn get_claiming_bus<'c, E>(
    executor: E,
    bus_id: &Id<VirtualBus>,
) -> Result<Vec<WithId<TrackingSession>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<SessionRow> = sqlx::query_as(&format!(
        "
        SELECT {SESSION_COLUMNS}
        FROM tracking_sessions
        WHERE assigned_bus_id = $1
          AND status = 'active'
          AND is_on_bus = TRUE;
        "
    ))
    .bind(bus_id.raw())
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}

pub async fn get_with_inactive_bus<'c, E>(
    executor: E,
) -> Result<Vec<WithId<TrackingSession>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<SessionRow> = sqlx::query_as(
        "
        SELECT
            tracking_sessions.id, tracking_sessions.user_id,
            tracking_sessions.selected_route_id, tracking_sessions.reported_route_id,
            tracking_sessions.is_on_bus, tracking_sessions.assigned_bus_id,
            tracking_sessions.status, tracking_sessions.started_at,
            tracking_sessions.ended_at
        FROM tracking_sessions
        JOIN virtual_buses ON virtual_buses.id = tracking_sessions.assigned_bus_id
        WHERE tracking_sessions.status = 'active'
          AND virtual_buses.status = 'inactive';
        ",
    )
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}
