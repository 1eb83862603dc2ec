use model::{bus::VirtualBus, route::Route, WithId};
use sqlx::{Executor, Postgres};
use transit::database::Result;
use utility::id::Id;

use crate::data_model::{bus::BusRow, with_id, with_ids};

use super::convert_error;

const BUS_COLUMNS: &str = "id, route_id, latitude, longitude, current_speed, \
     current_heading, assigned_user_ids, last_update, status";

pub async fn get<'c, E>(executor: E, id: &Id<VirtualBus>) -> Result<WithId<VirtualBus>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: BusRow = sqlx::query_as(&format!(
        "
        SELECT {BUS_COLUMNS}
        FROM virtual_buses
        WHERE id = $1;
        "
    ))
    .bind(id.raw())
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

/// Active buses ordered by id so scans over them are deterministic.
pub async fn get_active<'c, E>(
    executor: E,
    route_id: Option<Id<Route>>,
) -> Result<Vec<WithId<VirtualBus>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<BusRow> = sqlx::query_as(&format!(
        "
        SELECT {BUS_COLUMNS}
        FROM virtual_buses
        WHERE status = 'active'
          AND ($1::INTEGER IS NULL OR route_id = $1)
        ORDER BY id;
        "
    ))
    .bind(route_id.map(|id| id.raw()))
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}

pub async fn insert<'c, E>(executor: E, bus: &WithId<VirtualBus>) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        INSERT INTO virtual_buses (
            id, route_id, latitude, longitude, current_speed,
            current_heading, assigned_user_ids, last_update, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9);
        ",
    )
    .bind(bus.id.raw())
    .bind(bus.content.route_id.raw())
    .bind(bus.content.location.latitude)
    .bind(bus.content.location.longitude)
    .bind(bus.content.current_speed)
    .bind(bus.content.current_heading)
    .bind(assigned_ids(bus))
    .bind(bus.content.last_update)
    .bind(bus.content.status.as_str())
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

pub async fn update<'c, E>(executor: E, bus: &WithId<VirtualBus>) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE virtual_buses
        SET latitude = $1,
            longitude = $2,
            current_speed = $3,
            current_heading = $4,
            assigned_user_ids = $5,
            last_update = $6,
            status = $7
        WHERE id = $8;
        ",
    )
    .bind(bus.content.location.latitude)
    .bind(bus.content.location.longitude)
    .bind(bus.content.current_speed)
    .bind(bus.content.current_heading)
    .bind(assigned_ids(bus))
    .bind(bus.content.last_update)
    .bind(bus.content.status.as_str())
    .bind(bus.id.raw())
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

fn assigned_ids(bus: &WithId<VirtualBus>) -> Vec<i32> {
    bus.content
        .assigned_user_ids
        .iter()
        .map(|id| id.raw())
        .collect()
}
