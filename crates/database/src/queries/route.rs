use model::{
    route::{Route, RouteWithStops},
    WithId,
};
use sqlx::{Executor, Postgres};
use transit::database::{DatabaseError, Result};
use utility::id::Id;

use crate::data_model::{
    route::{group_route_stop_rows, RouteRow, RouteStopRow},
    with_id, with_ids,
};

use super::convert_error;

pub async fn get<'c, E>(executor: E, id: Id<Route>) -> Result<WithId<Route>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: RouteRow = sqlx::query_as(
        "
        SELECT id, name, description
        FROM routes
        WHERE id = $1;
        ",
    )
    .bind(id.raw())
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn get_all<'c, E>(executor: E) -> Result<Vec<WithId<Route>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<RouteRow> = sqlx::query_as(
        "
        SELECT id, name, description
        FROM routes
        ORDER BY id;
        ",
    )
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}

/// One route with its stop sequence in ordinal order.
pub async fn get_with_stops<'c, E>(
    executor: E,
    id: Id<Route>,
) -> Result<RouteWithStops>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<RouteStopRow> = sqlx::query_as(
        "
        SELECT
            routes.id AS route_id,
            routes.name AS route_name,
            routes.description AS route_description,
            route_stops.ordinal,
            stops.id AS stop_id,
            stops.name AS stop_name,
            stops.latitude,
            stops.longitude
        FROM routes
        LEFT JOIN route_stops ON route_stops.route_id = routes.id
        LEFT JOIN stops ON stops.id = route_stops.stop_id
        WHERE routes.id = $1
        ORDER BY route_stops.ordinal;
        ",
    )
    .bind(id.raw())
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    group_route_stop_rows(rows)
        .into_iter()
        .next()
        .ok_or(DatabaseError::NotFound)
}

/// Every route with its stop sequence, one joined query for all of them.
pub async fn get_all_with_stops<'c, E>(executor: E) -> Result<Vec<RouteWithStops>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<RouteStopRow> = sqlx::query_as(
        "
        SELECT
            routes.id AS route_id,
            routes.name AS route_name,
            routes.description AS route_description,
            route_stops.ordinal,
            stops.id AS stop_id,
            stops.name AS stop_name,
            stops.latitude,
            stops.longitude
        FROM routes
        LEFT JOIN route_stops ON route_stops.route_id = routes.id
        LEFT JOIN stops ON stops.id = route_stops.stop_id
        ORDER BY routes.id, route_stops.ordinal;
        ",
    )
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    Ok(group_route_stop_rows(rows))
}
