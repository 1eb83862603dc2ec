use model::{
    stop::{Location, Stop, StopWithRoutes},
    WithId,
};
use sqlx::{Executor, Postgres};
use transit::database::Result;
use utility::{geo, geo::EARTH_RADIUS_M, id::Id};

use crate::data_model::{
    stop::{NearbyStopRouteRow, StopDistanceRow, StopRow},
    with_id, with_ids,
};

use super::convert_error;

pub async fn get<'c, E>(executor: E, id: Id<Stop>) -> Result<WithId<Stop>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: StopRow = sqlx::query_as(
        "
        SELECT id, name, latitude, longitude
        FROM stops
        WHERE id = $1;
        ",
    )
    .bind(id.raw())
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn get_all<'c, E>(executor: E) -> Result<Vec<WithId<Stop>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<StopRow> = sqlx::query_as(
        "
        SELECT id, name, latitude, longitude
        FROM stops
        ORDER BY id;
        ",
    )
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}

/// The closest stop within `radius_m` metres, with its great-circle
/// distance. Evaluated in SQL so a spatial index can take over as the stop
/// set grows; the bounding box prefilters before the exact distance.
pub async fn nearest<'c, E>(
    executor: E,
    location: &Location,
    radius_m: f64,
) -> Result<Option<(WithId<Stop>, f64)>>
where
    E: Executor<'c, Database = Postgres>,
{
    let ((min_lat, min_lon), (max_lat, max_lon)) = geo::calculate_bounding_box(
        location.latitude,
        location.longitude,
        radius_m,
    );

    let row: Option<StopDistanceRow> = sqlx::query_as(
        "
        WITH distance_calc AS (
            SELECT
                id, name, latitude, longitude,
                ($1 * ACOS(LEAST(1.0, GREATEST(-1.0,
                    COS(RADIANS($2)) * COS(RADIANS(latitude)) *
                    COS(RADIANS(longitude) - RADIANS($3)) +
                    SIN(RADIANS($2)) * SIN(RADIANS(latitude))
                )))) AS distance
            FROM
                stops
            WHERE
                latitude BETWEEN $4 AND $5
                AND longitude BETWEEN $6 AND $7
        )
        SELECT id, name, latitude, longitude, distance
        FROM distance_calc
        WHERE distance <= $8
        ORDER BY distance ASC, id ASC
        LIMIT 1;
        ",
    )
    .bind(EARTH_RADIUS_M)
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(min_lat)
    .bind(max_lat)
    .bind(min_lon)
    .bind(max_lon)
    .bind(radius_m)
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;

    match row {
        Some(row) => {
            let distance = row.distance;
            Ok(Some((with_id(row.into_stop_row())?, distance)))
        }
        None => Ok(None),
    }
}

/// Stops within the radius joined to the routes serving them. Stops outside
/// every route are omitted, matching the join.
pub async fn nearby_with_routes<'c, E>(
    executor: E,
    location: &Location,
    radius_m: f64,
) -> Result<Vec<StopWithRoutes>>
where
    E: Executor<'c, Database = Postgres>,
{
    let ((min_lat, min_lon), (max_lat, max_lon)) = geo::calculate_bounding_box(
        location.latitude,
        location.longitude,
        radius_m,
    );

    let rows: Vec<NearbyStopRouteRow> = sqlx::query_as(
        "
        WITH nearby AS (
            SELECT
                id, name, latitude, longitude,
                ($1 * ACOS(LEAST(1.0, GREATEST(-1.0,
                    COS(RADIANS($2)) * COS(RADIANS(latitude)) *
                    COS(RADIANS(longitude) - RADIANS($3)) +
                    SIN(RADIANS($2)) * SIN(RADIANS(latitude))
                )))) AS distance
            FROM
                stops
            WHERE
                latitude BETWEEN $4 AND $5
                AND longitude BETWEEN $6 AND $7
        )
        SELECT
            nearby.id AS stop_id,
            nearby.name AS stop_name,
            nearby.latitude,
            nearby.longitude,
            routes.id AS route_id,
            routes.name AS route_name,
            routes.description AS route_description
        FROM nearby
        JOIN route_stops ON route_stops.stop_id = nearby.id
        JOIN routes ON routes.id = route_stops.route_id
        WHERE nearby.distance <= $8
        ORDER BY nearby.id, routes.id;
        ",
    )
    .bind(EARTH_RADIUS_M)
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(min_lat)
    .bind(max_lat)
    .bind(min_lon)
    .bind(max_lon)
    .bind(radius_m)
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    Ok(crate::data_model::stop::group_nearby_rows(rows))
}
