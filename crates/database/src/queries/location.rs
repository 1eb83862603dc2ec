use model::location::LocationSample;
use sqlx::{Executor, Postgres};
use transit::database::Result;

use super::convert_error;

pub async fn append<'c, E>(executor: E, sample: &LocationSample) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        INSERT INTO location_history (
            user_id, latitude, longitude, speed, heading, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6);
        ",
    )
    .bind(sample.user_id.raw())
    .bind(sample.location.latitude)
    .bind(sample.location.longitude)
    .bind(sample.speed)
    .bind(sample.heading)
    .bind(sample.timestamp)
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}
