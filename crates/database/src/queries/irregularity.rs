use model::{
    irregularity::{Irregularity, Vote},
    user::User,
    WithId,
};
use sqlx::{Executor, Postgres};
use transit::database::Result;
use utility::id::Id;

use crate::data_model::{
    irregularity::{IrregularityRow, VoteRow},
    with_id, with_ids,
};

use super::convert_error;

const IRREGULARITY_COLUMNS: &str = "id, title, description, latitude, longitude, \
     active, likes, dislikes, created_at, last_like_at";

pub async fn get<'c, E>(
    executor: E,
    id: Id<Irregularity>,
) -> Result<WithId<Irregularity>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: IrregularityRow = sqlx::query_as(&format!(
        "
        SELECT {IRREGULARITY_COLUMNS}
        FROM irregularities
        WHERE id = $1;
        "
    ))
    .bind(id.raw())
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn get_active<'c, E>(executor: E) -> Result<Vec<WithId<Irregularity>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<IrregularityRow> = sqlx::query_as(&format!(
        "
        SELECT {IRREGULARITY_COLUMNS}
        FROM irregularities
        WHERE active = TRUE
        ORDER BY created_at DESC;
        "
    ))
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;
    with_ids(rows)
}

pub async fn insert<'c, E>(
    executor: E,
    irregularity: Irregularity,
) -> Result<WithId<Irregularity>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: IrregularityRow = sqlx::query_as(&format!(
        "
        INSERT INTO irregularities (
            title, description, latitude, longitude,
            active, likes, dislikes, created_at, last_like_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {IRREGULARITY_COLUMNS};
        "
    ))
    .bind(&irregularity.title)
    .bind(&irregularity.description)
    .bind(irregularity.location.latitude)
    .bind(irregularity.location.longitude)
    .bind(irregularity.active)
    .bind(irregularity.likes)
    .bind(irregularity.dislikes)
    .bind(irregularity.created_at)
    .bind(irregularity.last_like_at)
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn update<'c, E>(
    executor: E,
    irregularity: &WithId<Irregularity>,
) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE irregularities
        SET title = $1,
            description = $2,
            active = $3,
            likes = $4,
            dislikes = $5,
            last_like_at = $6
        WHERE id = $7;
        ",
    )
    .bind(&irregularity.content.title)
    .bind(&irregularity.content.description)
    .bind(irregularity.content.active)
    .bind(irregularity.content.likes)
    .bind(irregularity.content.dislikes)
    .bind(irregularity.content.last_like_at)
    .bind(irregularity.id.raw())
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

pub async fn get_vote<'c, E>(
    executor: E,
    user_id: Id<User>,
    irregularity_id: Id<Irregularity>,
) -> Result<Option<WithId<Vote>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<VoteRow> = sqlx::query_as(
        "
        SELECT id, user_id, irregularity_id, is_like, created_at
        FROM irregularity_votes
        WHERE user_id = $1 AND irregularity_id = $2;
        ",
    )
    .bind(user_id.raw())
    .bind(irregularity_id.raw())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;
    row.map(with_id).transpose()
}

pub async fn insert_vote<'c, E>(executor: E, vote: Vote) -> Result<WithId<Vote>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: VoteRow = sqlx::query_as(
        "
        INSERT INTO irregularity_votes (user_id, irregularity_id, is_like, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, irregularity_id, is_like, created_at;
        ",
    )
    .bind(vote.user_id.raw())
    .bind(vote.irregularity_id.raw())
    .bind(vote.is_like)
    .bind(vote.created_at)
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn update_vote<'c, E>(executor: E, vote: &WithId<Vote>) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE irregularity_votes
        SET is_like = $1,
            created_at = $2
        WHERE id = $3;
        ",
    )
    .bind(vote.content.is_like)
    .bind(vote.content.created_at)
    .bind(vote.id.raw())
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}
