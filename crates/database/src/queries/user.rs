use model::{user::User, WithId};
use sqlx::{Executor, Postgres};
use transit::database::Result;
use utility::id::Id;

use crate::data_model::{user::UserRow, with_id};

use super::convert_error;

pub async fn get<'c, E>(executor: E, id: Id<User>) -> Result<WithId<User>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: UserRow = sqlx::query_as(
        "
        SELECT id, username, password_hash, first_name, last_name, email, created_at
        FROM users
        WHERE id = $1;
        ",
    )
    .bind(id.raw())
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn get_by_username<'c, E>(
    executor: E,
    username: &str,
) -> Result<Option<WithId<User>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<UserRow> = sqlx::query_as(
        "
        SELECT id, username, password_hash, first_name, last_name, email, created_at
        FROM users
        WHERE username = $1;
        ",
    )
    .bind(username)
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;
    row.map(with_id).transpose()
}

pub async fn get_by_email<'c, E>(
    executor: E,
    email: &str,
) -> Result<Option<WithId<User>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<UserRow> = sqlx::query_as(
        "
        SELECT id, username, password_hash, first_name, last_name, email, created_at
        FROM users
        WHERE email = $1;
        ",
    )
    .bind(email)
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;
    row.map(with_id).transpose()
}

pub async fn insert<'c, E>(executor: E, user: User) -> Result<WithId<User>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: UserRow = sqlx::query_as(
        "
        INSERT INTO users (username, password_hash, first_name, last_name, email, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, username, password_hash, first_name, last_name, email, created_at;
        ",
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(user.created_at)
    .fetch_one(executor)
    .await
    .map_err(convert_error)?;
    with_id(row)
}

pub async fn update<'c, E>(executor: E, user: &WithId<User>) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE users
        SET username = $1,
            first_name = $2,
            last_name = $3,
            email = $4
        WHERE id = $5;
        ",
    )
    .bind(&user.content.username)
    .bind(&user.content.first_name)
    .bind(&user.content.last_name)
    .bind(&user.content.email)
    .bind(user.id.raw())
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}
