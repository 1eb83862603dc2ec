use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{user::User, WithId};
use sqlx::prelude::FromRow;
use transit::database::{Result, UserRepo};
use utility::id::Id;

use crate::{
    queries::user::{get, get_by_email, get_by_username, insert, update},
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

use super::{DatabaseRow, DecodeError};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl DatabaseRow for UserRow {
    type Model = User;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        Ok(User {
            username: self.username,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl UserRepo for PgDatabaseAutocommit {
    async fn user(&mut self, id: Id<User>) -> Result<WithId<User>> {
        get(&self.pool, id).await
    }

    async fn user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<WithId<User>>> {
        get_by_username(&self.pool, username).await
    }

    async fn user_by_email(&mut self, email: &str) -> Result<Option<WithId<User>>> {
        get_by_email(&self.pool, email).await
    }

    async fn insert_user(&mut self, user: User) -> Result<WithId<User>> {
        insert(&self.pool, user).await
    }

    async fn update_user(&mut self, user: &WithId<User>) -> Result<()> {
        update(&self.pool, user).await
    }
}

#[async_trait]
impl<'a> UserRepo for PgDatabaseTransaction<'a> {
    async fn user(&mut self, id: Id<User>) -> Result<WithId<User>> {
        get(&mut *self.tx, id).await
    }

    async fn user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<WithId<User>>> {
        get_by_username(&mut *self.tx, username).await
    }

    async fn user_by_email(&mut self, email: &str) -> Result<Option<WithId<User>>> {
        get_by_email(&mut *self.tx, email).await
    }

    async fn insert_user(&mut self, user: User) -> Result<WithId<User>> {
        insert(&mut *self.tx, user).await
    }

    async fn update_user(&mut self, user: &WithId<User>) -> Result<()> {
        update(&mut *self.tx, user).await
    }
}
