use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    irregularity::{Irregularity, Vote},
    stop::Location,
    user::User,
    WithId,
};
use sqlx::prelude::FromRow;
use transit::database::{IrregularityRepo, Result};
use utility::id::Id;

use crate::{
    queries::irregularity::{
        get, get_active, get_vote, insert, insert_vote, update, update_vote,
    },
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

use super::{DatabaseRow, DecodeError};

#[derive(Debug, Clone, FromRow)]
pub struct IrregularityRow {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub active: bool,
    pub likes: i32,
    pub dislikes: i32,
    pub created_at: DateTime<Utc>,
    pub last_like_at: Option<DateTime<Utc>>,
}

impl DatabaseRow for IrregularityRow {
    type Model = Irregularity;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        Ok(Irregularity {
            title: self.title,
            description: self.description,
            location: Location::new(self.latitude, self.longitude),
            active: self.active,
            likes: self.likes,
            dislikes: self.dislikes,
            created_at: self.created_at,
            last_like_at: self.last_like_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VoteRow {
    pub id: i32,
    pub user_id: i32,
    pub irregularity_id: i32,
    pub is_like: bool,
    pub created_at: DateTime<Utc>,
}

impl DatabaseRow for VoteRow {
    type Model = Vote;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        Ok(Vote {
            user_id: Id::new(self.user_id),
            irregularity_id: Id::new(self.irregularity_id),
            is_like: self.is_like,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl IrregularityRepo for PgDatabaseAutocommit {
    async fn irregularity(
        &mut self,
        id: Id<Irregularity>,
    ) -> Result<WithId<Irregularity>> {
        get(&self.pool, id).await
    }

    async fn active_irregularities(&mut self) -> Result<Vec<WithId<Irregularity>>> {
        get_active(&self.pool).await
    }

    async fn insert_irregularity(
        &mut self,
        irregularity: Irregularity,
    ) -> Result<WithId<Irregularity>> {
        insert(&self.pool, irregularity).await
    }

    async fn update_irregularity(
        &mut self,
        irregularity: &WithId<Irregularity>,
    ) -> Result<()> {
        update(&self.pool, irregularity).await
    }

    async fn vote(
        &mut self,
        user_id: Id<User>,
        irregularity_id: Id<Irregularity>,
    ) -> Result<Option<WithId<Vote>>> {
        get_vote(&self.pool, user_id, irregularity_id).await
    }

    async fn insert_vote(&mut self, vote: Vote) -> Result<WithId<Vote>> {
        insert_vote(&self.pool, vote).await
    }

    async fn update_vote(&mut self, vote: &WithId<Vote>) -> Result<()> {
        update_vote(&self.pool, vote).await
    }
}

#[async_trait]
impl<'a> IrregularityRepo for PgDatabaseTransaction<'a> {
    async fn irregularity(
        &mut self,
        id: Id<Irregularity>,
    ) -> Result<WithId<Irregularity>> {
        get(&mut *self.tx, id).await
    }

    async fn active_irregularities(&mut self) -> Result<Vec<WithId<Irregularity>>> {
        get_active(&mut *self.tx).await
    }

    async fn insert_irregularity(
        &mut self,
        irregularity: Irregularity,
    ) -> Result<WithId<Irregularity>> {
        insert(&mut *self.tx, irregularity).await
    }

    async fn update_irregularity(
        &mut self,
        irregularity: &WithId<Irregularity>,
    ) -> Result<()> {
        update(&mut *self.tx, irregularity).await
    }

    async fn vote(
        &mut self,
        user_id: Id<User>,
        irregularity_id: Id<Irregularity>,
    ) -> Result<Option<WithId<Vote>>> {
        get_vote(&mut *self.tx, user_id, irregularity_id).await
    }

    async fn insert_vote(&mut self, vote: Vote) -> Result<WithId<Vote>> {
        insert_vote(&mut *self.tx, vote).await
    }

    async fn update_vote(&mut self, vote: &WithId<Vote>) -> Result<()> {
        update_vote(&mut *self.tx, vote).await
    }
}
