use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    bus::VirtualBus,
    session::{SessionStatus, TrackingSession},
    user::User,
    WithId,
};
use sqlx::prelude::FromRow;
use transit::database::{Result, SessionRepo};
use utility::id::Id;
use uuid::Uuid;

use crate::{
    queries::session::{
        get_active_for_user, get_active_for_users, get_claiming_bus,
        get_with_inactive_bus, insert, update,
    },
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

use super::{DatabaseRow, DecodeError};

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: i32,
    pub user_id: i32,
    pub selected_route_id: Option<i32>,
    pub reported_route_id: Option<i32>,
    pub is_on_bus: bool,
    pub assigned_bus_id: Option<Uuid>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DatabaseRow for SessionRow {
    type Model = TrackingSession;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        let status = SessionStatus::try_from(self.status.as_str())
            .map_err(DecodeError)?;
        Ok(TrackingSession {
            user_id: Id::new(self.user_id),
            selected_route_id: self.selected_route_id.map(Id::new),
            reported_route_id: self.reported_route_id.map(Id::new),
            is_on_bus: self.is_on_bus,
            assigned_bus_id: self.assigned_bus_id.map(Id::new),
            status,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
    }
}

#[async_trait]
impl SessionRepo for PgDatabaseAutocommit {
    async fn active_session(
        &mut self,
        user_id: Id<User>,
    ) -> Result<Option<WithId<TrackingSession>>> {
        get_active_for_user(&self.pool, user_id).await
    }

    async fn active_sessions_for(
        &mut self,
        user_ids: &[Id<User>],
    ) -> Result<HashMap<Id<User>, WithId<TrackingSession>>> {
        let sessions = get_active_for_users(&self.pool, user_ids).await?;
        Ok(key_by_user(sessions))
    }

    async fn insert_session(
        &mut self,
        session: TrackingSession,
    ) -> Result<WithId<TrackingSession>> {
        insert(&self.pool, session).await
    }

    async fn update_session(&mut self, session: &WithId<TrackingSession>) -> Result<()> {
        update(&self.pool, session).await
    }

    async fn sessions_claiming_bus(
        &mut self,
        bus_id: &Id<VirtualBus>,
    ) -> Result<Vec<WithId<TrackingSession>>> {
        get_claiming_bus(&self.pool, bus_id).await
    }

    async fn sessions_with_inactive_bus(
        &mut self,
    ) -> Result<Vec<WithId<TrackingSession>>> {
        get_with_inactive_bus(&self.pool).await
    }
}

#[async_trait]
impl<'a> SessionRepo for PgDatabaseTransaction<'a> {
    async fn active_session(
        &mut self,
        user_id: Id<User>,
    ) -> Result<Option<WithId<TrackingSession>>> {
        get_active_for_user(&mut *self.tx, user_id).await
    }

    async fn active_sessions_for(
        &mut self,
        user_ids: &[Id<User>],
    ) -> Result<HashMap<Id<User>, WithId<TrackingSession>>> {
        let sessions = get_active_for_users(&mut *self.tx, user_ids).await?;
        Ok(key_by_user(sessions))
    }

    async fn insert_session(
        &mut self,
        session: TrackingSession,
    ) -> Result<WithId<TrackingSession>> {
        insert(&mut *self.tx, session).await
    }

    async fn update_session(&mut self, session: &WithId<TrackingSession>) -> Result<()> {
        update(&mut *self.tx, session).await
    }

    async fn sessions_claiming_bus(
        &mut self,
        bus_id: &Id<VirtualBus>,
    ) -> Result<Vec<WithId<TrackingSession>>> {
        get_claiming_bus(&mut *self.tx, bus_id).await
    }

    async fn sessions_with_inactive_bus(
        &mut self,
    ) -> Result<Vec<WithId<TrackingSession>>> {
        get_with_inactive_bus(&mut *self.tx).await
    }
}

fn key_by_user(
    sessions: Vec<WithId<TrackingSession>>,
) -> HashMap<Id<User>, WithId<TrackingSession>> {
    sessions
        .into_iter()
        .map(|session| (session.content.user_id, session))
        .collect()
}
