use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    bus::{BusStatus, VirtualBus},
    route::Route,
    stop::Location,
    WithId,
};
use sqlx::prelude::FromRow;
use transit::database::{BusRepo, Result};
use utility::id::Id;
use uuid::Uuid;

use crate::{
    queries::bus::{get, get_active, insert, update},
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

use super::{DatabaseRow, DecodeError};

#[derive(Debug, Clone, FromRow)]
pub struct BusRow {
    pub id: Uuid,
    pub route_id: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub current_speed: Option<f64>,
    pub current_heading: Option<f64>,
    pub assigned_user_ids: Vec<i32>,
    pub last_update: DateTime<Utc>,
    pub status: String,
}

impl DatabaseRow for BusRow {
    type Model = VirtualBus;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        let status = BusStatus::try_from(self.status.as_str()).map_err(DecodeError)?;
        Ok(VirtualBus {
            route_id: Id::new(self.route_id),
            location: Location::new(self.latitude, self.longitude),
            current_speed: self.current_speed,
            current_heading: self.current_heading,
            assigned_user_ids: self.assigned_user_ids.into_iter().map(Id::new).collect(),
            last_update: self.last_update,
            status,
        })
    }
}

#[async_trait]
impl BusRepo for PgDatabaseAutocommit {
    async fn bus(&mut self, id: &Id<VirtualBus>) -> Result<WithId<VirtualBus>> {
        get(&self.pool, id).await
    }

    async fn active_buses(
        &mut self,
        route_id: Option<Id<Route>>,
    ) -> Result<Vec<WithId<VirtualBus>>> {
        get_active(&self.pool, route_id).await
    }

    async fn insert_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
        insert(&self.pool, bus).await
    }

    async fn update_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
        update(&self.pool, bus).await
    }
}

#[async_trait]
impl<'a> BusRepo for PgDatabaseTransaction<'a> {
    async fn bus(&mut self, id: &Id<VirtualBus>) -> Result<WithId<VirtualBus>> {
        get(&mut *self.tx, id).await
    }

    async fn active_buses(
        &mut self,
        route_id: Option<Id<Route>>,
    ) -> Result<Vec<WithId<VirtualBus>>> {
        get_active(&mut *self.tx, route_id).await
    }

    async fn insert_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
        insert(&mut *self.tx, bus).await
    }

    async fn update_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
        update(&mut *self.tx, bus).await
    }
}
