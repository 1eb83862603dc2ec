use async_trait::async_trait;
use model::{
    route::Route,
    stop::{Location, Stop, StopWithRoutes},
    WithId,
};
use sqlx::prelude::FromRow;
use transit::database::{Result, StopRepo};
use utility::id::Id;

use crate::{
    queries::stop::{get, get_all, nearby_with_routes, nearest},
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

use super::{DatabaseRow, DecodeError};

#[derive(Debug, Clone, FromRow)]
pub struct StopRow {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl DatabaseRow for StopRow {
    type Model = Stop;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        Ok(Stop {
            name: self.name,
            location: Location::new(self.latitude, self.longitude),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StopDistanceRow {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
}

impl StopDistanceRow {
    pub fn into_stop_row(self) -> StopRow {
        StopRow {
            id: self.id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NearbyStopRouteRow {
    pub stop_id: i32,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub route_id: i32,
    pub route_name: String,
    pub route_description: Option<String>,
}

/// Groups the stop-route join rows per stop, preserving the query's stop
/// order.
pub fn group_nearby_rows(rows: Vec<NearbyStopRouteRow>) -> Vec<StopWithRoutes> {
    let mut grouped: Vec<StopWithRoutes> = Vec::new();
    for row in rows {
        let route = WithId::new(
            Id::new(row.route_id),
            Route {
                name: row.route_name,
                description: row.route_description,
            },
        );
        match grouped
            .last_mut()
            .filter(|entry| entry.stop.id.raw() == row.stop_id)
        {
            Some(entry) => entry.routes.push(route),
            None => grouped.push(StopWithRoutes {
                stop: WithId::new(
                    Id::new(row.stop_id),
                    Stop {
                        name: row.stop_name,
                        location: Location::new(row.latitude, row.longitude),
                    },
                ),
                routes: vec![route],
            }),
        }
    }
    grouped
}

#[async_trait]
impl StopRepo for PgDatabaseAutocommit {
    async fn stop(&mut self, id: Id<Stop>) -> Result<WithId<Stop>> {
        get(&self.pool, id).await
    }

    async fn stops(&mut self) -> Result<Vec<WithId<Stop>>> {
        get_all(&self.pool).await
    }

    async fn nearest_stop(
        &mut self,
        location: &Location,
        radius_m: f64,
    ) -> Result<Option<(WithId<Stop>, f64)>> {
        nearest(&self.pool, location, radius_m).await
    }

    async fn stops_nearby_with_routes(
        &mut self,
        location: &Location,
        radius_m: f64,
    ) -> Result<Vec<StopWithRoutes>> {
        nearby_with_routes(&self.pool, location, radius_m).await
    }
}

#[async_trait]
impl<'a> StopRepo for PgDatabaseTransaction<'a> {
    async fn stop(&mut self, id: Id<Stop>) -> Result<WithId<Stop>> {
        get(&mut *self.tx, id).await
    }

    async fn stops(&mut self) -> Result<Vec<WithId<Stop>>> {
        get_all(&mut *self.tx).await
    }

    async fn nearest_stop(
        &mut self,
        location: &Location,
        radius_m: f64,
    ) -> Result<Option<(WithId<Stop>, f64)>> {
        nearest(&mut *self.tx, location, radius_m).await
    }

    async fn stops_nearby_with_routes(
        &mut self,
        location: &Location,
        radius_m: f64,
    ) -> Result<Vec<StopWithRoutes>> {
        nearby_with_routes(&mut *self.tx, location, radius_m).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(stop_id: i32, route_id: i32) -> NearbyStopRouteRow {
        NearbyStopRouteRow {
            stop_id,
            stop_name: format!("stop-{stop_id}"),
            latitude: 10.4,
            longitude: -75.5,
            route_id,
            route_name: format!("route-{route_id}"),
            route_description: None,
        }
    }

    #[test]
    fn grouping_collects_routes_per_stop() {
        let grouped = group_nearby_rows(vec![row(1, 1), row(1, 2), row(2, 1)]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].routes.len(), 2);
        assert_eq!(grouped[1].routes.len(), 1);
        assert_eq!(grouped[0].stop.content.name, "stop-1");
    }
}
