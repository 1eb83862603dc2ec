use async_trait::async_trait;
use model::{
    route::{OrderedStop, Route, RouteWithStops},
    stop::{Location, Stop},
    WithId,
};
use sqlx::prelude::FromRow;
use transit::database::{Result, RouteRepo};
use utility::id::Id;

use crate::{
    queries::route::{get, get_all, get_all_with_stops, get_with_stops},
    PgDatabaseAutocommit, PgDatabaseTransaction,
};

use super::{DatabaseRow, DecodeError};

#[derive(Debug, Clone, FromRow)]
pub struct RouteRow {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl DatabaseRow for RouteRow {
    type Model = Route;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id)
    }

    fn to_model(self) -> std::result::Result<Self::Model, DecodeError> {
        Ok(Route {
            name: self.name,
            description: self.description,
        })
    }
}

/// One row of the route-to-stops join. The stop columns are null for
/// routes without any stops.
#[derive(Debug, Clone, FromRow)]
pub struct RouteStopRow {
    pub route_id: i32,
    pub route_name: String,
    pub route_description: Option<String>,
    pub ordinal: Option<i32>,
    pub stop_id: Option<i32>,
    pub stop_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Groups join rows into routes with ordered stop sequences, preserving the
/// query's route order.
pub fn group_route_stop_rows(rows: Vec<RouteStopRow>) -> Vec<RouteWithStops> {
    let mut grouped: Vec<RouteWithStops> = Vec::new();
    for row in rows {
        if grouped
            .last()
            .map(|entry| entry.route.id.raw() != row.route_id)
            .unwrap_or(true)
        {
            grouped.push(RouteWithStops {
                route: WithId::new(
                    Id::new(row.route_id),
                    Route {
                        name: row.route_name.clone(),
                        description: row.route_description.clone(),
                    },
                ),
                stops: Vec::new(),
            });
        }

        if let (Some(ordinal), Some(stop_id), Some(stop_name), Some(lat), Some(lon)) = (
            row.ordinal,
            row.stop_id,
            row.stop_name,
            row.latitude,
            row.longitude,
        ) {
            if let Some(entry) = grouped.last_mut() {
                entry.stops.push(OrderedStop {
                    ordinal,
                    stop: WithId::new(
                        Id::new(stop_id),
                        Stop {
                            name: stop_name,
                            location: Location::new(lat, lon),
                        },
                    ),
                });
            }
        }
    }
    grouped
}

#[async_trait]
impl RouteRepo for PgDatabaseAutocommit {
    async fn route(&mut self, id: Id<Route>) -> Result<WithId<Route>> {
        get(&self.pool, id).await
    }

    async fn routes(&mut self) -> Result<Vec<WithId<Route>>> {
        get_all(&self.pool).await
    }

    async fn route_with_stops(&mut self, id: Id<Route>) -> Result<RouteWithStops> {
        get_with_stops(&self.pool, id).await
    }

    async fn routes_with_stops(&mut self) -> Result<Vec<RouteWithStops>> {
        get_all_with_stops(&self.pool).await
    }
}

#[async_trait]
impl<'a> RouteRepo for PgDatabaseTransaction<'a> {
    async fn route(&mut self, id: Id<Route>) -> Result<WithId<Route>> {
        get(&mut *self.tx, id).await
    }

    async fn routes(&mut self) -> Result<Vec<WithId<Route>>> {
        get_all(&mut *self.tx).await
    }

    async fn route_with_stops(&mut self, id: Id<Route>) -> Result<RouteWithStops> {
        get_with_stops(&mut *self.tx, id).await
    }

    async fn routes_with_stops(&mut self) -> Result<Vec<RouteWithStops>> {
        get_all_with_stops(&mut *self.tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_splits_routes_and_keeps_stop_order() {
        let rows = vec![
            RouteStopRow {
                route_id: 1,
                route_name: "R1".to_owned(),
                route_description: None,
                ordinal: Some(1),
                stop_id: Some(10),
                stop_name: Some("A".to_owned()),
                latitude: Some(10.4),
                longitude: Some(-75.5),
            },
            RouteStopRow {
                route_id: 1,
                route_name: "R1".to_owned(),
                route_description: None,
                ordinal: Some(2),
                stop_id: Some(11),
                stop_name: Some("B".to_owned()),
                latitude: Some(10.41),
                longitude: Some(-75.51),
            },
            // A route without stops joins to all-null stop columns.
            RouteStopRow {
                route_id: 2,
                route_name: "R2".to_owned(),
                route_description: None,
                ordinal: None,
                stop_id: None,
                stop_name: None,
                latitude: None,
                longitude: None,
            },
        ];

        let grouped = group_route_stop_rows(rows);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].stops.len(), 2);
        assert_eq!(grouped[0].stops[1].stop.content.name, "B");
        assert!(grouped[1].stops.is_empty());
    }
}
