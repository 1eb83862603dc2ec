use serde::{Deserialize, Serialize};
use utility::id::HasId;

use crate::{stop::Stop, WithId};

/// A bus line. The geometry of a route is never stored; it is derived from
/// its ordered stops.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub description: Option<String>,
}

impl HasId for Route {
    type IdType = i32;
}

/// One entry of a route's stop sequence. Ordinals are strictly increasing
/// and unique within a route.
#[derive(Debug, Clone, Serialize)]
pub struct OrderedStop {
    pub ordinal: i32,
    pub stop: WithId<Stop>,
}

/// A route with its stop sequence resolved, in ordinal order.
#[derive(Debug, Clone, Serialize)]
pub struct RouteWithStops {
    pub route: WithId<Route>,
    pub stops: Vec<OrderedStop>,
}

impl RouteWithStops {
    /// The piecewise-linear path through the route's stops in ordinal order,
    /// as (latitude, longitude) vertices.
    pub fn polyline(&self) -> Vec<(f64, f64)> {
        self.stops
            .iter()
            .map(|entry| {
                (
                    entry.stop.content.location.latitude,
                    entry.stop.content.location.longitude,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use utility::id::Id;

    use super::*;
    use crate::stop::Location;

    #[test]
    fn polyline_follows_ordinal_order() {
        let route = RouteWithStops {
            route: WithId::new(
                Id::new(1),
                Route {
                    name: "R1".to_owned(),
                    description: None,
                },
            ),
            stops: vec![
                OrderedStop {
                    ordinal: 1,
                    stop: WithId::new(
                        Id::new(10),
                        Stop {
                            name: "A".to_owned(),
                            location: Location::new(10.40, -75.50),
                        },
                    ),
                },
                OrderedStop {
                    ordinal: 2,
                    stop: WithId::new(
                        Id::new(11),
                        Stop {
                            name: "B".to_owned(),
                            location: Location::new(10.41, -75.51),
                        },
                    ),
                },
            ],
        };
        assert_eq!(
            route.polyline(),
            vec![(10.40, -75.50), (10.41, -75.51)]
        );
    }
}
