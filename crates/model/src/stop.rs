use serde::{Deserialize, Serialize};
use utility::{
    geo::haversine_distance_m,
    id::{HasId, Id},
};

use crate::{route::Route, WithId};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in metres to another coordinate.
    pub fn distance_m(&self, other: &Location) -> f64 {
        haversine_distance_m(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// A bus stop. Stops are seeded once and immutable afterwards; their names
/// are unique across the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    pub location: Location,
}

impl HasId for Stop {
    type IdType = i32;
}

/// A stop together with the routes serving it, as returned by the nearby
/// stop lookup.
#[derive(Debug, Clone, Serialize)]
pub struct StopWithRoutes {
    pub stop: WithId<Stop>,
    pub routes: Vec<WithId<Route>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_validity_bounds() {
        assert!(Location::new(10.4, -75.5).is_valid());
        assert!(Location::new(-90.0, 180.0).is_valid());
        assert!(!Location::new(90.1, 0.0).is_valid());
        assert!(!Location::new(0.0, -180.5).is_valid());
    }
}
