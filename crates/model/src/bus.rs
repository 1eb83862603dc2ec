use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};
use uuid::Uuid;

use crate::{route::Route, stop::Location, user::User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    Active,
    Inactive,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::Active => "active",
            BusStatus::Inactive => "inactive",
        }
    }
}

impl TryFrom<&str> for BusStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(BusStatus::Active),
            "inactive" => Ok(BusStatus::Inactive),
            other => Err(format!("unknown bus status '{other}'")),
        }
    }
}

/// A synthetic vehicle inferred by clustering co-located riders who declared
/// the same route. Identified by uuid since buses are minted at runtime, not
/// seeded.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct VirtualBus {
    pub route_id: Id<Route>,
    pub location: Location,
    pub current_speed: Option<f64>,
    pub current_heading: Option<f64>,
    pub assigned_user_ids: Vec<Id<User>>,
    pub last_update: DateTime<Utc>,
    pub status: BusStatus,
}

impl HasId for VirtualBus {
    type IdType = Uuid;
}

impl VirtualBus {
    pub fn new(route_id: Id<Route>, location: Location, now: DateTime<Utc>) -> Self {
        Self {
            route_id,
            location,
            current_speed: None,
            current_heading: None,
            assigned_user_ids: Vec::new(),
            last_update: now,
            status: BusStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BusStatus::Active
    }

    /// Adds a rider to the assigned set. Idempotent.
    pub fn assign(&mut self, user_id: Id<User>) {
        if !self.assigned_user_ids.contains(&user_id) {
            self.assigned_user_ids.push(user_id);
        }
    }

    pub fn unassign(&mut self, user_id: &Id<User>) {
        self.assigned_user_ids.retain(|assigned| assigned != user_id);
    }

    /// Transitions the bus to inactive. Inactive buses keep no riders.
    pub fn deactivate(&mut self) {
        self.status = BusStatus::Inactive;
        self.assigned_user_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_idempotent() {
        let mut bus = VirtualBus::new(
            Id::new(1),
            Location::new(10.4, -75.5),
            Utc::now(),
        );
        bus.assign(Id::new(7));
        bus.assign(Id::new(7));
        assert_eq!(bus.assigned_user_ids, vec![Id::new(7)]);
    }

    #[test]
    fn deactivation_clears_riders() {
        let mut bus = VirtualBus::new(
            Id::new(1),
            Location::new(10.4, -75.5),
            Utc::now(),
        );
        bus.assign(Id::new(7));
        bus.deactivate();
        assert_eq!(bus.status, BusStatus::Inactive);
        assert!(bus.assigned_user_ids.is_empty());
    }
}
