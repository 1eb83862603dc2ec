use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::{bus::VirtualBus, route::Route, user::User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }
}

impl TryFrom<&str> for SessionStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// One rider's participation in tracking, bounded by explicit start and
/// stop. At most one active session exists per rider.
///
/// `selected_route_id` is the route declared while planning;
/// `reported_route_id` is the route the rider claims to be aboard and is the
/// field the clustering engine reads. An on-bus session always carries a
/// reported route.
impl HasId for TrackingSession {
    type IdType = i32;
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSession {
    pub user_id: Id<User>,
    pub selected_route_id: Option<Id<Route>>,
    pub reported_route_id: Option<Id<Route>>,
    pub is_on_bus: bool,
    pub assigned_bus_id: Option<Id<VirtualBus>>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TrackingSession {
    pub fn start(user_id: Id<User>, selected_route_id: Option<Id<Route>>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            selected_route_id,
            reported_route_id: None,
            is_on_bus: false,
            assigned_bus_id: None,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Marks the session ended. Ended sessions never keep a bus assignment
    /// or the on-bus flag.
    pub fn end(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Ended;
        self.ended_at = Some(now);
        self.is_on_bus = false;
        self.assigned_bus_id = None;
    }

    pub fn clear_bus_assignment(&mut self) {
        self.assigned_bus_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ending_clears_bus_state() {
        let now = Utc::now();
        let mut session = TrackingSession::start(Id::new(1), None, now);
        session.is_on_bus = true;
        session.reported_route_id = Some(Id::new(3));
        session.assigned_bus_id = Some(Id::new(uuid::Uuid::new_v4()));

        session.end(now);

        assert_eq!(session.status, SessionStatus::Ended);
        assert!(!session.is_on_bus);
        assert!(session.assigned_bus_id.is_none());
        assert_eq!(session.ended_at, Some(now));
    }
}
