use chrono::{DateTime, Utc};
use serde::Serialize;
use utility::id::Id;

use crate::{stop::Location, user::User};

/// One GPS report from a rider. Samples are append-only history; the
/// clustering engine only ever consumes the most recent sample per rider
/// within a tick.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct LocationSample {
    pub user_id: Id<User>,
    pub location: Location,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
