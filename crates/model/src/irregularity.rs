use chrono::{DateTime, Utc};
use serde::Serialize;
use utility::id::{HasId, Id};

use crate::{stop::Location, user::User};

/// A community-reported road irregularity with a like/dislike tally. The
/// counters mirror the vote rows; both are adjusted in the same transaction.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct Irregularity {
    pub title: String,
    pub description: Option<String>,
    pub location: Location,
    pub active: bool,
    pub likes: i32,
    pub dislikes: i32,
    pub created_at: DateTime<Utc>,
    pub last_like_at: Option<DateTime<Utc>>,
}

impl HasId for Irregularity {
    type IdType = i32;
}

impl Irregularity {
    pub fn report(
        title: String,
        description: Option<String>,
        location: Location,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            title,
            description,
            location,
            active: true,
            likes: 0,
            dislikes: 0,
            created_at: now,
            last_like_at: None,
        }
    }
}

/// One rider's vote on one irregularity. At most one row exists per
/// (user, irregularity) pair; repeat votes toggle `is_like` instead of
/// inserting.
#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub user_id: Id<User>,
    pub irregularity_id: Id<Irregularity>,
    pub is_like: bool,
    pub created_at: DateTime<Utc>,
}

impl HasId for Vote {
    type IdType = i32;
}
