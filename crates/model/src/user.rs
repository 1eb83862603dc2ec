use chrono::{DateTime, Utc};
use serde::Serialize;
use utility::id::HasId;

/// A registered rider. `password_hash` holds the salted hash, never the
/// plain password, and must not be serialized into API responses.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl HasId for User {
    type IdType = i32;
}
