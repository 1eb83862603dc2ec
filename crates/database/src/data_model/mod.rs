use std::{error::Error, fmt};

use model::WithId;
use serde::Serialize;
use std::fmt::Debug;
use transit::database::DatabaseError;
use utility::id::{HasId, Id};

pub mod bus;
pub mod irregularity;
pub mod location;
pub mod route;
pub mod session;
pub mod stop;
pub mod user;

/// A row whose enum-like columns failed to decode into the model.
#[derive(Debug)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corrupt database row: {}", self.0)
    }
}

impl Error for DecodeError {}

impl From<DecodeError> for DatabaseError {
    fn from(value: DecodeError) -> Self {
        DatabaseError::Other(Box::new(value))
    }
}

pub trait DatabaseRow {
    type Model: HasId;

    fn get_id(&self) -> Id<Self::Model>;
    fn to_model(self) -> Result<Self::Model, DecodeError>;
}

pub fn with_id<R: DatabaseRow>(row: R) -> Result<WithId<R::Model>, DatabaseError>
where
    <R::Model as HasId>::IdType: Debug + Clone + Serialize,
{
    let id = row.get_id();
    Ok(WithId::new(id, row.to_model()?))
}

pub fn with_ids<R: DatabaseRow>(
    rows: Vec<R>,
) -> Result<Vec<WithId<R::Model>>, DatabaseError>
where
    <R::Model as HasId>::IdType: Debug + Clone + Serialize,
{
    rows.into_iter().map(with_id).collect()
}
