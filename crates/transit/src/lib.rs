use std::error::Error;

pub mod client;
pub mod database;
pub mod engine;
pub mod planner;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Error type of the high-level operations exposed by [`client::Client`].
/// Request handlers map these onto protocol status codes.
#[derive(Debug)]
pub enum RequestError {
    NotFound,
    /// A uniqueness rule was violated; the message is short, stable and safe
    /// to show to clients.
    Conflict(&'static str),
    /// A state precondition was not met (no active session, not on a bus).
    Precondition(&'static str),
    /// No stop within walking range of the requested coordinate.
    NoNearbyStop,
    /// Stops in range, but the network offers no path between them.
    NoPath,
    Other(Box<dyn Error + Send + Sync>),
}

impl RequestError {
    pub fn other<T: Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Other(Box::new(why))
    }
}

impl From<database::DatabaseError> for RequestError {
    fn from(value: database::DatabaseError) -> Self {
        match value {
            database::DatabaseError::NotFound => Self::NotFound,
            database::DatabaseError::Conflict => {
                Self::Conflict("conflicting value")
            }
            database::DatabaseError::Other(why) => Self::Other(why),
        }
    }
}

pub type RequestResult<O> = Result<O, RequestError>;
