use transit::database::DatabaseError;

pub mod bus;
pub mod irregularity;
pub mod location;
pub mod route;
pub mod session;
pub mod stop;
pub mod user;

pub(crate) fn convert_error(why: sqlx::Error) -> DatabaseError {
    match why {
        sqlx::Error::RowNotFound => DatabaseError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DatabaseError::Conflict
        }
        why => DatabaseError::Other(Box::new(why)),
    }
}
