use std::fmt::Debug;

use serde::Serialize;
use utility::id::{HasId, Id};

pub mod bus;
pub mod irregularity;
pub mod location;
pub mod route;
pub mod session;
pub mod stop;
pub mod user;

/// A model value together with its persistent identifier.
#[derive(Debug, Clone, Serialize)]
pub struct WithId<V>
where
    V: HasId,
    V::IdType: Serialize + Debug + Clone,
{
    pub id: Id<V>,
    #[serde(flatten)]
    pub content: V,
}

impl<V> WithId<V>
where
    V: HasId,
    V::IdType: Serialize + Debug + Clone,
{
    pub fn new(id: Id<V>, content: V) -> Self {
        Self { id, content }
    }
}
