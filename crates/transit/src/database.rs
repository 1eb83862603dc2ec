use std::{collections::HashMap, error, result};

use async_trait::async_trait;
use model::{
    bus::VirtualBus,
    irregularity::{Irregularity, Vote},
    location::LocationSample,
    route::{Route, RouteWithStops},
    session::TrackingSession,
    stop::{Location, Stop, StopWithRoutes},
    user::User,
    WithId,
};
use utility::id::Id;

#[derive(Debug)]
pub enum DatabaseError {
    NotFound,
    /// A uniqueness constraint rejected the write.
    Conflict,
    Other(Box<dyn error::Error + Send + Sync>),
}

impl DatabaseError {
    pub fn other<T: error::Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Other(Box::new(why))
    }
}

pub type Result<T> = result::Result<T, DatabaseError>;

#[async_trait]
pub trait StopRepo {
    async fn stop(&mut self, id: Id<Stop>) -> Result<WithId<Stop>>;

    async fn stops(&mut self) -> Result<Vec<WithId<Stop>>>;

    /// The single closest stop within `radius_m` metres of `location`,
    /// together with its geodesic distance. Ties are broken by ascending
    /// stop id.
    async fn nearest_stop(
        &mut self,
        location: &Location,
        radius_m: f64,
    ) -> Result<Option<(WithId<Stop>, f64)>>;

    /// All stops within `radius_m` metres, each with the routes serving it.
    async fn stops_nearby_with_routes(
        &mut self,
        location: &Location,
        radius_m: f64,
    ) -> Result<Vec<StopWithRoutes>>;
}

#[async_trait]
pub trait RouteRepo {
    async fn route(&mut self, id: Id<Route>) -> Result<WithId<Route>>;

    async fn routes(&mut self) -> Result<Vec<WithId<Route>>>;

    /// A route with its stop sequence in ordinal order.
    async fn route_with_stops(&mut self, id: Id<Route>) -> Result<RouteWithStops>;

    async fn routes_with_stops(&mut self) -> Result<Vec<RouteWithStops>>;
}

#[async_trait]
pub trait UserRepo {
    async fn user(&mut self, id: Id<User>) -> Result<WithId<User>>;

    async fn user_by_username(&mut self, username: &str) -> Result<Option<WithId<User>>>;

    async fn user_by_email(&mut self, email: &str) -> Result<Option<WithId<User>>>;

    async fn insert_user(&mut self, user: User) -> Result<WithId<User>>;

    async fn update_user(&mut self, user: &WithId<User>) -> Result<()>;
}

#[async_trait]
pub trait SessionRepo {
    /// The rider's active session, if any. At most one exists per rider.
    async fn active_session(
        &mut self,
        user_id: Id<User>,
    ) -> Result<Option<WithId<TrackingSession>>>;

    /// Active sessions for a set of riders, keyed by rider id.
    async fn active_sessions_for(
        &mut self,
        user_ids: &[Id<User>],
    ) -> Result<HashMap<Id<User>, WithId<TrackingSession>>>;

    async fn insert_session(
        &mut self,
        session: TrackingSession,
    ) -> Result<WithId<TrackingSession>>;

    async fn update_session(&mut self, session: &WithId<TrackingSession>) -> Result<()>;

    /// Active on-bus sessions currently assigned to the given bus.
    async fn sessions_claiming_bus(
        &mut self,
        bus_id: &Id<VirtualBus>,
    ) -> Result<Vec<WithId<TrackingSession>>>;

    /// Active sessions whose assigned bus has gone inactive.
    async fn sessions_with_inactive_bus(&mut self) -> Result<Vec<WithId<TrackingSession>>>;
}

#[async_trait]
pub trait BusRepo {
    async fn bus(&mut self, id: &Id<VirtualBus>) -> Result<WithId<VirtualBus>>;

    /// Active buses, optionally restricted to one route.
    async fn active_buses(
        &mut self,
        route_id: Option<Id<Route>>,
    ) -> Result<Vec<WithId<VirtualBus>>>;

    async fn insert_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()>;

    async fn update_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()>;
}

#[async_trait]
pub trait LocationRepo {
    /// Appends one sample to the rider's location history.
    async fn append_location(&mut self, sample: &LocationSample) -> Result<()>;
}

#[async_trait]
pub trait IrregularityRepo {
    async fn irregularity(&mut self, id: Id<Irregularity>) -> Result<WithId<Irregularity>>;

    async fn active_irregularities(&mut self) -> Result<Vec<WithId<Irregularity>>>;

    async fn insert_irregularity(
        &mut self,
        irregularity: Irregularity,
    ) -> Result<WithId<Irregularity>>;

    async fn update_irregularity(
        &mut self,
        irregularity: &WithId<Irregularity>,
    ) -> Result<()>;

    /// The rider's vote on an irregularity, if one was cast.
    async fn vote(
        &mut self,
        user_id: Id<User>,
        irregularity_id: Id<Irregularity>,
    ) -> Result<Option<WithId<Vote>>>;

    async fn insert_vote(&mut self, vote: Vote) -> Result<WithId<Vote>>;

    async fn update_vote(&mut self, vote: &WithId<Vote>) -> Result<()>;
}

#[async_trait]
pub trait DatabaseOperations:
    StopRepo + RouteRepo + UserRepo + SessionRepo + BusRepo + LocationRepo + IrregularityRepo
{
}

/// A unit of work with all-or-nothing semantics. Dropping a transaction
/// without calling [`DatabaseTransaction::commit`] discards its writes.
#[async_trait]
pub trait DatabaseTransaction: DatabaseOperations {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// A context whose writes are individually committed.
pub trait DatabaseAutocommit: DatabaseOperations {}

/// The geostore. Implementations are cheap to clone; every clone shares the
/// underlying connection pool, so handing one to each concurrent task is the
/// intended usage.
#[async_trait]
pub trait Database: Clone + Send + Sync + Sized + 'static {
    type Transaction: DatabaseTransaction + Send;
    type Autocommit: DatabaseAutocommit + Send;

    async fn transaction(&self) -> Result<Self::Transaction>;

    fn auto(&self) -> Self::Autocommit;
}
