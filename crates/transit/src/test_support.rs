//! In-memory implementation of the database traits for exercising the
//! engine, planner and client without Postgres. Enabled through the
//! default-on `test-support` feature; production binaries do not touch it.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    bus::VirtualBus,
    irregularity::{Irregularity, Vote},
    location::LocationSample,
    route::{OrderedStop, Route, RouteWithStops},
    session::{SessionStatus, TrackingSession},
    stop::{Location, Stop, StopWithRoutes},
    user::User,
    WithId,
};
use utility::id::Id;
use uuid::Uuid;

use crate::database::{
    BusRepo, Database, DatabaseAutocommit, DatabaseError, DatabaseOperations,
    DatabaseTransaction, IrregularityRepo, LocationRepo, Result, RouteRepo,
    SessionRepo, StopRepo, UserRepo,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    stops: BTreeMap<i32, Stop>,
    routes: BTreeMap<i32, Route>,
    /// route id -> (ordinal, stop id), kept sorted by ordinal.
    route_stops: BTreeMap<i32, Vec<(i32, i32)>>,
    users: BTreeMap<i32, User>,
    next_user_id: i32,
    sessions: BTreeMap<i32, TrackingSession>,
    next_session_id: i32,
    buses: BTreeMap<Uuid, VirtualBus>,
    samples: Vec<LocationSample>,
    irregularities: BTreeMap<i32, Irregularity>,
    next_irregularity_id: i32,
    votes: BTreeMap<i32, Vote>,
    next_vote_id: i32,
}

/// Shared in-memory store with transactional snapshots: a transaction works
/// on a copy of the state and only publishes it on commit.
#[derive(Debug, Default, Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto(&self) -> MemoryAutocommit {
        MemoryAutocommit {
            state: self.state.clone(),
        }
    }

    pub fn seed_stop(&self, id: i32, name: &str, latitude: f64, longitude: f64) {
        let mut state = self.state.lock().unwrap();
        state.stops.insert(
            id,
            Stop {
                name: name.to_owned(),
                location: Location::new(latitude, longitude),
            },
        );
    }

    /// Seeds a route whose stops get ordinals 1..=n in slice order.
    pub fn seed_route(&self, id: i32, name: &str, stop_ids: &[i32]) {
        let mut state = self.state.lock().unwrap();
        state.routes.insert(
            id,
            Route {
                name: name.to_owned(),
                description: None,
            },
        );
        state.route_stops.insert(
            id,
            stop_ids
                .iter()
                .enumerate()
                .map(|(index, stop_id)| (index as i32 + 1, *stop_id))
                .collect(),
        );
    }

    pub fn seed_user(&self, id: i32, username: &str) -> Id<User> {
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            id,
            User {
                username: username.to_owned(),
                password_hash: "$argon2$seeded".to_owned(),
                first_name: username.to_owned(),
                last_name: "Seeded".to_owned(),
                email: format!("{username}@example.com"),
                created_at: Utc::now(),
            },
        );
        state.next_user_id = state.next_user_id.max(id + 1);
        Id::new(id)
    }

    /// Seeds an active session already declared on-bus for the route.
    pub fn seed_on_bus_session(&self, user_id: i32, route_id: i32) -> Id<TrackingSession> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_session_id + 1;
        state.next_session_id = id;
        let mut session =
            TrackingSession::start(Id::new(user_id), None, Utc::now());
        session.is_on_bus = true;
        session.reported_route_id = Some(Id::new(route_id));
        state.sessions.insert(id, session);
        Id::new(id)
    }

    pub fn seed_bus(
        &self,
        id: Uuid,
        route_id: i32,
        latitude: f64,
        longitude: f64,
        last_update: DateTime<Utc>,
    ) -> Id<VirtualBus> {
        let mut state = self.state.lock().unwrap();
        let bus = VirtualBus::new(
            Id::new(route_id),
            Location::new(latitude, longitude),
            last_update,
        );
        state.buses.insert(id, bus);
        Id::new(id)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;
    type Autocommit = MemoryAutocommit;

    async fn transaction(&self) -> Result<Self::Transaction> {
        let working = self.state.lock().unwrap().clone();
        Ok(MemoryTransaction {
            state: self.state.clone(),
            working,
        })
    }

    fn auto(&self) -> Self::Autocommit {
        MemoryAutocommit {
            state: self.state.clone(),
        }
    }
}

pub struct MemoryAutocommit {
    state: Arc<Mutex<MemoryState>>,
}

pub struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    working: MemoryState,
}

impl DatabaseAutocommit for MemoryAutocommit {}

#[async_trait]
impl DatabaseTransaction for MemoryTransaction {
    async fn commit(self) -> Result<()> {
        *self.state.lock().unwrap() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl DatabaseOperations for MemoryAutocommit {}
impl DatabaseOperations for MemoryTransaction {}

// The query logic lives on `MemoryState`; the autocommit context locks the
// shared state per call while the transaction works on its private copy.

impl MemoryAutocommit {
    fn with_state<R>(&mut self, action: impl FnOnce(&mut MemoryState) -> R) -> R {
        action(&mut self.state.lock().unwrap())
    }
}

impl MemoryTransaction {
    fn with_state<R>(&mut self, action: impl FnOnce(&mut MemoryState) -> R) -> R {
        action(&mut self.working)
    }
}

impl MemoryState {
    fn stop(&self, id: Id<Stop>) -> Result<WithId<Stop>> {
        self.stops
            .get(&id.raw())
            .cloned()
            .map(|stop| WithId::new(id, stop))
            .ok_or(DatabaseError::NotFound)
    }

    fn stops(&self) -> Vec<WithId<Stop>> {
        self.stops
            .iter()
            .map(|(id, stop)| WithId::new(Id::new(*id), stop.clone()))
            .collect()
    }

    fn nearest_stop(
        &self,
        location: &Location,
        radius_m: f64,
    ) -> Option<(WithId<Stop>, f64)> {
        let mut best: Option<(WithId<Stop>, f64)> = None;
        for (id, stop) in &self.stops {
            let distance = location.distance_m(&stop.location);
            if distance > radius_m {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, best_distance)) => distance < *best_distance,
            };
            if better {
                best = Some((WithId::new(Id::new(*id), stop.clone()), distance));
            }
        }
        best
    }

    fn stops_nearby_with_routes(
        &self,
        location: &Location,
        radius_m: f64,
    ) -> Vec<StopWithRoutes> {
        self.stops
            .iter()
            .filter(|(_, stop)| location.distance_m(&stop.location) <= radius_m)
            .map(|(id, stop)| StopWithRoutes {
                stop: WithId::new(Id::new(*id), stop.clone()),
                routes: self
                    .route_stops
                    .iter()
                    .filter(|(_, stops)| {
                        stops.iter().any(|(_, stop_id)| stop_id == id)
                    })
                    .filter_map(|(route_id, _)| {
                        self.routes.get(route_id).map(|route| {
                            WithId::new(Id::new(*route_id), route.clone())
                        })
                    })
                    .collect(),
            })
            .collect()
    }

    fn route(&self, id: Id<Route>) -> Result<WithId<Route>> {
        self.routes
            .get(&id.raw())
            .cloned()
            .map(|route| WithId::new(id, route))
            .ok_or(DatabaseError::NotFound)
    }

    fn routes(&self) -> Vec<WithId<Route>> {
        self.routes
            .iter()
            .map(|(id, route)| WithId::new(Id::new(*id), route.clone()))
            .collect()
    }

    fn route_with_stops(&self, id: Id<Route>) -> Result<RouteWithStops> {
        let route = self.route(id)?;
        let mut entries = self
            .route_stops
            .get(&id.raw())
            .cloned()
            .unwrap_or_default();
        entries.sort_by_key(|(ordinal, _)| *ordinal);
        let stops = entries
            .into_iter()
            .filter_map(|(ordinal, stop_id)| {
                self.stops.get(&stop_id).map(|stop| OrderedStop {
                    ordinal,
                    stop: WithId::new(Id::new(stop_id), stop.clone()),
                })
            })
            .collect();
        Ok(RouteWithStops { route, stops })
    }

    fn routes_with_stops(&self) -> Vec<RouteWithStops> {
        self.routes
            .keys()
            .filter_map(|id| self.route_with_stops(Id::new(*id)).ok())
            .collect()
    }

    fn user(&self, id: Id<User>) -> Result<WithId<User>> {
        self.users
            .get(&id.raw())
            .cloned()
            .map(|user| WithId::new(id, user))
            .ok_or(DatabaseError::NotFound)
    }

    fn user_by<F>(&self, matches: F) -> Option<WithId<User>>
    where
        F: Fn(&User) -> bool,
    {
        self.users
            .iter()
            .find(|(_, user)| matches(user))
            .map(|(id, user)| WithId::new(Id::new(*id), user.clone()))
    }

    fn insert_user(&mut self, user: User) -> Result<WithId<User>> {
        if self.users.values().any(|existing| {
            existing.username == user.username || existing.email == user.email
        }) {
            return Err(DatabaseError::Conflict);
        }
        self.next_user_id += 1;
        let id = self.next_user_id;
        self.users.insert(id, user.clone());
        Ok(WithId::new(Id::new(id), user))
    }

    fn update_user(&mut self, user: &WithId<User>) -> Result<()> {
        if !self.users.contains_key(&user.id.raw()) {
            return Err(DatabaseError::NotFound);
        }
        self.users.insert(user.id.raw(), user.content.clone());
        Ok(())
    }

    fn active_session(&self, user_id: Id<User>) -> Option<WithId<TrackingSession>> {
        self.sessions
            .iter()
            .find(|(_, session)| {
                session.user_id == user_id && session.status == SessionStatus::Active
            })
            .map(|(id, session)| WithId::new(Id::new(*id), session.clone()))
    }

    fn insert_session(
        &mut self,
        session: TrackingSession,
    ) -> Result<WithId<TrackingSession>> {
        self.next_session_id += 1;
        let id = self.next_session_id;
        self.sessions.insert(id, session.clone());
        Ok(WithId::new(Id::new(id), session))
    }

    fn update_session(&mut self, session: &WithId<TrackingSession>) -> Result<()> {
        if !self.sessions.contains_key(&session.id.raw()) {
            return Err(DatabaseError::NotFound);
        }
        self.sessions
            .insert(session.id.raw(), session.content.clone());
        Ok(())
    }

    fn sessions_claiming_bus(
        &self,
        bus_id: &Id<VirtualBus>,
    ) -> Vec<WithId<TrackingSession>> {
        self.sessions
            .iter()
            .filter(|(_, session)| {
                session.status == SessionStatus::Active
                    && session.is_on_bus
                    && session.assigned_bus_id.as_ref() == Some(bus_id)
            })
            .map(|(id, session)| WithId::new(Id::new(*id), session.clone()))
            .collect()
    }

    fn sessions_with_inactive_bus(&self) -> Vec<WithId<TrackingSession>> {
        self.sessions
            .iter()
            .filter(|(_, session)| {
                session.status == SessionStatus::Active
                    && session
                        .assigned_bus_id
                        .map(|bus_id| {
                            self.buses
                                .get(&bus_id.raw())
                                .map(|bus| !bus.is_active())
                                .unwrap_or(false)
                        })
                        .unwrap_or(false)
            })
            .map(|(id, session)| WithId::new(Id::new(*id), session.clone()))
            .collect()
    }

    fn bus(&self, id: &Id<VirtualBus>) -> Result<WithId<VirtualBus>> {
        self.buses
            .get(&id.raw())
            .cloned()
            .map(|bus| WithId::new(*id, bus))
            .ok_or(DatabaseError::NotFound)
    }

    fn active_buses(&self, route_id: Option<Id<Route>>) -> Vec<WithId<VirtualBus>> {
        self.buses
            .iter()
            .filter(|(_, bus)| bus.is_active())
            .filter(|(_, bus)| {
                route_id
                    .map(|route| bus.route_id == route)
                    .unwrap_or(true)
            })
            .map(|(id, bus)| WithId::new(Id::new(*id), bus.clone()))
            .collect()
    }

    fn insert_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
        if self.buses.contains_key(&bus.id.raw()) {
            return Err(DatabaseError::Conflict);
        }
        self.buses.insert(bus.id.raw(), bus.content.clone());
        Ok(())
    }

    fn update_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
        if !self.buses.contains_key(&bus.id.raw()) {
            return Err(DatabaseError::NotFound);
        }
        self.buses.insert(bus.id.raw(), bus.content.clone());
        Ok(())
    }

    fn irregularity(&self, id: Id<Irregularity>) -> Result<WithId<Irregularity>> {
        self.irregularities
            .get(&id.raw())
            .cloned()
            .map(|irregularity| WithId::new(id, irregularity))
            .ok_or(DatabaseError::NotFound)
    }

    fn active_irregularities(&self) -> Vec<WithId<Irregularity>> {
        self.irregularities
            .iter()
            .filter(|(_, irregularity)| irregularity.active)
            .map(|(id, irregularity)| {
                WithId::new(Id::new(*id), irregularity.clone())
            })
            .collect()
    }

    fn insert_irregularity(
        &mut self,
        irregularity: Irregularity,
    ) -> Result<WithId<Irregularity>> {
        self.next_irregularity_id += 1;
        let id = self.next_irregularity_id;
        self.irregularities.insert(id, irregularity.clone());
        Ok(WithId::new(Id::new(id), irregularity))
    }

    fn update_irregularity(&mut self, irregularity: &WithId<Irregularity>) -> Result<()> {
        if !self.irregularities.contains_key(&irregularity.id.raw()) {
            return Err(DatabaseError::NotFound);
        }
        self.irregularities
            .insert(irregularity.id.raw(), irregularity.content.clone());
        Ok(())
    }

    fn vote(
        &self,
        user_id: Id<User>,
        irregularity_id: Id<Irregularity>,
    ) -> Option<WithId<Vote>> {
        self.votes
            .iter()
            .find(|(_, vote)| {
                vote.user_id == user_id && vote.irregularity_id == irregularity_id
            })
            .map(|(id, vote)| WithId::new(Id::new(*id), vote.clone()))
    }

    fn insert_vote(&mut self, vote: Vote) -> Result<WithId<Vote>> {
        if self
            .vote(vote.user_id, vote.irregularity_id)
            .is_some()
        {
            return Err(DatabaseError::Conflict);
        }
        self.next_vote_id += 1;
        let id = self.next_vote_id;
        self.votes.insert(id, vote.clone());
        Ok(WithId::new(Id::new(id), vote))
    }

    fn update_vote(&mut self, vote: &WithId<Vote>) -> Result<()> {
        if !self.votes.contains_key(&vote.id.raw()) {
            return Err(DatabaseError::NotFound);
        }
        self.votes.insert(vote.id.raw(), vote.content.clone());
        Ok(())
    }
}

macro_rules! impl_repos {
    ($context:ty) => {
        #[async_trait]
        impl StopRepo for $context {
            async fn stop(&mut self, id: Id<Stop>) -> Result<WithId<Stop>> {
                self.with_state(|state| state.stop(id))
            }

            async fn stops(&mut self) -> Result<Vec<WithId<Stop>>> {
                Ok(self.with_state(|state| state.stops()))
            }

            async fn nearest_stop(
                &mut self,
                location: &Location,
                radius_m: f64,
            ) -> Result<Option<(WithId<Stop>, f64)>> {
                Ok(self.with_state(|state| state.nearest_stop(location, radius_m)))
            }

            async fn stops_nearby_with_routes(
                &mut self,
                location: &Location,
                radius_m: f64,
            ) -> Result<Vec<StopWithRoutes>> {
                Ok(self
                    .with_state(|state| state.stops_nearby_with_routes(location, radius_m)))
            }
        }

        #[async_trait]
        impl RouteRepo for $context {
            async fn route(&mut self, id: Id<Route>) -> Result<WithId<Route>> {
                self.with_state(|state| state.route(id))
            }

            async fn routes(&mut self) -> Result<Vec<WithId<Route>>> {
                Ok(self.with_state(|state| state.routes()))
            }

            async fn route_with_stops(
                &mut self,
                id: Id<Route>,
            ) -> Result<RouteWithStops> {
                self.with_state(|state| state.route_with_stops(id))
            }

            async fn routes_with_stops(&mut self) -> Result<Vec<RouteWithStops>> {
                Ok(self.with_state(|state| state.routes_with_stops()))
            }
        }

        #[async_trait]
        impl UserRepo for $context {
            async fn user(&mut self, id: Id<User>) -> Result<WithId<User>> {
                self.with_state(|state| state.user(id))
            }

            async fn user_by_username(
                &mut self,
                username: &str,
            ) -> Result<Option<WithId<User>>> {
                Ok(self.with_state(|state| {
                    state.user_by(|user| user.username == username)
                }))
            }

            async fn user_by_email(
                &mut self,
                email: &str,
            ) -> Result<Option<WithId<User>>> {
                Ok(self.with_state(|state| state.user_by(|user| user.email == email)))
            }

            async fn insert_user(&mut self, user: User) -> Result<WithId<User>> {
                self.with_state(|state| state.insert_user(user))
            }

            async fn update_user(&mut self, user: &WithId<User>) -> Result<()> {
                self.with_state(|state| state.update_user(user))
            }
        }

        #[async_trait]
        impl SessionRepo for $context {
            async fn active_session(
                &mut self,
                user_id: Id<User>,
            ) -> Result<Option<WithId<TrackingSession>>> {
                Ok(self.with_state(|state| state.active_session(user_id)))
            }

            async fn active_sessions_for(
                &mut self,
                user_ids: &[Id<User>],
            ) -> Result<HashMap<Id<User>, WithId<TrackingSession>>> {
                Ok(self.with_state(|state| {
                    user_ids
                        .iter()
                        .filter_map(|user_id| {
                            state
                                .active_session(*user_id)
                                .map(|session| (*user_id, session))
                        })
                        .collect()
                }))
            }

            async fn insert_session(
                &mut self,
                session: TrackingSession,
            ) -> Result<WithId<TrackingSession>> {
                self.with_state(|state| state.insert_session(session))
            }

            async fn update_session(
                &mut self,
                session: &WithId<TrackingSession>,
            ) -> Result<()> {
                self.with_state(|state| state.update_session(session))
            }

            async fn sessions_claiming_bus(
                &mut self,
                bus_id: &Id<VirtualBus>,
            ) -> Result<Vec<WithId<TrackingSession>>> {
                Ok(self.with_state(|state| state.sessions_claiming_bus(bus_id)))
            }

            async fn sessions_with_inactive_bus(
                &mut self,
            ) -> Result<Vec<WithId<TrackingSession>>> {
                Ok(self.with_state(|state| state.sessions_with_inactive_bus()))
            }
        }

        #[async_trait]
        impl BusRepo for $context {
            async fn bus(&mut self, id: &Id<VirtualBus>) -> Result<WithId<VirtualBus>> {
                self.with_state(|state| state.bus(id))
            }

            async fn active_buses(
                &mut self,
                route_id: Option<Id<Route>>,
            ) -> Result<Vec<WithId<VirtualBus>>> {
                Ok(self.with_state(|state| state.active_buses(route_id)))
            }

            async fn insert_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
                self.with_state(|state| state.insert_bus(bus))
            }

            async fn update_bus(&mut self, bus: &WithId<VirtualBus>) -> Result<()> {
                self.with_state(|state| state.update_bus(bus))
            }
        }

        #[async_trait]
        impl LocationRepo for $context {
            async fn append_location(&mut self, sample: &LocationSample) -> Result<()> {
                self.with_state(|state| state.samples.push(sample.clone()));
                Ok(())
            }
        }

        #[async_trait]
        impl IrregularityRepo for $context {
            async fn irregularity(
                &mut self,
                id: Id<Irregularity>,
            ) -> Result<WithId<Irregularity>> {
                self.with_state(|state| state.irregularity(id))
            }

            async fn active_irregularities(
                &mut self,
            ) -> Result<Vec<WithId<Irregularity>>> {
                Ok(self.with_state(|state| state.active_irregularities()))
            }

            async fn insert_irregularity(
                &mut self,
                irregularity: Irregularity,
            ) -> Result<WithId<Irregularity>> {
                self.with_state(|state| state.insert_irregularity(irregularity))
            }

            async fn update_irregularity(
                &mut self,
                irregularity: &WithId<Irregularity>,
            ) -> Result<()> {
                self.with_state(|state| state.update_irregularity(irregularity))
            }

            async fn vote(
                &mut self,
                user_id: Id<User>,
                irregularity_id: Id<Irregularity>,
            ) -> Result<Option<WithId<Vote>>> {
                Ok(self.with_state(|state| state.vote(user_id, irregularity_id)))
            }

            async fn insert_vote(&mut self, vote: Vote) -> Result<WithId<Vote>> {
                self.with_state(|state| state.insert_vote(vote))
            }

            async fn update_vote(&mut self, vote: &WithId<Vote>) -> Result<()> {
                self.with_state(|state| state.update_vote(vote))
            }
        }
    };
}

impl_repos!(MemoryAutocommit);
impl_repos!(MemoryTransaction);
