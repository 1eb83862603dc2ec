use chrono::Utc;
use model::{
    bus::VirtualBus,
    irregularity::{Irregularity, Vote},
    location::LocationSample,
    route::{Route, RouteWithStops},
    session::TrackingSession,
    stop::{Location, StopWithRoutes},
    user::User,
    WithId,
};
use utility::id::Id;

use crate::{
    database::{
        BusRepo, Database, DatabaseOperations, DatabaseTransaction, IrregularityRepo,
        LocationRepo, RouteRepo, SessionRepo, StopRepo, UserRepo,
    },
    planner::{self, PlanError, PlannerConfig, TripPlan},
    RequestError, RequestResult,
};

/// New-user input. The password arrives already hashed; this layer never
/// sees plain credentials.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// High-level operations over the geostore. One client is shared by all
/// request handlers; the underlying database clones cheaply.
#[derive(Debug, Clone)]
pub struct Client<D>
where
    D: Database,
{
    pub database: D,
    planner_config: PlannerConfig,
}

impl<D> Client<D>
where
    D: Database,
{
    pub fn new(database: D) -> Self {
        Self {
            database,
            planner_config: PlannerConfig::default(),
        }
    }

    pub fn with_planner_config(mut self, config: PlannerConfig) -> Self {
        self.planner_config = config;
        self
    }
}

// - Users -

impl<D> Client<D>
where
    D: Database,
{
    pub async fn register_user(&self, new_user: NewUser) -> RequestResult<WithId<User>> {
        let mut tx = self.database.transaction().await?;
        if tx.user_by_username(&new_user.username).await?.is_some() {
            return Err(RequestError::Conflict("username already registered"));
        }
        if tx.user_by_email(&new_user.email).await?.is_some() {
            return Err(RequestError::Conflict("email already registered"));
        }
        let user = tx
            .insert_user(User {
                username: new_user.username,
                password_hash: new_user.password_hash,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                email: new_user.email,
                created_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn user(&self, id: Id<User>) -> RequestResult<WithId<User>> {
        Ok(self.database.auto().user(id).await?)
    }

    pub async fn user_by_username(
        &self,
        username: &str,
    ) -> RequestResult<Option<WithId<User>>> {
        Ok(self.database.auto().user_by_username(username).await?)
    }

    pub async fn update_profile(
        &self,
        id: Id<User>,
        update: ProfileUpdate,
    ) -> RequestResult<WithId<User>> {
        let mut tx = self.database.transaction().await?;
        let mut user = tx.user(id).await?;

        if update.username != user.content.username {
            if let Some(existing) = tx.user_by_username(&update.username).await? {
                if existing.id != id {
                    return Err(RequestError::Conflict("username already in use"));
                }
            }
        }
        if update.email != user.content.email {
            if let Some(existing) = tx.user_by_email(&update.email).await? {
                if existing.id != id {
                    return Err(RequestError::Conflict("email already in use"));
                }
            }
        }

        user.content.username = update.username;
        user.content.first_name = update.first_name;
        user.content.last_name = update.last_name;
        user.content.email = update.email;
        tx.update_user(&user).await?;
        tx.commit().await?;
        Ok(user)
    }
}

// - Tracking sessions -

impl<D> Client<D>
where
    D: Database,
{
    /// Starts a tracking session, or updates the selected route of the
    /// already-active one. Sessions are single-row-locked by the database,
    /// which linearizes a rider's lifecycle transitions.
    pub async fn start_session(
        &self,
        user_id: Id<User>,
        selected_route_id: Option<Id<Route>>,
    ) -> RequestResult<WithId<TrackingSession>> {
        let mut tx = self.database.transaction().await?;
        tx.user(user_id).await?;

        let session = match tx.active_session(user_id).await? {
            Some(mut session) => {
                session.content.selected_route_id = selected_route_id;
                tx.update_session(&session).await?;
                session
            }
            None => {
                tx.insert_session(TrackingSession::start(
                    user_id,
                    selected_route_id,
                    Utc::now(),
                ))
                .await?
            }
        };
        tx.commit().await?;
        Ok(session)
    }

    /// Records the rider's on-bus declaration. Requires an active session;
    /// declaring off-bus releases any cluster assignment.
    pub async fn set_on_bus(
        &self,
        user_id: Id<User>,
        reported_route_id: Id<Route>,
        is_on_bus: bool,
    ) -> RequestResult<WithId<TrackingSession>> {
        let mut tx = self.database.transaction().await?;
        let Some(mut session) = tx.active_session(user_id).await? else {
            return Err(RequestError::Precondition(
                "no active tracking session, start one first",
            ));
        };
        tx.route(reported_route_id).await?;

        session.content.reported_route_id = Some(reported_route_id);
        session.content.is_on_bus = is_on_bus;
        if !is_on_bus {
            release_bus_assignment(&mut tx, &mut session).await?;
        }
        tx.update_session(&session).await?;
        tx.commit().await?;
        Ok(session)
    }

    /// Ends the active session and releases the rider from their bus.
    pub async fn stop_session(
        &self,
        user_id: Id<User>,
    ) -> RequestResult<WithId<TrackingSession>> {
        let mut tx = self.database.transaction().await?;
        let Some(mut session) = tx.active_session(user_id).await? else {
            return Err(RequestError::NotFound);
        };
        release_bus_assignment(&mut tx, &mut session).await?;
        session.content.end(Utc::now());
        tx.update_session(&session).await?;
        tx.commit().await?;
        Ok(session)
    }

    pub async fn active_session(
        &self,
        user_id: Id<User>,
    ) -> RequestResult<Option<WithId<TrackingSession>>> {
        Ok(self.database.auto().active_session(user_id).await?)
    }

    /// Appends one accepted location sample to the rider's history. Each
    /// sample is committed independently of the clustering tick.
    pub async fn record_location(&self, sample: &LocationSample) -> RequestResult<()> {
        Ok(self.database.auto().append_location(sample).await?)
    }
}

/// Removes the session's bus assignment and the rider from the bus's
/// assigned set, keeping both sides of the relation consistent.
async fn release_bus_assignment<O>(
    ops: &mut O,
    session: &mut WithId<TrackingSession>,
) -> RequestResult<()>
where
    O: DatabaseOperations + Send,
{
    if let Some(bus_id) = session.content.assigned_bus_id {
        match ops.bus(&bus_id).await {
            Ok(mut bus) => {
                bus.content.unassign(&session.content.user_id);
                ops.update_bus(&bus).await?;
            }
            Err(crate::database::DatabaseError::NotFound) => {}
            Err(why) => return Err(why.into()),
        }
        session.content.clear_bus_assignment();
    }
    Ok(())
}

// - Virtual buses -

impl<D> Client<D>
where
    D: Database,
{
    pub async fn active_buses(
        &self,
        route_id: Option<Id<Route>>,
    ) -> RequestResult<Vec<WithId<VirtualBus>>> {
        Ok(self.database.auto().active_buses(route_id).await?)
    }

    pub async fn bus_status(&self, id: &Id<VirtualBus>) -> RequestResult<WithId<VirtualBus>> {
        Ok(self.database.auto().bus(id).await?)
    }

    pub async fn bus_route(&self, id: &Id<VirtualBus>) -> RequestResult<WithId<Route>> {
        let mut ops = self.database.auto();
        let bus = ops.bus(id).await?;
        Ok(ops.route(bus.content.route_id).await?)
    }
}

// - Routes, stops and trip planning -

impl<D> Client<D>
where
    D: Database,
{
    pub async fn routes_with_stops(&self) -> RequestResult<Vec<RouteWithStops>> {
        Ok(self.database.auto().routes_with_stops().await?)
    }

    pub async fn route_with_stops(&self, id: Id<Route>) -> RequestResult<RouteWithStops> {
        Ok(self.database.auto().route_with_stops(id).await?)
    }

    pub async fn stops_nearby_with_routes(
        &self,
        location: &Location,
        radius_m: f64,
    ) -> RequestResult<Vec<StopWithRoutes>> {
        Ok(self
            .database
            .auto()
            .stops_nearby_with_routes(location, radius_m)
            .await?)
    }

    pub async fn plan_trip(
        &self,
        origin: Location,
        destination: Location,
    ) -> RequestResult<TripPlan> {
        let mut ops = self.database.auto();
        planner::plan_trip(&mut ops, origin, destination, &self.planner_config)
            .await
            .map_err(|why| match why {
                PlanError::NoNearbyStop => RequestError::NoNearbyStop,
                PlanError::NoPath => RequestError::NoPath,
                PlanError::Database(db) => db.into(),
            })
    }
}

// - Irregularities -

impl<D> Client<D>
where
    D: Database,
{
    pub async fn report_irregularity(
        &self,
        title: String,
        description: Option<String>,
        location: Location,
    ) -> RequestResult<WithId<Irregularity>> {
        Ok(self
            .database
            .auto()
            .insert_irregularity(Irregularity::report(
                title,
                description,
                location,
                Utc::now(),
            ))
            .await?)
    }

    pub async fn irregularity(
        &self,
        id: Id<Irregularity>,
    ) -> RequestResult<WithId<Irregularity>> {
        Ok(self.database.auto().irregularity(id).await?)
    }

    pub async fn active_irregularities(&self) -> RequestResult<Vec<WithId<Irregularity>>> {
        Ok(self.database.auto().active_irregularities().await?)
    }

    /// Casts or toggles a vote. A repeated vote in the same direction
    /// conflicts; a vote in the opposite direction flips the existing row.
    /// Counters and the vote row change in one transaction.
    pub async fn vote_irregularity(
        &self,
        user_id: Id<User>,
        irregularity_id: Id<Irregularity>,
        is_like: bool,
    ) -> RequestResult<WithId<Vote>> {
        let now = Utc::now();
        let mut tx = self.database.transaction().await?;
        let mut irregularity = tx.irregularity(irregularity_id).await?;

        let vote = match tx.vote(user_id, irregularity_id).await? {
            Some(mut vote) => {
                if vote.content.is_like == is_like {
                    return Err(if is_like {
                        RequestError::Conflict("already liked this irregularity")
                    } else {
                        RequestError::Conflict("already disliked this irregularity")
                    });
                }
                vote.content.is_like = is_like;
                vote.content.created_at = now;
                if is_like {
                    irregularity.content.dislikes -= 1;
                    irregularity.content.likes += 1;
                    irregularity.content.last_like_at = Some(now);
                } else {
                    irregularity.content.likes -= 1;
                    irregularity.content.dislikes += 1;
                }
                tx.update_vote(&vote).await?;
                vote
            }
            None => {
                if is_like {
                    irregularity.content.likes += 1;
                    irregularity.content.last_like_at = Some(now);
                } else {
                    irregularity.content.dislikes += 1;
                }
                tx.insert_vote(Vote {
                    user_id,
                    irregularity_id,
                    is_like,
                    created_at: now,
                })
                .await?
            }
        };

        tx.update_irregularity(&irregularity).await?;
        tx.commit().await?;
        Ok(vote)
    }
}

#[cfg(test)]
mod tests {
    use model::stop::Location;

    use super::*;
    use crate::test_support::MemoryDatabase;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_owned(),
            password_hash: "$argon2$fake".to_owned(),
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            email: format!("{username}@example.com"),
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let client = Client::new(MemoryDatabase::new());
        client.register_user(new_user("maria")).await.unwrap();

        let mut duplicate = new_user("maria");
        duplicate.email = "other@example.com".to_owned();
        assert!(matches!(
            client.register_user(duplicate).await,
            Err(RequestError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn starting_twice_updates_the_existing_session() {
        let db = MemoryDatabase::new();
        db.seed_route(1, "R1", &[]);
        db.seed_route(2, "R2", &[]);
        let client = Client::new(db);
        let user = client.register_user(new_user("maria")).await.unwrap();

        let first = client
            .start_session(user.id, Some(Id::new(1)))
            .await
            .unwrap();
        let second = client
            .start_session(user.id, Some(Id::new(2)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content.selected_route_id, Some(Id::new(2)));
    }

    #[tokio::test]
    async fn set_on_bus_requires_an_active_session() {
        let db = MemoryDatabase::new();
        db.seed_route(1, "R1", &[]);
        let client = Client::new(db);
        let user = client.register_user(new_user("maria")).await.unwrap();

        assert!(matches!(
            client.set_on_bus(user.id, Id::new(1), true).await,
            Err(RequestError::Precondition(_))
        ));

        client.start_session(user.id, None).await.unwrap();
        let session = client.set_on_bus(user.id, Id::new(1), true).await.unwrap();
        assert!(session.content.is_on_bus);
        assert_eq!(session.content.reported_route_id, Some(Id::new(1)));
    }

    #[tokio::test]
    async fn stopping_releases_the_bus_assignment() {
        let db = MemoryDatabase::new();
        db.seed_route(1, "R1", &[]);
        let bus_id = uuid::Uuid::from_u128(9);
        db.seed_bus(bus_id, 1, 10.4, -75.5, Utc::now());

        let client = Client::new(db.clone());
        let user = client.register_user(new_user("maria")).await.unwrap();
        client.start_session(user.id, None).await.unwrap();
        client.set_on_bus(user.id, Id::new(1), true).await.unwrap();

        // Simulate the engine having clustered the rider onto the bus.
        let mut session = client.active_session(user.id).await.unwrap().unwrap();
        session.content.assigned_bus_id = Some(Id::new(bus_id));
        db.auto().update_session(&session).await.unwrap();
        let mut bus = db.auto().bus(&Id::new(bus_id)).await.unwrap();
        bus.content.assign(user.id);
        db.auto().update_bus(&bus).await.unwrap();

        let stopped = client.stop_session(user.id).await.unwrap();
        assert!(stopped.content.assigned_bus_id.is_none());
        assert!(!stopped.content.is_on_bus);

        let bus = db.auto().bus(&Id::new(bus_id)).await.unwrap();
        assert!(bus.content.assigned_user_ids.is_empty());
        assert!(client.active_session(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn votes_toggle_and_never_duplicate() {
        let client = Client::new(MemoryDatabase::new());
        let user = client.register_user(new_user("maria")).await.unwrap();
        let irregularity = client
            .report_irregularity(
                "pothole".to_owned(),
                Some("near stop A".to_owned()),
                Location::new(10.4, -75.5),
            )
            .await
            .unwrap();

        client
            .vote_irregularity(user.id, irregularity.id, true)
            .await
            .unwrap();
        let state = client.irregularity(irregularity.id).await.unwrap();
        assert_eq!((state.content.likes, state.content.dislikes), (1, 0));
        assert!(state.content.last_like_at.is_some());

        // Same direction again: conflict, counters untouched.
        assert!(matches!(
            client
                .vote_irregularity(user.id, irregularity.id, true)
                .await,
            Err(RequestError::Conflict(_))
        ));
        let state = client.irregularity(irregularity.id).await.unwrap();
        assert_eq!((state.content.likes, state.content.dislikes), (1, 0));

        // Opposite direction: the one vote flips.
        client
            .vote_irregularity(user.id, irregularity.id, false)
            .await
            .unwrap();
        let state = client.irregularity(irregularity.id).await.unwrap();
        assert_eq!((state.content.likes, state.content.dislikes), (0, 1));
    }

    #[tokio::test]
    async fn second_voter_counts_independently() {
        let client = Client::new(MemoryDatabase::new());
        let maria = client.register_user(new_user("maria")).await.unwrap();
        let jorge = client.register_user(new_user("jorge")).await.unwrap();
        let irregularity = client
            .report_irregularity(
                "flooding".to_owned(),
                None,
                Location::new(10.4, -75.5),
            )
            .await
            .unwrap();

        client
            .vote_irregularity(maria.id, irregularity.id, true)
            .await
            .unwrap();
        client
            .vote_irregularity(jorge.id, irregularity.id, false)
            .await
            .unwrap();

        let state = client.irregularity(irregularity.id).await.unwrap();
        assert_eq!((state.content.likes, state.content.dislikes), (1, 1));
    }
}
