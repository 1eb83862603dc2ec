use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use model::{
    bus::VirtualBus,
    location::LocationSample,
    route::Route,
    session::TrackingSession,
    user::User,
    WithId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utility::{geo::point_to_polyline_distance_m, id::Id};
use uuid::Uuid;

use crate::database::{
    BusRepo, Database, DatabaseOperations, DatabaseTransaction, Result, SessionRepo,
};

/// Tunables of the clustering loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between ticks.
    pub tick: Duration,
    /// Riders farther than this from their route's polyline are left
    /// unassigned for the tick.
    pub max_route_distance_m: f64,
    /// Radius for joining a rider to an existing bus. Retention of an
    /// existing assignment uses twice this value.
    pub cluster_radius_m: f64,
    /// Idle time after which an unclaimed bus is reaped.
    pub max_bus_idle: TimeDelta,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            max_route_distance_m: 50.0,
            cluster_radius_m: 50.0,
            max_bus_idle: TimeDelta::minutes(5),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    pub riders: usize,
    pub assigned: usize,
    pub created: usize,
    pub reaped: usize,
}

impl TickStats {
    fn did_work(&self) -> bool {
        self.riders > 0 || self.reaped > 0
    }
}

/// Enqueues location updates into the engine. Cheap to clone; one handle is
/// shared per ingestion stream.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::UnboundedSender<LocationSample>,
}

impl EngineHandle {
    /// Non-blocking enqueue. Samples sent while the engine is not running
    /// are dropped; they remain in the rider's location history.
    pub fn enqueue(&self, sample: LocationSample) {
        if self.sender.send(sample).is_err() {
            log::warn!("clustering engine not running, dropping location update");
        }
    }
}

/// The virtual-bus clustering engine: a single cooperative task that drains
/// queued rider locations every tick, maintains bus clusters and reaps idle
/// buses. Process-wide with an explicit start/stop lifecycle.
pub struct ClusteringEngine {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    handle: EngineHandle,
}

impl ClusteringEngine {
    /// Spawns the engine task. The engine opens a fresh transaction per tick
    /// against `database` and never shares request-scoped state.
    pub fn start<D: Database>(database: D, config: EngineConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            database,
            receiver,
            config,
            cancel.clone(),
        ));
        log::info!("clustering engine started");
        Self {
            cancel,
            task,
            handle: EngineHandle { sender },
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Signals the loop to stop and waits for the in-flight tick to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        log::info!("clustering engine stopped");
    }
}

async fn run_loop<D: Database>(
    database: D,
    mut queue: mpsc::UnboundedReceiver<LocationSample>,
    config: EngineConfig,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.tick);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let samples = drain_latest(&mut queue);
        // Failures roll the tick back and must not stop the loop.
        match run_tick(&database, samples, &config).await {
            Ok(stats) if stats.did_work() => log::debug!(
                "tick: {} riders, {} assigned, {} buses created, {} reaped",
                stats.riders,
                stats.assigned,
                stats.created,
                stats.reaped
            ),
            Ok(_) => {}
            Err(why) => log::error!("clustering tick failed: {:?}", why),
        }
    }
}

/// Empties the queue, keeping only the most recent sample per rider. The
/// channel preserves send order, so the last sample seen is the rider's
/// latest. The map iterates in ascending rider-id order.
fn drain_latest(
    queue: &mut mpsc::UnboundedReceiver<LocationSample>,
) -> BTreeMap<Id<User>, LocationSample> {
    let mut latest = BTreeMap::new();
    while let Ok(sample) = queue.try_recv() {
        latest.insert(sample.user_id, sample);
    }
    latest
}

async fn run_tick<D: Database>(
    database: &D,
    samples: BTreeMap<Id<User>, LocationSample>,
    config: &EngineConfig,
) -> Result<TickStats> {
    let mut tx = database.transaction().await?;
    match process_tick(&mut tx, samples, config, Utc::now()).await {
        Ok(stats) => {
            tx.commit().await?;
            Ok(stats)
        }
        Err(why) => {
            if let Err(rollback_error) = tx.rollback().await {
                log::warn!("tick rollback failed: {:?}", rollback_error);
            }
            Err(why)
        }
    }
}

/// One tick: cluster every rider that reported a location, then reap idle
/// buses. Riders are processed in ascending id order for determinism.
async fn process_tick<O>(
    ops: &mut O,
    samples: BTreeMap<Id<User>, LocationSample>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<TickStats>
where
    O: DatabaseOperations + Send,
{
    let mut stats = TickStats::default();

    if !samples.is_empty() {
        let user_ids: Vec<Id<User>> = samples.keys().copied().collect();
        let mut sessions = ops.active_sessions_for(&user_ids).await?;
        let polylines = load_route_polylines(ops).await?;

        for (user_id, sample) in &samples {
            let Some(session) = sessions.get_mut(user_id) else {
                log::debug!("rider {user_id} has no active session, skipping");
                continue;
            };
            if !session.content.is_on_bus {
                log::debug!("rider {user_id} is not on a bus, skipping");
                continue;
            }
            stats.riders += 1;
            cluster_rider(ops, session, sample, &polylines, config, now, &mut stats)
                .await?;
        }
    }

    stats.reaped = reap_idle_buses(ops, config, now).await?;
    Ok(stats)
}

/// Polylines of every route, keyed by route id. Routes with fewer than two
/// stops yield short polylines which are rejected at use site.
async fn load_route_polylines<O>(
    ops: &mut O,
) -> Result<HashMap<Id<Route>, Vec<(f64, f64)>>>
where
    O: DatabaseOperations + Send,
{
    let routes = ops.routes_with_stops().await?;
    Ok(routes
        .into_iter()
        .map(|route| (route.route.id, route.polyline()))
        .collect())
}

async fn cluster_rider<O>(
    ops: &mut O,
    session: &mut WithId<TrackingSession>,
    sample: &LocationSample,
    polylines: &HashMap<Id<Route>, Vec<(f64, f64)>>,
    config: &EngineConfig,
    now: DateTime<Utc>,
    stats: &mut TickStats,
) -> Result<()>
where
    O: DatabaseOperations + Send,
{
    let user_id = sample.user_id;

    // The on-bus declaration names the route the rider claims to ride.
    let Some(route_id) = session.content.reported_route_id else {
        log::debug!("rider {user_id} is on a bus without a reported route, skipping");
        return Ok(());
    };

    let Some(polyline) = polylines.get(&route_id) else {
        log::warn!("route {route_id} reported by rider {user_id} does not exist");
        return Ok(());
    };
    let Some(route_distance_m) = point_to_polyline_distance_m(
        (sample.location.latitude, sample.location.longitude),
        polyline,
    ) else {
        log::warn!("route {route_id} has fewer than two located stops, skipping rider {user_id}");
        return Ok(());
    };

    if route_distance_m > config.max_route_distance_m {
        log::debug!(
            "rider {user_id} is {route_distance_m:.1} m from route {route_id}, leaving unassigned"
        );
        return Ok(());
    }

    // Stickiness: keep the current assignment while the rider stays within
    // the relaxed retention radius of their bus.
    if let Some(assigned_id) = session.content.assigned_bus_id {
        let assigned = match ops.bus(&assigned_id).await {
            Ok(bus) => Some(bus),
            Err(crate::database::DatabaseError::NotFound) => None,
            Err(why) => return Err(why),
        };
        match assigned {
            Some(mut bus)
                if bus.content.is_active()
                    && bus.content.route_id == route_id =>
            {
                let distance = sample.location.distance_m(&bus.content.location);
                if distance <= 2.0 * config.cluster_radius_m {
                    bus.content.assign(user_id);
                    move_bus_to(&mut bus, sample, now);
                    ops.update_bus(&bus).await?;
                    stats.assigned += 1;
                    return Ok(());
                }
                // Too far from the assigned bus: release it and look for a
                // better cluster below.
                bus.content.unassign(&user_id);
                ops.update_bus(&bus).await?;
                session.content.clear_bus_assignment();
                ops.update_session(session).await?;
            }
            _ => {
                // Assigned bus vanished, went inactive or switched route.
                session.content.clear_bus_assignment();
                ops.update_session(session).await?;
            }
        }
    }

    // Nearest active bus on the same route within the cluster radius; ties
    // go to the smaller uuid.
    let candidates = ops.active_buses(Some(route_id)).await?;
    let mut nearest: Option<(WithId<VirtualBus>, f64)> = None;
    for bus in candidates {
        let distance = sample.location.distance_m(&bus.content.location);
        if distance > config.cluster_radius_m {
            continue;
        }
        let closer = match &nearest {
            None => true,
            Some((best, best_distance)) => {
                distance < *best_distance
                    || (distance == *best_distance && bus.id < best.id)
            }
        };
        if closer {
            nearest = Some((bus, distance));
        }
    }

    if let Some((mut bus, _)) = nearest {
        bus.content.assign(user_id);
        move_bus_to(&mut bus, sample, now);
        ops.update_bus(&bus).await?;
        session.content.assigned_bus_id = Some(bus.id);
        ops.update_session(session).await?;
        stats.assigned += 1;
        log::debug!("rider {user_id} joined bus {} on route {route_id}", bus.id);
        return Ok(());
    }

    // No cluster nearby: this rider seeds a new virtual bus.
    let mut bus = WithId::new(
        Id::new(Uuid::new_v4()),
        VirtualBus::new(route_id, sample.location, now),
    );
    bus.content.assign(user_id);
    bus.content.current_speed = sample.speed;
    bus.content.current_heading = sample.heading;
    ops.insert_bus(&bus).await?;
    session.content.assigned_bus_id = Some(bus.id);
    ops.update_session(session).await?;
    stats.created += 1;
    log::debug!("rider {user_id} created bus {} on route {route_id}", bus.id);
    Ok(())
}

/// Moves a bus to the rider's position and stamps the update.
fn move_bus_to(bus: &mut WithId<VirtualBus>, sample: &LocationSample, now: DateTime<Utc>) {
    bus.content.location = sample.location;
    bus.content.current_speed = sample.speed;
    bus.content.current_heading = sample.heading;
    bus.content.last_update = now;
}

/// Deactivates active buses that have been idle past the threshold and are
/// not claimed by any active on-bus session, then clears sessions that
/// still point at an inactive bus. Idempotent.
async fn reap_idle_buses<O>(
    ops: &mut O,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<usize>
where
    O: DatabaseOperations + Send,
{
    let threshold = now - config.max_bus_idle;
    let mut reaped = 0;

    for mut bus in ops.active_buses(None).await? {
        if bus.content.last_update >= threshold {
            continue;
        }
        let claims = ops.sessions_claiming_bus(&bus.id).await?;
        if claims.is_empty() {
            bus.content.deactivate();
            ops.update_bus(&bus).await?;
            reaped += 1;
            log::info!("bus {} reaped after idling", bus.id);
        }
    }

    for mut session in ops.sessions_with_inactive_bus().await? {
        session.content.assigned_bus_id = None;
        session.content.is_on_bus = false;
        ops.update_session(&session).await?;
        log::info!(
            "rider {} released from an inactive bus",
            session.content.user_id
        );
    }

    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use model::stop::Location;

    use super::*;
    use crate::test_support::MemoryDatabase;

    fn sample(user_id: i32, latitude: f64, longitude: f64) -> LocationSample {
        LocationSample {
            user_id: Id::new(user_id),
            location: Location::new(latitude, longitude),
            speed: Some(8.0),
            heading: Some(90.0),
            timestamp: Utc::now(),
        }
    }

    fn samples(entries: &[LocationSample]) -> BTreeMap<Id<User>, LocationSample> {
        entries
            .iter()
            .map(|entry| (entry.user_id, entry.clone()))
            .collect()
    }

    /// Stops along the meridian -75.5097 so rider coordinates on that
    /// longitude sit exactly on the polyline.
    fn seed_corridor(db: &MemoryDatabase) {
        db.seed_stop(10, "A", 10.40, -75.5097);
        db.seed_stop(11, "B", 10.42, -75.5097);
        db.seed_route(1, "R1", &[10, 11]);
    }

    #[tokio::test]
    async fn first_rider_creates_a_bus() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let mut ops = db.auto();
        let stats = process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &EngineConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(stats.created, 1);
        let buses = db.auto().active_buses(None).await.unwrap();
        assert_eq!(buses.len(), 1);
        let bus = &buses[0];
        assert_eq!(bus.content.route_id, Id::new(1));
        assert_eq!(bus.content.assigned_user_ids, vec![Id::new(7)]);
        assert_eq!(bus.content.location, Location::new(10.4071, -75.5097));

        let session = db
            .auto()
            .active_session(Id::new(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.content.assigned_bus_id, Some(bus.id));
    }

    #[tokio::test]
    async fn nearby_rider_joins_the_existing_bus() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_user(8, "jorge");
        db.seed_on_bus_session(7, 1);
        db.seed_on_bus_session(8, 1);

        let config = EngineConfig::default();
        let mut ops = db.auto();
        process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &config,
            Utc::now(),
        )
        .await
        .unwrap();

        // ~11 m north of the bus.
        let stats = process_tick(
            &mut ops,
            samples(&[sample(8, 10.4072, -75.5097)]),
            &config,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(stats.created, 0);
        assert_eq!(stats.assigned, 1);
        let buses = db.auto().active_buses(None).await.unwrap();
        assert_eq!(buses.len(), 1);
        assert_eq!(
            buses[0].content.assigned_user_ids,
            vec![Id::new(7), Id::new(8)]
        );
    }

    #[tokio::test]
    async fn rider_sticks_to_their_bus_within_the_relaxed_radius() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let config = EngineConfig::default();
        let mut ops = db.auto();
        process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &config,
            Utc::now(),
        )
        .await
        .unwrap();
        let original = db.auto().active_buses(None).await.unwrap()[0].id;

        // ~78 m further along the route: outside the join radius but inside
        // the 2x retention radius.
        let stats = process_tick(
            &mut ops,
            samples(&[sample(7, 10.4078, -75.5097)]),
            &config,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(stats.created, 0);
        assert_eq!(stats.assigned, 1);
        let buses = db.auto().active_buses(None).await.unwrap();
        assert_eq!(buses.len(), 1);
        assert_eq!(buses[0].id, original);
        assert_eq!(
            buses[0].content.location,
            Location::new(10.4078, -75.5097)
        );
    }

    #[tokio::test]
    async fn rider_far_from_their_bus_seeds_a_new_one() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let config = EngineConfig::default();
        let mut ops = db.auto();
        process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &config,
            Utc::now(),
        )
        .await
        .unwrap();
        let original = db.auto().active_buses(None).await.unwrap()[0].id;

        // ~220 m along the route: outside the retention radius.
        let stats = process_tick(
            &mut ops,
            samples(&[sample(7, 10.4091, -75.5097)]),
            &config,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(stats.created, 1);
        let buses = db.auto().active_buses(None).await.unwrap();
        assert_eq!(buses.len(), 2);

        let session = db
            .auto()
            .active_session(Id::new(7))
            .await
            .unwrap()
            .unwrap();
        let new_bus = session.content.assigned_bus_id.unwrap();
        assert_ne!(new_bus, original);

        // The abandoned bus no longer lists the rider.
        let old = db.auto().bus(&original).await.unwrap();
        assert!(old.content.assigned_user_ids.is_empty());
    }

    #[tokio::test]
    async fn rider_off_route_is_left_unassigned() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        // ~550 m east of the corridor.
        let mut ops = db.auto();
        let stats = process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5047)]),
            &EngineConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(stats.created, 0);
        assert_eq!(stats.assigned, 0);
        assert!(db.auto().active_buses(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn equidistant_buses_tie_break_on_smaller_uuid() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let now = Utc::now();
        let small = Uuid::from_u128(1);
        let large = Uuid::from_u128(u128::MAX);
        // Both buses sit exactly at the rider's position.
        db.seed_bus(large, 1, 10.4071, -75.5097, now);
        db.seed_bus(small, 1, 10.4071, -75.5097, now);

        let mut ops = db.auto();
        process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &EngineConfig::default(),
            now,
        )
        .await
        .unwrap();

        let session = db
            .auto()
            .active_session(Id::new(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.content.assigned_bus_id, Some(Id::new(small)));
    }

    #[tokio::test]
    async fn idle_bus_with_live_session_survives_reaping() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let config = EngineConfig::default();
        let start = Utc::now();
        let mut ops = db.auto();
        process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &config,
            start,
        )
        .await
        .unwrap();

        // Six minutes later, no samples, but the session still claims the bus.
        let later = start + TimeDelta::minutes(6);
        let stats = process_tick(&mut ops, BTreeMap::new(), &config, later)
            .await
            .unwrap();

        assert_eq!(stats.reaped, 0);
        assert_eq!(db.auto().active_buses(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idle_unclaimed_bus_is_reaped_and_sessions_cleared() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let config = EngineConfig::default();
        let start = Utc::now();
        let mut ops = db.auto();
        process_tick(
            &mut ops,
            samples(&[sample(7, 10.4071, -75.5097)]),
            &config,
            start,
        )
        .await
        .unwrap();

        // The rider's session ends; nothing claims the bus anymore.
        let mut session = db
            .auto()
            .active_session(Id::new(7))
            .await
            .unwrap()
            .unwrap();
        session.content.end(start);
        db.auto().update_session(&session).await.unwrap();

        let later = start + TimeDelta::minutes(6);
        let stats = process_tick(&mut ops, BTreeMap::new(), &config, later)
            .await
            .unwrap();

        assert_eq!(stats.reaped, 1);
        assert!(db.auto().active_buses(None).await.unwrap().is_empty());

        // Running the reaper again with no new samples changes nothing.
        let again = process_tick(&mut ops, BTreeMap::new(), &config, later)
            .await
            .unwrap();
        assert_eq!(again.reaped, 0);
        assert!(db.auto().active_buses(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_pointing_at_inactive_bus_is_released() {
        let db = MemoryDatabase::new();
        seed_corridor(&db);
        db.seed_user(7, "maria");
        db.seed_on_bus_session(7, 1);

        let now = Utc::now();
        let bus_id = Uuid::from_u128(42);
        db.seed_bus(bus_id, 1, 10.4071, -75.5097, now);

        let mut session = db
            .auto()
            .active_session(Id::new(7))
            .await
            .unwrap()
            .unwrap();
        session.content.assigned_bus_id = Some(Id::new(bus_id));
        db.auto().update_session(&session).await.unwrap();

        // The bus goes inactive out-of-band.
        let mut bus = db.auto().bus(&Id::new(bus_id)).await.unwrap();
        bus.content.deactivate();
        db.auto().update_bus(&bus).await.unwrap();

        let mut ops = db.auto();
        process_tick(&mut ops, BTreeMap::new(), &EngineConfig::default(), now)
            .await
            .unwrap();

        let session = db
            .auto()
            .active_session(Id::new(7))
            .await
            .unwrap()
            .unwrap();
        assert!(session.content.assigned_bus_id.is_none());
        assert!(!session.content.is_on_bus);
    }

    #[tokio::test]
    async fn drain_keeps_only_the_latest_sample_per_rider() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        sender.send(sample(9, 1.0, 1.0)).unwrap();
        sender.send(sample(7, 2.0, 2.0)).unwrap();
        sender.send(sample(9, 3.0, 3.0)).unwrap();

        let drained = drain_latest(&mut receiver);
        assert_eq!(drained.len(), 2);

        let order: Vec<Id<User>> = drained.keys().copied().collect();
        assert_eq!(order, vec![Id::new(7), Id::new(9)]);
        assert_eq!(
            drained.get(&Id::new(9)).unwrap().location,
            Location::new(3.0, 3.0)
        );
    }
}
