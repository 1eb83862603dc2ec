use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
};

use model::stop::Location;

use crate::database::{DatabaseError, DatabaseOperations};

pub mod graph;

use graph::TransitGraph;

/// Tunables of the trip search. The defaults reflect the network's observed
/// average bus speed and a flat transfer cost.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub bus_speed_kph: f64,
    pub walking_speed_kph: f64,
    pub transfer_penalty_seconds: f64,
    /// Maximum walking distance between a free coordinate and a stop.
    pub max_stop_distance_m: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            bus_speed_kph: 20.0,
            walking_speed_kph: 5.0,
            transfer_penalty_seconds: 900.0,
            max_stop_distance_m: 300.0,
        }
    }
}

impl PlannerConfig {
    pub fn bus_speed_mps(&self) -> f64 {
        self.bus_speed_kph * 1000.0 / 3600.0
    }

    pub fn walking_speed_mps(&self) -> f64 {
        self.walking_speed_kph * 1000.0 / 3600.0
    }
}

#[derive(Debug)]
pub enum PlanError {
    /// Origin or destination has no stop within walking range.
    NoNearbyStop,
    /// Both endpoints resolved to stops, but no path connects them.
    NoPath,
    Database(DatabaseError),
}

impl From<DatabaseError> for PlanError {
    fn from(value: DatabaseError) -> Self {
        Self::Database(value)
    }
}

/// One stop of a planned trip, labeled with the route the trip rides
/// through it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStop {
    pub name: String,
    pub route_name: String,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct TripPlan {
    pub estimated_minutes: f64,
    pub origin_walk_m: f64,
    pub destination_walk_m: f64,
    /// Bus travel plus transfer penalties, excluding walking.
    pub travel_seconds: f64,
    pub stops: Vec<PlannedStop>,
}

/// Computes the shortest-time trip between two free coordinates.
///
/// Both endpoints are resolved to their nearest stop within walking range,
/// then a Dijkstra variant runs over the stop graph. Changing routes while
/// relaxing an edge adds the flat transfer penalty; the first boarding is
/// free. Keying distances by stop id alone stays optimal because the penalty
/// is a non-negative augmentation applied on relaxation.
pub async fn plan_trip<O>(
    ops: &mut O,
    origin: Location,
    destination: Location,
    config: &PlannerConfig,
) -> Result<TripPlan, PlanError>
where
    O: DatabaseOperations + Send,
{
    let (origin_stop, origin_walk_m) = ops
        .nearest_stop(&origin, config.max_stop_distance_m)
        .await?
        .ok_or(PlanError::NoNearbyStop)?;
    let (destination_stop, destination_walk_m) = ops
        .nearest_stop(&destination, config.max_stop_distance_m)
        .await?
        .ok_or(PlanError::NoNearbyStop)?;

    let routes = ops.routes_with_stops().await?;
    let graph = TransitGraph::build(&routes, config.bus_speed_mps());

    let start = origin_stop.id.raw();
    let end = destination_stop.id.raw();
    if !graph.contains(start) || !graph.contains(end) {
        return Err(PlanError::NoPath);
    }

    let (travel_seconds, segments) =
        shortest_path(&graph, start, end, config.transfer_penalty_seconds)
            .ok_or(PlanError::NoPath)?;

    // Lookup tables for naming the traversed stops.
    let mut route_names: HashMap<i32, &str> = HashMap::new();
    let mut stop_info: HashMap<i32, (&str, Location)> = HashMap::new();
    for route in &routes {
        route_names.insert(route.route.id.raw(), route.route.content.name.as_str());
        for entry in &route.stops {
            stop_info.insert(
                entry.stop.id.raw(),
                (
                    entry.stop.content.name.as_str(),
                    entry.stop.content.location,
                ),
            );
        }
    }

    let mut stops = Vec::new();
    if let Some(first) = segments.first() {
        push_stop(&mut stops, first.from, first.route_id, &stop_info, &route_names);
        for segment in &segments {
            push_stop(
                &mut stops,
                segment.to,
                segment.route_id,
                &stop_info,
                &route_names,
            );
        }
    }

    let walking_seconds =
        (origin_walk_m + destination_walk_m) / config.walking_speed_mps();
    let estimated_minutes = round2((travel_seconds + walking_seconds) / 60.0);

    Ok(TripPlan {
        estimated_minutes,
        origin_walk_m: round2(origin_walk_m),
        destination_walk_m: round2(destination_walk_m),
        travel_seconds,
        stops,
    })
}

/// Appends a stop to the output, skipping it when it shares the coordinate
/// of the previously appended stop.
fn push_stop(
    stops: &mut Vec<PlannedStop>,
    stop_id: i32,
    route_id: i32,
    stop_info: &HashMap<i32, (&str, Location)>,
    route_names: &HashMap<i32, &str>,
) {
    let Some((name, location)) = stop_info.get(&stop_id) else {
        return;
    };
    if let Some(last) = stops.last() {
        if last.location.latitude == location.latitude
            && last.location.longitude == location.longitude
        {
            return;
        }
    }
    stops.push(PlannedStop {
        name: (*name).to_owned(),
        route_name: route_names
            .get(&route_id)
            .map(|name| (*name).to_owned())
            .unwrap_or_default(),
        location: *location,
    });
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    from: i32,
    to: i32,
    route_id: i32,
}

#[derive(Debug)]
struct State {
    cost: f64,
    stop: i32,
    route: Option<i32>,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.stop.cmp(&other.stop))
            .then_with(|| self.route.cmp(&other.route))
    }
}

/// Dijkstra with a per-relaxation transfer penalty. Returns the total cost
/// and the traversed segments, or `None` when the destination is
/// unreachable.
fn shortest_path(
    graph: &TransitGraph,
    start: i32,
    end: i32,
    transfer_penalty_seconds: f64,
) -> Option<(f64, Vec<Segment>)> {
    let mut distances: HashMap<i32, f64> = HashMap::new();
    let mut predecessors: HashMap<i32, (i32, i32)> = HashMap::new();
    let mut queue = BinaryHeap::new();

    distances.insert(start, 0.0);
    queue.push(Reverse(State {
        cost: 0.0,
        stop: start,
        route: None,
    }));

    while let Some(Reverse(State { cost, stop, route })) = queue.pop() {
        if cost > *distances.get(&stop).unwrap_or(&f64::INFINITY) {
            continue;
        }
        if stop == end {
            break;
        }

        for edge in graph.edges(stop) {
            let mut next_cost = cost + edge.seconds;
            if matches!(route, Some(current) if current != edge.route_id) {
                next_cost += transfer_penalty_seconds;
            }
            if next_cost < *distances.get(&edge.to).unwrap_or(&f64::INFINITY) {
                distances.insert(edge.to, next_cost);
                predecessors.insert(edge.to, (stop, edge.route_id));
                queue.push(Reverse(State {
                    cost: next_cost,
                    stop: edge.to,
                    route: Some(edge.route_id),
                }));
            }
        }
    }

    let total = *distances.get(&end)?;

    let mut segments = Vec::new();
    let mut current = end;
    while current != start {
        let (previous, route_id) = *predecessors.get(&current)?;
        segments.push(Segment {
            from: previous,
            to: current,
            route_id,
        });
        current = previous;
    }
    segments.reverse();

    Some((total, segments))
}

#[cfg(test)]
mod tests {
    use model::stop::Location;

    use super::*;
    use crate::test_support::MemoryDatabase;

    // ~1 km of latitude in degrees.
    const KM_LAT: f64 = 1.0 / 111.195;

    #[tokio::test]
    async fn empty_stop_set_means_no_nearby_stop() {
        let db = MemoryDatabase::new();
        let mut ops = db.auto();
        let result = plan_trip(
            &mut ops,
            Location::new(0.0, 0.0),
            Location::new(0.0, 0.0),
            &PlannerConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(PlanError::NoNearbyStop)));
    }

    #[tokio::test]
    async fn direct_ride_between_two_stops() {
        let db = MemoryDatabase::new();
        db.seed_stop(10, "A", 10.40, -75.50);
        db.seed_stop(11, "B", 10.41, -75.51);
        db.seed_route(1, "R1", &[10, 11]);

        let config = PlannerConfig::default();
        let mut ops = db.auto();
        // A few metres from each stop.
        let plan = plan_trip(
            &mut ops,
            Location::new(10.40004, -75.50),
            Location::new(10.41004, -75.51),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(plan.stops.len(), 2);
        assert_eq!(plan.stops[0].name, "A");
        assert_eq!(plan.stops[0].route_name, "R1");
        assert_eq!(plan.stops[1].name, "B");

        // dist(A, B) / V_bus plus a short walk on both ends.
        let in_vehicle_minutes =
            Location::new(10.40, -75.50).distance_m(&Location::new(10.41, -75.51))
                / config.bus_speed_mps()
                / 60.0;
        assert!((plan.estimated_minutes - in_vehicle_minutes).abs() < 0.5);
        assert!(plan.origin_walk_m < 10.0);
        assert!(plan.destination_walk_m < 10.0);
    }

    #[tokio::test]
    async fn transfer_pays_the_flat_penalty_once() {
        let db = MemoryDatabase::new();
        db.seed_stop(10, "A", 0.0, 0.0);
        db.seed_stop(11, "B", KM_LAT, 0.0);
        db.seed_stop(12, "C", 2.0 * KM_LAT, 0.0);
        db.seed_stop(13, "D", 3.0 * KM_LAT, 0.0);
        db.seed_route(1, "R1", &[10, 11, 12]);
        db.seed_route(2, "R2", &[12, 13]);

        let config = PlannerConfig::default();
        let mut ops = db.auto();
        let plan = plan_trip(
            &mut ops,
            Location::new(0.0, 0.0),
            Location::new(3.0 * KM_LAT, 0.0),
            &config,
        )
        .await
        .unwrap();

        // 3 km at 20 km/h = 540 s, plus one 900 s transfer.
        assert!(
            (plan.travel_seconds - 1440.0).abs() < 2.0,
            "got {}",
            plan.travel_seconds
        );
        assert!((plan.estimated_minutes - 24.0).abs() < 0.1);

        let names: Vec<&str> =
            plan.stops.iter().map(|stop| stop.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
        assert_eq!(plan.stops[3].route_name, "R2");
    }

    #[tokio::test]
    async fn disconnected_stops_are_unreachable() {
        let db = MemoryDatabase::new();
        db.seed_stop(10, "A", 0.0, 0.0);
        db.seed_stop(11, "B", KM_LAT, 0.0);
        db.seed_stop(12, "C", 10.0, 10.0);
        db.seed_stop(13, "D", 10.0 + KM_LAT, 10.0);
        db.seed_route(1, "R1", &[10, 11]);
        db.seed_route(2, "R2", &[12, 13]);

        let mut ops = db.auto();
        let result = plan_trip(
            &mut ops,
            Location::new(0.0, 0.0),
            Location::new(10.0 + KM_LAT, 10.0),
            &PlannerConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(PlanError::NoPath)));
    }

    #[tokio::test]
    async fn removing_a_route_never_shortens_the_trip() {
        let db = MemoryDatabase::new();
        db.seed_stop(10, "A", 0.0, 0.0);
        db.seed_stop(11, "B", KM_LAT, 0.0);
        db.seed_stop(12, "C", 2.0 * KM_LAT, 0.0);
        db.seed_route(1, "R1", &[10, 11]);
        db.seed_route(2, "R2", &[11, 12]);
        // Express route covering the whole corridor without a transfer.
        db.seed_route(3, "R3", &[10, 12]);

        let config = PlannerConfig::default();
        let origin = Location::new(0.0, 0.0);
        let destination = Location::new(2.0 * KM_LAT, 0.0);

        let mut ops = db.auto();
        let with_express = plan_trip(&mut ops, origin, destination, &config)
            .await
            .unwrap();

        let reduced = MemoryDatabase::new();
        reduced.seed_stop(10, "A", 0.0, 0.0);
        reduced.seed_stop(11, "B", KM_LAT, 0.0);
        reduced.seed_stop(12, "C", 2.0 * KM_LAT, 0.0);
        reduced.seed_route(1, "R1", &[10, 11]);
        reduced.seed_route(2, "R2", &[11, 12]);

        let mut reduced_ops = reduced.auto();
        let without_express = plan_trip(&mut reduced_ops, origin, destination, &config)
            .await
            .unwrap();

        assert!(with_express.travel_seconds <= without_express.travel_seconds);
        // The express avoids the transfer entirely.
        assert!(without_express.travel_seconds - with_express.travel_seconds > 800.0);
    }

    #[tokio::test]
    async fn symmetric_network_gives_symmetric_travel_time() {
        let db = MemoryDatabase::new();
        db.seed_stop(10, "A", 0.0, 0.0);
        db.seed_stop(11, "B", KM_LAT, 0.0);
        db.seed_stop(12, "C", 2.0 * KM_LAT, 0.0);
        db.seed_route(1, "R1", &[10, 11, 12]);
        db.seed_route(2, "R1-back", &[12, 11, 10]);

        let config = PlannerConfig::default();
        let a = Location::new(0.0, 0.0);
        let c = Location::new(2.0 * KM_LAT, 0.0);

        let mut ops = db.auto();
        let forward = plan_trip(&mut ops, a, c, &config).await.unwrap();
        let mut ops = db.auto();
        let backward = plan_trip(&mut ops, c, a, &config).await.unwrap();

        assert!((forward.travel_seconds - backward.travel_seconds).abs() < 1e-6);
    }

    #[tokio::test]
    async fn consecutive_co_located_stops_are_deduplicated() {
        let db = MemoryDatabase::new();
        db.seed_stop(10, "A", 0.0, 0.0);
        db.seed_stop(11, "B platform 1", KM_LAT, 0.0);
        db.seed_stop(12, "B platform 2", KM_LAT, 0.0);
        db.seed_stop(13, "C", 2.0 * KM_LAT, 0.0);
        db.seed_route(1, "R1", &[10, 11, 12, 13]);

        let mut ops = db.auto();
        let plan = plan_trip(
            &mut ops,
            Location::new(0.0, 0.0),
            Location::new(2.0 * KM_LAT, 0.0),
            &PlannerConfig::default(),
        )
        .await
        .unwrap();

        let names: Vec<&str> =
            plan.stops.iter().map(|stop| stop.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B platform 1", "C"]);
    }

    #[tokio::test]
    async fn nearest_stop_ties_break_by_ascending_id() {
        let db = MemoryDatabase::new();
        // Two stops at the same coordinate; the lower id must win.
        db.seed_stop(21, "twin-b", 0.0, 0.0);
        db.seed_stop(20, "twin-a", 0.0, 0.0);
        db.seed_stop(22, "away", KM_LAT, 0.0);
        db.seed_route(1, "R1", &[20, 22]);
        db.seed_route(2, "R2", &[21, 22]);

        let mut ops = db.auto();
        let plan = plan_trip(
            &mut ops,
            Location::new(0.0, 0.0),
            Location::new(KM_LAT, 0.0),
            &PlannerConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(plan.stops[0].name, "twin-a");
    }
}
