use std::collections::HashMap;

use itertools::Itertools;
use model::route::RouteWithStops;

/// Cost assigned to zero-length segments. Keeps co-located consecutive
/// stops reachable without dividing by zero.
pub const MIN_SEGMENT_COST_SECONDS: f64 = 1.0;

/// One directed connection between consecutive stops of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub to: i32,
    pub route_id: i32,
    pub seconds: f64,
}

/// Directed weighted multigraph over stop ids. Parallel edges occur when
/// several routes share a stop pair; each keeps its own route id.
#[derive(Debug, Default)]
pub struct TransitGraph {
    adjacency: HashMap<i32, Vec<Edge>>,
}

impl TransitGraph {
    /// Materializes the graph from routes with resolved stop sequences.
    /// For each route, consecutive stops in ordinal order become an edge
    /// weighted with the geodesic travel time at `bus_speed_mps`. Every stop
    /// referenced by any route becomes a node, including terminals without
    /// outgoing edges.
    pub fn build(routes: &[RouteWithStops], bus_speed_mps: f64) -> Self {
        let mut adjacency: HashMap<i32, Vec<Edge>> = HashMap::new();

        for route in routes {
            for entry in &route.stops {
                adjacency.entry(entry.stop.id.raw()).or_default();
            }
            for (from, to) in route.stops.iter().tuple_windows() {
                let distance_m = from
                    .stop
                    .content
                    .location
                    .distance_m(&to.stop.content.location);
                let seconds = if distance_m > 0.0 && bus_speed_mps > 0.0 {
                    (distance_m / bus_speed_mps).max(MIN_SEGMENT_COST_SECONDS)
                } else {
                    MIN_SEGMENT_COST_SECONDS
                };
                adjacency
                    .entry(from.stop.id.raw())
                    .or_default()
                    .push(Edge {
                        to: to.stop.id.raw(),
                        route_id: route.route.id.raw(),
                        seconds,
                    });
            }
        }

        Self { adjacency }
    }

    pub fn contains(&self, stop_id: i32) -> bool {
        self.adjacency.contains_key(&stop_id)
    }

    pub fn edges(&self, stop_id: i32) -> &[Edge] {
        self.adjacency
            .get(&stop_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.adjacency.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use model::{
        route::{OrderedStop, Route},
        stop::{Location, Stop},
        WithId,
    };
    use utility::id::Id;

    use super::*;

    fn route_with_stops(
        route_id: i32,
        name: &str,
        stops: &[(i32, f64, f64)],
    ) -> RouteWithStops {
        RouteWithStops {
            route: WithId::new(
                Id::new(route_id),
                Route {
                    name: name.to_owned(),
                    description: None,
                },
            ),
            stops: stops
                .iter()
                .enumerate()
                .map(|(index, (stop_id, lat, lon))| OrderedStop {
                    ordinal: index as i32 + 1,
                    stop: WithId::new(
                        Id::new(*stop_id),
                        Stop {
                            name: format!("stop-{stop_id}"),
                            location: Location::new(*lat, *lon),
                        },
                    ),
                })
                .collect(),
        }
    }

    #[test]
    fn emits_one_edge_per_consecutive_pair() {
        let routes = vec![route_with_stops(
            1,
            "R1",
            &[(10, 0.0, 0.0), (11, 0.009, 0.0), (12, 0.018, 0.0)],
        )];
        let graph = TransitGraph::build(&routes, 10.0);

        assert_eq!(graph.edges(10).len(), 1);
        assert_eq!(graph.edges(11).len(), 1);
        assert_eq!(graph.edges(12).len(), 0);
        assert_eq!(graph.node_count(), 3);

        // ~1001 m at 10 m/s.
        let edge = &graph.edges(10)[0];
        assert_eq!(edge.to, 11);
        assert_eq!(edge.route_id, 1);
        assert!((edge.seconds - 100.0).abs() < 1.0, "got {}", edge.seconds);
    }

    #[test]
    fn terminal_stops_are_nodes() {
        let routes = vec![route_with_stops(1, "R1", &[(10, 0.0, 0.0), (11, 0.01, 0.0)])];
        let graph = TransitGraph::build(&routes, 10.0);
        assert!(graph.contains(11));
        assert!(graph.edges(11).is_empty());
    }

    #[test]
    fn zero_length_segments_get_floor_cost() {
        let routes = vec![route_with_stops(
            1,
            "R1",
            &[(10, 0.0, 0.0), (11, 0.0, 0.0)],
        )];
        let graph = TransitGraph::build(&routes, 10.0);
        assert_eq!(graph.edges(10)[0].seconds, MIN_SEGMENT_COST_SECONDS);
    }

    #[test]
    fn parallel_routes_keep_separate_edges() {
        let routes = vec![
            route_with_stops(1, "R1", &[(10, 0.0, 0.0), (11, 0.01, 0.0)]),
            route_with_stops(2, "R2", &[(10, 0.0, 0.0), (11, 0.01, 0.0)]),
        ];
        let graph = TransitGraph::build(&routes, 10.0);
        let routes_on_edge: Vec<i32> =
            graph.edges(10).iter().map(|edge| edge.route_id).collect();
        assert_eq!(routes_on_edge, vec![1, 2]);
    }
}
