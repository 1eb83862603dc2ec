pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Great-circle distance in metres between two WGS84 coordinates.
pub fn haversine_distance_m(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lon1_rad = to_radians(longitude_1);
    let lat2_rad = to_radians(latitude_2);
    let lon2_rad = to_radians(longitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Degree-space bounding box containing the circle of `radius_m` metres
/// around a center. Used to prefilter radius queries before an exact
/// distance check.
pub fn calculate_bounding_box(
    lat: f64,
    lon: f64,
    radius_m: f64,
) -> ((f64, f64), (f64, f64)) {
    let lat_rad = to_radians(lat);
    let lon_rad = to_radians(lon);

    // Latitude bounds
    let min_lat = lat_rad - radius_m / EARTH_RADIUS_M;
    let max_lat = lat_rad + radius_m / EARTH_RADIUS_M;

    // Longitude bounds (adjusted by latitude)
    let min_lon = lon_rad - radius_m / (EARTH_RADIUS_M * lat_rad.cos());
    let max_lon = lon_rad + radius_m / (EARTH_RADIUS_M * lat_rad.cos());

    (
        (to_degrees(min_lat), to_degrees(min_lon)),
        (to_degrees(max_lat), to_degrees(max_lon)),
    )
}

/// Distance in metres from a point to the segment between two coordinates.
///
/// Coordinates are projected onto a local tangent plane centered on the
/// query point before the planar point-segment computation, which keeps the
/// result metric at metropolitan scales.
pub fn point_to_segment_distance_m(
    point: (f64, f64),
    start: (f64, f64),
    end: (f64, f64),
) -> f64 {
    let (px, py) = project_local_m(point, point);
    let (ax, ay) = project_local_m(start, point);
    let (bx, by) = project_local_m(end, point);

    let (dx, dy) = (bx - ax, by - ay);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
    }

    let t = (((px - ax) * dx + (py - ay) * dy) / length_sq).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Minimum distance in metres from a point to a piecewise-linear path given
/// as (latitude, longitude) vertices. `None` if the path has fewer than two
/// vertices.
pub fn point_to_polyline_distance_m(
    point: (f64, f64),
    polyline: &[(f64, f64)],
) -> Option<f64> {
    if polyline.len() < 2 {
        return None;
    }
    polyline
        .windows(2)
        .map(|pair| point_to_segment_distance_m(point, pair[0], pair[1]))
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Equirectangular projection of `(lat, lon)` to metres relative to `origin`.
fn project_local_m(coordinate: (f64, f64), origin: (f64, f64)) -> (f64, f64) {
    let lat_scale = EARTH_RADIUS_M;
    let lon_scale = EARTH_RADIUS_M * to_radians(origin.0).cos();
    (
        to_radians(coordinate.1 - origin.1) * lon_scale,
        to_radians(coordinate.0 - origin.0) * lat_scale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_distance_at_city_scale() {
        // Two stops roughly 1.56 km apart.
        let distance = haversine_distance_m(10.40, -75.50, 10.41, -75.51);
        assert!(
            (1500.0..1650.0).contains(&distance),
            "unexpected distance: {distance}"
        );
    }

    #[test]
    fn haversine_distance_is_zero_for_identical_points() {
        assert_eq!(haversine_distance_m(10.4, -75.5, 10.4, -75.5), 0.0);
    }

    #[test]
    fn bounding_box_contains_circle() {
        let radius = 300.0;
        let ((min_lat, min_lon), (max_lat, max_lon)) =
            calculate_bounding_box(10.4, -75.5, radius);
        assert!(min_lat < 10.4 && 10.4 < max_lat);
        assert!(min_lon < -75.5 && -75.5 < max_lon);
        // Corners of the box are at least the radius away from the center.
        let corner = haversine_distance_m(10.4, -75.5, max_lat, max_lon);
        assert!(corner >= radius);
    }

    #[test]
    fn segment_distance_falls_back_to_endpoint_for_degenerate_segment() {
        let distance =
            point_to_segment_distance_m((0.0, 0.001), (0.0, 0.0), (0.0, 0.0));
        assert!((distance - 111.3).abs() < 1.0, "got {distance}");
    }

    #[test]
    fn polyline_distance_takes_minimum_over_segments() {
        // North-south line through the origin; point slightly east of it.
        let line = [(-0.01, 0.0), (0.0, 0.0), (0.01, 0.0)];
        let distance =
            point_to_polyline_distance_m((0.0, 0.001), &line).unwrap();
        assert!((distance - 111.3).abs() < 1.0, "got {distance}");

        // Far beyond the last vertex the nearest point is the endpoint.
        let beyond = point_to_polyline_distance_m((0.02, 0.0), &line).unwrap();
        let endpoint = haversine_distance_m(0.02, 0.0, 0.01, 0.0);
        assert!((beyond - endpoint).abs() < 2.0);
    }

    #[test]
    fn polyline_distance_requires_two_vertices() {
        assert!(point_to_polyline_distance_m((0.0, 0.0), &[(1.0, 1.0)]).is_none());
        assert!(point_to_polyline_distance_m((0.0, 0.0), &[]).is_none());
    }
}
