//! Well-Known-Text synthesis for OSM way geometries.
//!
//! Coordinates are WGS84 with `x = longitude` and `y = latitude`; WKT output
//! therefore lists each pair as `lon lat`.

use geo::Coord;
use thiserror::Error;

/// Smallest ring (including the repeated closing point) rendered as a polygon.
pub const MIN_RING_POINTS: usize = 4;

/// Errors returned by [`build_wkt`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// No coordinates were supplied.
    #[error("cannot build a geometry from an empty coordinate list")]
    Empty,
}

/// Render an ordered coordinate list as WKT.
///
/// - one point renders as `POINT(lon lat)`;
/// - a closed ring of at least [`MIN_RING_POINTS`] points renders as
///   `POLYGON((...))` using the ring exactly as given;
/// - anything else, including short closed sequences, renders as
///   `LINESTRING(...)`.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use tabula_core::build_wkt;
///
/// let ring = [
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 1.0, y: 0.0 },
///     Coord { x: 1.0, y: 1.0 },
///     Coord { x: 0.0, y: 0.0 },
/// ];
/// assert_eq!(build_wkt(&ring).as_deref(), Ok("POLYGON((0 0, 1 0, 1 1, 0 0))"));
/// ```
pub fn build_wkt(points: &[Coord<f64>]) -> Result<String, GeometryError> {
    match points {
        [] => Err(GeometryError::Empty),
        [only] => Ok(format!("POINT({} {})", only.x, only.y)),
        [first, .., last] if points.len() >= MIN_RING_POINTS && first == last => {
            Ok(format!("POLYGON(({}))", join_pairs(points)))
        }
        _ => Ok(format!("LINESTRING({})", join_pairs(points))),
    }
}

fn join_pairs(points: &[Coord<f64>]) -> String {
    points
        .iter()
        .map(|point| format!("{} {}", point.x, point.y))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn coord(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[rstest]
    fn empty_input_is_rejected() {
        assert_eq!(build_wkt(&[]), Err(GeometryError::Empty));
    }

    #[rstest]
    fn single_point_uses_lon_lat_order() {
        let wkt = build_wkt(&[coord(13.4, 52.5)]).expect("point geometry");
        assert_eq!(wkt, "POINT(13.4 52.5)");
    }

    #[rstest]
    fn open_sequence_becomes_linestring() {
        let wkt = build_wkt(&[coord(0.0, 0.0), coord(1.5, 2.25), coord(-3.0, 4.0)])
            .expect("linestring geometry");
        assert_eq!(wkt, "LINESTRING(0 0, 1.5 2.25, -3 4)");
    }

    #[rstest]
    #[case::two_points(vec![coord(1.0, 1.0), coord(1.0, 1.0)])]
    #[case::three_points(vec![coord(1.0, 1.0), coord(2.0, 2.0), coord(1.0, 1.0)])]
    fn short_closed_sequence_stays_linestring(#[case] points: Vec<Coord<f64>>) {
        let wkt = build_wkt(&points).expect("degenerate ring");
        assert!(wkt.starts_with("LINESTRING("), "unexpected geometry {wkt}");
    }

    #[rstest]
    fn closed_ring_is_not_reclosed() {
        let ring = [
            coord(0.0, 0.0),
            coord(1.0, 0.0),
            coord(1.0, 1.0),
            coord(0.0, 1.0),
            coord(0.0, 0.0),
        ];
        let wkt = build_wkt(&ring).expect("polygon geometry");
        assert_eq!(wkt, "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))");
        assert_eq!(wkt.matches(", ").count() + 1, ring.len());
    }

    #[rstest]
    fn output_is_stable_across_calls() {
        let points = [coord(7.123456789, 50.1), coord(7.2, 50.2)];
        let first = build_wkt(&points);
        let second = build_wkt(&points);
        assert_eq!(first, second);
    }
}
