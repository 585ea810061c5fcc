//! Stop ordering and nearest-stop lookup along a route.

use bustrack_env::{Coordinates, Stop, StopId};

use crate::geo_math::distance_km;

/// Returns the stops sorted by sequence.
///
/// The sort is stable, so stops sharing a sequence number keep the order the
/// directory returned them in.
pub fn ordered(stops: &[Stop]) -> Vec<&Stop> {
    let mut sorted: Vec<&Stop> = stops.iter().collect();
    sorted.sort_by_key(|s| s.sequence);
    sorted
}

/// Returns the geocoded stop closest to `point`.
///
/// Stops without coordinates are skipped. On ties the first stop in input
/// order wins.
pub fn nearest_stop<'a>(point: &Coordinates, stops: &'a [Stop]) -> Option<&'a Stop> {
    let mut best: Option<(&Stop, f64)> = None;

    for stop in stops {
        let Some(location) = stop.location.as_ref() else {
            continue;
        };
        let d = distance_km(point, location);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((stop, d)),
        }
    }

    best.map(|(stop, _)| stop)
}

/// Returns the stop following `current` in sequence order.
///
/// `None` if `current` is the last stop or is not on the route.
pub fn next_stop<'a>(current: StopId, stops: &'a [Stop]) -> Option<&'a Stop> {
    let sorted = ordered(stops);
    let idx = sorted.iter().position(|s| s.id == current)?;
    sorted.get(idx + 1).copied()
}

/// Geocoded stops in sequence order.
pub(crate) fn located(stops: &[Stop]) -> Vec<(&Stop, Coordinates)> {
    ordered(stops)
        .into_iter()
        .filter_map(|s| s.location.map(|loc| (s, loc)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Vec<Stop> {
        vec![
            Stop::new(1, "A", 1, 13.00, 80.00),
            Stop::new(2, "B", 2, 13.05, 80.00),
            Stop::new(3, "C", 3, 13.10, 80.00),
        ]
    }

    #[test]
    fn test_nearest_stop() {
        let stops = route();
        let nearest = nearest_stop(&Coordinates::new(13.051, 80.001), &stops).unwrap();
        assert_eq!(nearest.name, "B");
    }

    #[test]
    fn test_nearest_stop_first_wins_on_tie() {
        let stops = vec![
            Stop::new(1, "Platform 1", 1, 13.01, 80.0),
            Stop::new(2, "Platform 2", 2, 13.01, 80.0),
        ];
        let nearest = nearest_stop(&Coordinates::new(13.0, 80.0), &stops).unwrap();
        assert_eq!(nearest.name, "Platform 1");
    }

    #[test]
    fn test_nearest_stop_skips_ungeocoded() {
        let stops = vec![
            Stop::new(1, "Nowhere", 1, 0.0, 0.0).without_location(),
            Stop::new(2, "Far", 2, 14.0, 80.0),
        ];
        let nearest = nearest_stop(&Coordinates::new(0.0, 0.0), &stops).unwrap();
        assert_eq!(nearest.name, "Far");

        let none: Vec<Stop> = vec![Stop::new(1, "X", 1, 0.0, 0.0).without_location()];
        assert!(nearest_stop(&Coordinates::new(0.0, 0.0), &none).is_none());
    }

    #[test]
    fn test_next_stop_sorts_by_sequence() {
        let mut stops = route();
        stops.reverse();

        assert_eq!(next_stop(StopId(1), &stops).unwrap().name, "B");
        assert_eq!(next_stop(StopId(2), &stops).unwrap().name, "C");
    }

    #[test]
    fn test_next_stop_none_at_end_or_unknown() {
        let stops = route();
        assert!(next_stop(StopId(3), &stops).is_none());
        assert!(next_stop(StopId(42), &stops).is_none());
        assert!(next_stop(StopId(1), &[]).is_none());
    }

    #[test]
    fn test_located_drops_stops_without_coordinates() {
        let stops = vec![
            Stop::new(2, "B", 2, 13.05, 80.0),
            Stop::new(9, "Depot", 0, 0.0, 0.0).without_location(),
            Stop::new(1, "A", 1, 13.0, 80.0),
        ];
        let names: Vec<&str> = located(&stops).iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
