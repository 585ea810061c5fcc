//! Great-circle distance helpers.
//!
//! Every distance in the tracking core is straight-line haversine distance;
//! no road network is consulted.

use bustrack_env::Coordinates;
use geo::{HaversineDistance, Point};

/// Haversine distance in kilometres between two lat/lng pairs.
pub fn calculate_distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    // geo points are (x = longitude, y = latitude)
    let a = Point::new(lng1, lat1);
    let b = Point::new(lng2, lat2);
    a.haversine_distance(&b) / 1000.0
}

/// Haversine distance in kilometres between two coordinates.
#[inline]
pub fn distance_km(a: &Coordinates, b: &Coordinates) -> f64 {
    calculate_distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Converts metres per second to kilometres per hour.
#[inline]
pub fn mps_to_kmh(speed_mps: f64) -> f64 {
    speed_mps * 3.6
}
