//! Geodetic <-> ECEF conversions and the observation/propagation direction
//! convention.
//!
//! The muon's propagation direction is the *negation* of the direction the
//! observer reports looking in; every conversion here is explicit about
//! which of the two it is producing, so call sites in `fluxmeter.rs` never
//! have to guess.

use nalgebra::Vector3;

use crate::constants::{WGS84_A, WGS84_F};

/// A point in Earth-Centered, Earth-Fixed Cartesian coordinates, in meters.
pub type Ecef = Vector3<f64>;

/// Converts geodetic (lat, lon in degrees, height in meters) to ECEF, using
/// the WGS-84 ellipsoid.
pub fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, height_m: f64) -> Ecef {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    let x = (n + height_m) * lat.cos() * lon.cos();
    let y = (n + height_m) * lat.cos() * lon.sin();
    let z = (n * (1.0 - e2) + height_m) * sin_lat;

    Vector3::new(x, y, z)
}

/// Converts ECEF to geodetic (lat, lon in degrees, height in meters), by
/// fixed-point iteration on the latitude/height pair. Converges to well
/// below the 1e-4 m boundary tolerance used throughout the transport loop
/// within a handful of iterations for any altitude this crate deals with.
pub fn ecef_to_geodetic(pos: &Ecef) -> (f64, f64, f64) {
    let (x, y, z) = (pos.x, pos.y, pos.z);
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let p = (x * x + y * y).sqrt();
    let lon = y.atan2(x);

    if p < 1.0e-9 {
        // On the polar axis; longitude is undefined, height measured along z.
        let height = z.abs() - WGS84_A * (1.0 - WGS84_F);
        let lat = if z >= 0.0 { 90.0 } else { -90.0 };
        return (lat, lon.to_degrees(), height);
    }

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..8 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let height = p / lat.cos() - n;
        lat = z.atan2(p * (1.0 - e2 * n / (n + height)));
    }

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let height = p / lat.cos() - n;

    (lat.to_degrees(), lon.to_degrees(), height)
}

/// A local East-North-Up frame basis at the given geodetic latitude/longitude.
pub fn enu_basis(lat_deg: f64, lon_deg: f64) -> (Ecef, Ecef, Ecef) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let east = Vector3::new(-lon.sin(), lon.cos(), 0.0);
    let north = Vector3::new(
        -lat.sin() * lon.cos(),
        -lat.sin() * lon.sin(),
        lat.cos(),
    );
    let up = Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
    (east, north, up)
}

/// Converts an (azimuth, elevation) direction, both in degrees, at the given
/// geodetic location into an ECEF unit vector. Azimuth is measured clockwise
/// from north; elevation is measured up from the local horizontal.
pub fn azel_to_ecef_direction(lat_deg: f64, lon_deg: f64, azimuth_deg: f64, elevation_deg: f64) -> Ecef {
    let (east, north, up) = enu_basis(lat_deg, lon_deg);
    let az = azimuth_deg.to_radians();
    let el = elevation_deg.to_radians();

    let local = north * (el.cos() * az.cos()) + east * (el.cos() * az.sin()) + up * el.sin();
    local.normalize()
}

/// Inverse of [`azel_to_ecef_direction`]: recovers (azimuth, elevation), in
/// degrees, of a unit ECEF direction vector as seen from the given geodetic
/// location.
pub fn ecef_direction_to_azel(lat_deg: f64, lon_deg: f64, direction: &Ecef) -> (f64, f64) {
    let (east, north, up) = enu_basis(lat_deg, lon_deg);
    let e = direction.dot(&east);
    let n = direction.dot(&north);
    let u = direction.dot(&up);

    let elevation = u.clamp(-1.0, 1.0).asin();
    let azimuth = e.atan2(n);
    (azimuth.to_degrees().rem_euclid(360.0), elevation.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ecef_round_trip() {
        for &(lat, lon, h) in &[
            (0.0, 0.0, 0.0),
            (45.0, 12.0, 1500.0),
            (-33.5, 151.2, 50.0),
            (89.0, 10.0, 200.0),
        ] {
            let ecef = geodetic_to_ecef(lat, lon, h);
            let (lat2, lon2, h2) = ecef_to_geodetic(&ecef);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1.0e-6);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1.0e-6);
            assert_abs_diff_eq!(h, h2, epsilon = 1.0e-3);
        }
    }

    #[test]
    fn zenith_round_trips_to_up() {
        let dir = azel_to_ecef_direction(10.0, 20.0, 0.0, 90.0);
        let (_, _, up) = enu_basis(10.0, 20.0);
        assert_abs_diff_eq!(dir.x, up.x, epsilon = 1.0e-9);
        assert_abs_diff_eq!(dir.y, up.y, epsilon = 1.0e-9);
        assert_abs_diff_eq!(dir.z, up.z, epsilon = 1.0e-9);
    }

    #[test]
    fn azel_direction_round_trip() {
        let lat = 40.0;
        let lon = -70.0;
        for &(az, el) in &[(0.0, 90.0), (45.0, 30.0), (270.0, 10.0), (10.0, 89.0)] {
            let dir = azel_to_ecef_direction(lat, lon, az, el);
            let (az2, el2) = ecef_direction_to_azel(lat, lon, &dir);
            assert_abs_diff_eq!(az, az2, epsilon = 1.0e-6);
            assert_abs_diff_eq!(el, el2, epsilon = 1.0e-6);
        }
    }
}
