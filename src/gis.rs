//! Module implement the geo-spatial helpers backing `near=` lifts.

/// Mean earth radius in meters, IUGG value.
pub const EARTH_RADIUS: f64 = 6_371_008.8;

/// Great-circle distance in meters between two (lat, lon) points
/// given in degrees.
pub fn haversine(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat0, lon0) = (a.0.to_radians(), a.1.to_radians());
    let (lat1, lon1) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat1 - lat0;
    let dlon = lon1 - lon0;

    let h = (dlat / 2.0).sin().powi(2)
        + lat0.cos() * lat1.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS * h.sqrt().asin()
}

/// Bounding box `(latmin, latmax, lonmin, lonmax)` in degrees, that
/// contains every point within `dist` meters of (lat, lon). The box is
/// clamped to the coordinate domain so its corners stay encodable.
pub fn bbox(lat: f64, lon: f64, dist: f64) -> (f64, f64, f64, f64) {
    let dlat = (dist / EARTH_RADIUS).to_degrees();

    // longitude degrees shrink with latitude, guard the poles.
    let coslat = lat.to_radians().cos().max(1e-12);
    let dlon = (dist / (EARTH_RADIUS * coslat)).to_degrees();

    let latmin = (lat - dlat).max(-90.0);
    let latmax = (lat + dlat).min(90.0);
    let lonmin = (lon - dlon).max(-180.0);
    let lonmax = (lon + dlon).min(180.0);

    (latmin, latmax, lonmin, lonmax)
}

#[cfg(test)]
#[path = "gis_test.rs"]
mod gis_test;
