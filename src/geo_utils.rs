//! # Geographic Utilities
//!
//! Core geographic computation for GPS track processing: ellipsoidal distance,
//! map projections and slippy-map tile indexing.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance`] | Vincenty geodesic distance on the WGS-84 ellipsoid |
//! | [`polyline_length`] | Total geodesic length of a track in meters |
//! | [`project_display`] | Screen projection used by renderers |
//! | [`project_metric`] | Spherical mercator in meters |
//! | [`tile_index`] | Slippy-map tile containing a coordinate |
//! | [`tile_top_left`] | North-west corner of a tile |
//! | [`meters_per_pixel`] | Ground resolution of a 256 px tile pixel |
//! | [`choose_zoom_covering_bounds`] | Highest zoom whose fixed tile grid covers a box |
//! | [`compute_center`] | Arithmetic centroid of a set of points |
//!
//! ## Example
//!
//! ```rust
//! use track_engine::{GpsPoint, geo_utils};
//!
//! let london = GpsPoint::new(51.5074, -0.1278);
//! let paris = GpsPoint::new(48.8566, 2.3522);
//!
//! let meters = geo_utils::distance(&london, &paris).unwrap();
//! assert!((meters - 343_923.0).abs() < 1.0);
//!
//! assert_eq!(geo_utils::tile_index(51.5074, -0.1278, 10), (511, 340));
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Vincenty Inverse Formula
//!
//! The reduced-longitude difference λ is solved iteratively until it moves by
//! less than 1e-12 rad, giving sub-millimetre accuracy. For nearly antipodal
//! points the iteration oscillates instead of converging; that case is reported
//! as [`TrackError::Computation`] after 100 iterations.
//!
//! Reference: <https://en.wikipedia.org/wiki/Vincenty%27s_formulae>
//!
//! ### Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use std::f64::consts::PI;

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{Bounds, GpsPoint, Result, TrackError};

/// Convergence threshold for the λ iteration, in radians.
const LAMBDA_TOLERANCE: f64 = 1e-12;

/// Hard cap on λ iterations.
const MAX_ITERATIONS: usize = 100;

/// Half the equatorial circumference of the spherical mercator plane.
const ORIGIN_SHIFT: f64 = PI * 6_378_137.0;

/// Latitude of the top edge of tile row 0.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

/// Highest zoom level tried when fitting bounds onto a canvas.
const MAX_CANVAS_ZOOM: u32 = 18;

// =============================================================================
// Distance Functions
// =============================================================================

/// Reference ellipsoid for geodesic distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Semi-major axis `a` in meters
    pub semi_major_axis: f64,
    /// Semi-minor axis `b` in meters
    pub semi_minor_axis: f64,
    pub flattening: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        semi_major_axis: 6_378_137.0,
        semi_minor_axis: 6_356_752.314245,
        flattening: 1.0 / 298.257223563,
    };

    /// Geodesic distance in meters between two points using Vincenty's inverse formula.
    ///
    /// Identical points return exactly `0.0` without iterating.
    ///
    /// # Errors
    ///
    /// [`TrackError::Computation`] when λ fails to converge within 100 iterations
    /// (near-antipodal input) or the iteration produces a non-finite value.
    pub fn distance(&self, p1: &GpsPoint, p2: &GpsPoint) -> Result<f64> {
        if p1.latitude == p2.latitude && p1.longitude == p2.longitude {
            return Ok(0.0);
        }

        let a = self.semi_major_axis;
        let b = self.semi_minor_axis;
        let f = self.flattening;

        let l = (p2.longitude - p1.longitude).to_radians();
        let u1 = ((1.0 - f) * p1.latitude.to_radians().tan()).atan();
        let u2 = ((1.0 - f) * p2.latitude.to_radians().tan()).atan();
        let (sin_u1, cos_u1) = u1.sin_cos();
        let (sin_u2, cos_u2) = u2.sin_cos();

        let mut lambda = l;
        let mut converged = false;

        let mut sin_sigma = 0.0;
        let mut cos_sigma = 0.0;
        let mut sigma = 0.0;
        let mut cos_sq_alpha = 0.0;
        let mut cos_2sigma_m = 0.0;

        for _ in 0..MAX_ITERATIONS {
            let (sin_lambda, cos_lambda) = lambda.sin_cos();

            let t1 = cos_u2 * sin_lambda;
            let t2 = cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda;
            sin_sigma = (t1 * t1 + t2 * t2).sqrt();

            if sin_sigma == 0.0 {
                // coincident points
                return Ok(0.0);
            }

            cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
            sigma = sin_sigma.atan2(cos_sigma);

            let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
            cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;

            // equatorial line: cos²α = 0
            cos_2sigma_m = if cos_sq_alpha != 0.0 {
                cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
            } else {
                0.0
            };

            let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
            let previous = lambda;
            lambda = l
                + (1.0 - c)
                    * f
                    * sin_alpha
                    * (sigma
                        + c * sin_sigma
                            * (cos_2sigma_m
                                + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

            if !lambda.is_finite() {
                break;
            }
            if (lambda - previous).abs() <= LAMBDA_TOLERANCE {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(TrackError::Computation {
                from: (p1.latitude, p1.longitude),
                to: (p2.latitude, p2.longitude),
                iterations: MAX_ITERATIONS,
            });
        }

        let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
        let big_a =
            1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
        let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
        let delta_sigma = big_b
            * sin_sigma
            * (cos_2sigma_m
                + big_b / 4.0
                    * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                        - big_b / 6.0
                            * cos_2sigma_m
                            * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                            * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));

        Ok(b * big_a * (sigma - delta_sigma))
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

/// Geodesic distance in meters on the WGS-84 ellipsoid.
///
/// See [`Ellipsoid::distance`].
///
/// # Example
///
/// ```rust
/// use track_engine::{GpsPoint, geo_utils};
///
/// let p = GpsPoint::new(51.5074, -0.1278);
/// assert_eq!(geo_utils::distance(&p, &p).unwrap(), 0.0);
/// ```
#[inline]
pub fn distance(p1: &GpsPoint, p2: &GpsPoint) -> Result<f64> {
    Ellipsoid::WGS84.distance(p1, p2)
}

/// Calculate the total geodesic length of a polyline in meters.
///
/// Empty or single-point tracks return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> Result<f64> {
    points
        .windows(2)
        .map(|w| distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Projections
// =============================================================================

/// Screen projection: `x = lon`, `y = -ln(tan(π/4 + lat·π/360))`.
///
/// Only meant for drawing; distances on this plane are not meters.
#[inline]
pub fn project_display(lat: f64, lon: f64) -> (f64, f64) {
    (lon, -(PI / 4.0 + lat * PI / 360.0).tan().ln())
}

/// Spherical mercator projection in meters (EPSG:3857).
#[inline]
pub fn project_metric(lat: f64, lon: f64) -> (f64, f64) {
    let x = lon * ORIGIN_SHIFT / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
    (x, y * ORIGIN_SHIFT / 180.0)
}

/// [`project_metric`] as a `geo` coordinate.
#[inline]
pub fn metric_coord(point: &GpsPoint) -> Coord {
    let (x, y) = project_metric(point.latitude, point.longitude);
    Coord { x, y }
}

// =============================================================================
// Slippy-Map Tiles
// =============================================================================

/// Tile `(x, y)` containing a coordinate at the given zoom level.
///
/// Standard OpenStreetMap tiling. Latitudes are clamped to the mercator limit
/// of ±85.0511° and both indices to `0..2^zoom`, so the poles and the
/// antimeridian land in the edge tiles.
pub fn tile_index(lat: f64, lon: f64, zoom: u32) -> (i64, i64) {
    let lat_rad = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let n = 2f64.powi(zoom as i32);
    let last = (n - 1.0) as i64;
    let tile_x = ((lon + 180.0) / 360.0 * n).floor() as i64;
    let mercator_y = (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI;
    let tile_y = ((1.0 - mercator_y) / 2.0 * n).floor() as i64;
    (tile_x.clamp(0, last), tile_y.clamp(0, last))
}

/// North-west corner `(lat, lon)` of a tile.
pub fn tile_top_left(tile_x: i64, tile_y: i64, zoom: u32) -> (f64, f64) {
    let n = 2f64.powi(zoom as i32);
    let lon = tile_x as f64 / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * tile_y as f64 / n)).sinh().atan().to_degrees();
    (lat, lon)
}

/// Ground distance covered by one pixel of a 256 px tile at `lat` and `zoom`.
///
/// `circumference · cos(lat) / 2^(zoom + 8)`, the usual mercator scale
/// approximation. Used as the simplification tolerance for tiles.
#[inline]
pub fn meters_per_pixel(earth_circumference_m: f64, lat: f64, zoom: u32) -> f64 {
    earth_circumference_m * lat.to_radians().cos() / 2f64.powi(zoom as i32 + 8)
}

/// Fixed-size canvas made of square map tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCanvas {
    pub width_px: u32,
    pub height_px: u32,
    pub tile_px: u32,
}

impl Default for MapCanvas {
    fn default() -> Self {
        Self {
            width_px: 1024,
            height_px: 1024,
            tile_px: 256,
        }
    }
}

impl MapCanvas {
    /// Highest zoom at which this canvas, anchored at the bounds' north-west
    /// corner, still reaches the south-east corner.
    pub fn zoom_for(&self, bounds: &Bounds) -> Result<u32> {
        choose_zoom_covering_bounds(
            &bounds.north_west(),
            &bounds.south_east(),
            self.width_px,
            self.height_px,
            self.tile_px,
        )
    }
}

/// Pick the highest zoom (from 18 down) whose grid of
/// `canvas / tile` tiles, starting at the tile containing `nw`, covers `se`.
///
/// Returns 0 when no positive zoom fits.
///
/// # Errors
///
/// [`TrackError::InvalidParameter`] when the tile size is zero or larger than
/// the canvas.
pub fn choose_zoom_covering_bounds(
    nw: &GpsPoint,
    se: &GpsPoint,
    canvas_width_px: u32,
    canvas_height_px: u32,
    tile_px: u32,
) -> Result<u32> {
    if tile_px == 0 || tile_px > canvas_width_px || tile_px > canvas_height_px {
        return Err(TrackError::invalid(
            "tile size",
            format!("{tile_px}px tiles do not fit a {canvas_width_px}x{canvas_height_px} canvas"),
        ));
    }

    let tiles_x = i64::from(canvas_width_px / tile_px);
    let tiles_y = i64::from(canvas_height_px / tile_px);

    for zoom in (1..=MAX_CANVAS_ZOOM).rev() {
        let (tile_x, tile_y) = tile_index(nw.latitude, nw.longitude, zoom);
        let (lat, lon) =
            tile_top_left(tile_x.saturating_add(tiles_x), tile_y.saturating_add(tiles_y), zoom);
        if lat <= se.latitude && lon >= se.longitude {
            return Ok(zoom);
        }
    }

    Ok(0)
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the arithmetic mean of latitudes and longitudes.
///
/// Returns (0, 0) for empty input. Suitable for small areas only; sets crossing
/// the antimeridian average to the wrong side of the globe.
pub fn compute_center<'a, I>(points: I) -> GpsPoint
where
    I: IntoIterator<Item = &'a GpsPoint>,
{
    let (sum_lat, sum_lng, n) = points
        .into_iter()
        .fold((0.0, 0.0, 0usize), |(lat, lng, n), p| {
            (lat + p.latitude, lng + p.longitude, n + 1)
        });

    if n == 0 {
        return GpsPoint::new(0.0, 0.0);
    }

    GpsPoint::new(sum_lat / n as f64, sum_lng / n as f64)
}

// =============================================================================
// Unit Tests
// =============================================================================
