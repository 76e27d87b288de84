//! # Track Engine
//!
//! Geometric processing of recorded GPS tracks.
//!
//! This library provides:
//! - Ellipsoidal (Vincenty) distance, map projections and slippy-map tile math
//! - Waypoint clustering for repeated observations of the same named place
//! - Ramer-Douglas-Peucker polyline simplification
//! - Tile slicing of whole track collections into per-zoom GeoJSON tiles
//! - Light decimation filters (stride skipping, stationary-point collapsing)
//!
//! ## Features
//!
//! - **`parallel`** - Slice and write tiles in parallel with rayon
//! - **`cli`** - Build the `trackview` command-line front end
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use track_engine::{GpsPoint, Path, Filter, TileConfig, TileSlicer, apply_filters};
//!
//! let track = Path::new(vec![
//!     GpsPoint::new(51.5074, -0.1278),
//!     GpsPoint::new(51.5080, -0.1290),
//!     GpsPoint::new(51.5090, -0.1300),
//!     GpsPoint::new(51.5100, -0.1310),
//! ]);
//!
//! let filters: Vec<Filter> = vec!["skip=2".parse().unwrap()];
//! let paths = apply_filters(vec![track], &filters).unwrap();
//!
//! let config = TileConfig { min_zoom: 10, max_zoom: 12, ..TileConfig::default() };
//! let tiles = TileSlicer::new(config).unwrap().slice(&paths);
//! assert!(!tiles.is_empty());
//! ```
//!
//! ## Pipeline
//!
//! Parsers ([`sources`]) produce an ordered collection of [`Path`]s. Filters run in
//! sequence, each consuming the collection and returning a new one; nothing is
//! mutated in place. The final collection goes to a renderer ([`render`]) or to the
//! [`TileSlicer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Result, TrackError};

// Geographic math: distance, projections, tiles
pub mod geo_utils;
pub use geo_utils::{Ellipsoid, MapCanvas};

// Ramer-Douglas-Peucker simplification
pub mod simplify;

// Name-match waypoint clustering
pub mod clustering;
pub use clustering::{ClusterConfig, PointClusterer};

// Decimation filters and the filter pipeline
pub mod filters;
pub use filters::{apply_filters, Filter, SkipFilter, StoppedPointFilter};

// Tile slicing and GeoJSON tile output
pub mod tiles;
pub use tiles::{FragmentMode, TileConfig, TileFeature, TileKey, TileSet, TileSlicer};

// Per-path statistics
pub mod stats;
pub use stats::PathStats;

// Input format collaborators
pub mod sources;
pub use sources::{GpxKind, InputFormat};

// Output selectors and text renderers
pub mod render;
pub use render::{OutputSelector, RenderOptions};

// ============================================================================
// Core Types
// ============================================================================

/// A single recorded GPS sample.
///
/// Points are values: filters build new points instead of editing shared ones.
///
/// # Example
/// ```
/// use track_engine::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278).with_elevation(11.0).with_name("Bridge");
/// assert_eq!(point.name.as_deref(), Some("Bridge"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Waypoint label, used by the name-match filter
    pub name: Option<String>,
}

impl GpsPoint {
    /// Create a new GPS point with no elevation, time or name.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            timestamp: None,
            name: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Copy of this point moved to new coordinates, keeping elevation, time and name.
    pub fn with_position(&self, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..self.clone()
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// One recorded track or route: an ordered sequence of points.
///
/// Point order is the sampling order along the track and every filter keeps it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    pub name: Option<String>,
    /// Free-form tag such as "bike" or "train", attached by the parser
    pub transportation_mode: Option<String>,
    pub points: Vec<GpsPoint>,
}

impl Path {
    pub fn new(points: Vec<GpsPoint>) -> Self {
        Self {
            name: None,
            transportation_mode: None,
            points,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_transportation_mode(mut self, mode: Option<&str>) -> Self {
        self.transportation_mode = mode.map(str::to_string);
        self
    }

    /// Copy of this path's metadata around a new point list.
    pub fn with_points(&self, points: Vec<GpsPoint>) -> Self {
        Self {
            name: self.name.clone(),
            transportation_mode: self.transportation_mode.clone(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of the path, `None` when it has no points.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points)
    }
}

/// Geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Bounds enclosing every point of every path.
    pub fn from_paths(paths: &[Path]) -> Option<Self> {
        paths
            .iter()
            .filter_map(Path::bounds)
            .reduce(|a, b| Self {
                min_lat: a.min_lat.min(b.min_lat),
                max_lat: a.max_lat.max(b.max_lat),
                min_lng: a.min_lng.min(b.min_lng),
                max_lng: a.max_lng.max(b.max_lng),
            })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn north_west(&self) -> GpsPoint {
        GpsPoint::new(self.max_lat, self.min_lng)
    }

    pub fn south_east(&self) -> GpsPoint {
        GpsPoint::new(self.min_lat, self.max_lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_with_position_keeps_metadata() {
        let p = GpsPoint::new(1.0, 2.0).with_elevation(5.0).with_name("A");
        let moved = p.with_position(3.0, 4.0);
        assert_eq!(moved.latitude, 3.0);
        assert_eq!(moved.longitude, 4.0);
        assert_eq!(moved.elevation, Some(5.0));
        assert_eq!(moved.name.as_deref(), Some("A"));
        // original untouched
        assert_eq!(p.latitude, 1.0);
    }

    #[test]
    fn test_bounds_from_paths() {
        let a = Path::new(vec![GpsPoint::new(10.0, 20.0), GpsPoint::new(11.0, 21.0)]);
        let b = Path::new(vec![GpsPoint::new(9.0, 22.0)]);
        let empty = Path::default();

        let bounds = Bounds::from_paths(&[a, empty, b]).unwrap();
        assert_eq!(bounds.min_lat, 9.0);
        assert_eq!(bounds.max_lat, 11.0);
        assert_eq!(bounds.min_lng, 20.0);
        assert_eq!(bounds.max_lng, 22.0);
        assert_eq!(bounds.north_west(), GpsPoint::new(11.0, 20.0));
        assert_eq!(bounds.south_east(), GpsPoint::new(9.0, 22.0));
    }

    #[test]
    fn test_bounds_from_no_paths() {
        assert!(Bounds::from_paths(&[]).is_none());
        assert!(Bounds::from_paths(&[Path::default()]).is_none());
    }

    #[test]
    fn test_path_with_points_keeps_metadata() {
        let path = Path::new(vec![GpsPoint::new(0.0, 0.0)])
            .with_name("Commute")
            .with_transportation_mode(Some("bike"));
        let copy = path.with_points(vec![]);
        assert_eq!(copy.name.as_deref(), Some("Commute"));
        assert_eq!(copy.transportation_mode.as_deref(), Some("bike"));
        assert!(copy.is_empty());
        assert_eq!(path.len(), 1);
    }
}
