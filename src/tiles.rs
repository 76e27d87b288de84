//! # Tile Slicing
//!
//! Cuts a path collection into slippy-map tiles for a range of zoom levels and
//! simplifies each tile's share of every path to the resolution of that zoom.
//!
//! ## Algorithm
//! 1. For each zoom level, compute the tile key of every point
//! 2. Group points by tile, then by originating path, in scan order
//! 3. For each fragment derive `epsilon` from the meters-per-pixel at the
//!    fragment's mean latitude
//! 4. Simplify the fragment in spherical-mercator meters
//! 5. Emit one LineString feature per fragment
//!
//! Tiles are independent of one another, so with the `parallel` feature both
//! simplification and writing run on the rayon pool.
//!
//! ## Output
//!
//! [`TileSet::write_to_dir`] writes one `{zoom}_{x}_{y}.json` file per tile holding
//! a JSON array of GeoJSON features. Coordinates are `[lon, lat]`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::time::Instant;

use geo::{Coord, LineString};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::{compute_center, meters_per_pixel, metric_coord, tile_index};
use crate::simplify::simplify_indices;
use crate::{GpsPoint, Path, Result, TrackError};

/// Deepest zoom accepted; tile indices stop fitting comfortably beyond it.
const MAX_ZOOM: u32 = 30;

/// How a path that leaves a tile and comes back is represented inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentMode {
    /// All of a path's points in the tile form one fragment, in scan order,
    /// even when the visits are not contiguous.
    #[default]
    Concatenate,
    /// Each contiguous visit of a path becomes its own fragment.
    ContiguousRuns,
}

/// Configuration for tile slicing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Lowest zoom level generated (inclusive)
    pub min_zoom: u32,
    /// Highest zoom level generated (inclusive)
    pub max_zoom: u32,
    /// Equatorial circumference used for meters-per-pixel (default: 40,075 km)
    pub earth_circumference_m: f64,
    pub fragment_mode: FragmentMode,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 18,
            earth_circumference_m: 40_075_000.0,
            fragment_mode: FragmentMode::Concatenate,
        }
    }
}

/// Address of one slippy-map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    pub zoom: u32,
    pub x: i64,
    pub y: i64,
}

impl TileKey {
    /// Tile containing `point` at `zoom`.
    pub fn for_point(point: &GpsPoint, zoom: u32) -> Self {
        let (x, y) = tile_index(point.latitude, point.longitude, zoom);
        Self { zoom, x, y }
    }

    /// Output file name, `{zoom}_{x}_{y}.json`.
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.json", self.zoom, self.x, self.y)
    }
}

/// A simplified piece of one path inside one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFeature {
    /// Index of the originating path in the input collection
    pub path_index: usize,
    /// Simplified line, `x` = longitude, `y` = latitude
    pub line: LineString,
}

impl TileFeature {
    /// `[lon, lat]` pairs of the simplified line.
    pub fn coordinates(&self) -> Vec<[f64; 2]> {
        self.line.coords().map(|c| [c.x, c.y]).collect()
    }

    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": self.coordinates(),
            },
        })
    }
}

/// Slicing result: features per tile, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileSet {
    tiles: BTreeMap<TileKey, Vec<TileFeature>>,
}

impl TileSet {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, key: &TileKey) -> Option<&[TileFeature]> {
        self.tiles.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TileKey> {
        self.tiles.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &[TileFeature])> {
        self.tiles.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Tiles of a single zoom level.
    pub fn zoom_level(&self, zoom: u32) -> impl Iterator<Item = (&TileKey, &[TileFeature])> {
        self.iter().filter(move |(k, _)| k.zoom == zoom)
    }

    /// Serialize one tile as a JSON array of features.
    pub fn write_tile<W: Write>(&self, key: &TileKey, sink: W) -> Result<()> {
        let features: Vec<Value> = self
            .tiles
            .get(key)
            .map(|fs| fs.iter().map(TileFeature::to_geojson).collect())
            .unwrap_or_default();
        serde_json::to_writer(sink, &features)?;
        Ok(())
    }

    /// Write every tile into `dir` (created if missing). Returns the number of files.
    pub fn write_to_dir(&self, dir: impl AsRef<std::path::Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let start = Instant::now();
        fs::create_dir_all(dir)?;

        let write_one = |key: &TileKey| -> Result<()> {
            let mut writer = BufWriter::new(File::create(dir.join(key.file_name()))?);
            self.write_tile(key, &mut writer)?;
            writer.flush()?;
            Ok(())
        };

        #[cfg(feature = "parallel")]
        self.tiles
            .par_iter()
            .try_for_each(|(key, _)| write_one(key))?;

        #[cfg(not(feature = "parallel"))]
        self.tiles.keys().try_for_each(write_one)?;

        info!(
            "[Tiles] Wrote {} tiles to {} in {}ms",
            self.tiles.len(),
            dir.display(),
            start.elapsed().as_millis()
        );
        Ok(self.tiles.len())
    }
}

/// Points of one path inside one tile: a list of runs.
///
/// With [`FragmentMode::Concatenate`] there is only ever one run.
type Fragments<'a> = BTreeMap<usize, Vec<Vec<&'a GpsPoint>>>;

/// Cuts paths into per-zoom tiles.
#[derive(Debug, Clone)]
pub struct TileSlicer {
    config: TileConfig,
}

impl TileSlicer {
    /// # Errors
    ///
    /// [`TrackError::InvalidParameter`] for an inverted zoom range, a zoom above
    /// 30, or a non-positive circumference.
    pub fn new(config: TileConfig) -> Result<Self> {
        if config.min_zoom > config.max_zoom {
            return Err(TrackError::invalid(
                "zoom range",
                format!("{}..={} is empty", config.min_zoom, config.max_zoom),
            ));
        }
        if config.max_zoom > MAX_ZOOM {
            return Err(TrackError::invalid(
                "zoom range",
                format!("max zoom {} exceeds {}", config.max_zoom, MAX_ZOOM),
            ));
        }
        if !(config.earth_circumference_m.is_finite() && config.earth_circumference_m > 0.0) {
            return Err(TrackError::invalid(
                "earth circumference",
                format!("{} m", config.earth_circumference_m),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &TileConfig {
        &self.config
    }

    /// Slice every zoom level of the configured range.
    pub fn slice(&self, paths: &[Path]) -> TileSet {
        let start = Instant::now();
        let mut tiles = BTreeMap::new();

        for zoom in self.config.min_zoom..=self.config.max_zoom {
            let level = self.slice_zoom(paths, zoom);
            debug!("[Tiles] zoom {}: {} tiles", zoom, level.len());
            tiles.extend(level);
        }

        info!(
            "[Tiles] Sliced {} paths into {} tiles (zoom {}..={}) in {}ms",
            paths.len(),
            tiles.len(),
            self.config.min_zoom,
            self.config.max_zoom,
            start.elapsed().as_millis()
        );

        TileSet { tiles }
    }

    /// Tiles of one zoom level.
    pub fn slice_zoom(&self, paths: &[Path], zoom: u32) -> BTreeMap<TileKey, Vec<TileFeature>> {
        let grouped = self.group_by_tile(paths, zoom);

        #[cfg(feature = "parallel")]
        let iter = grouped.into_par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = grouped.into_iter();

        iter.map(|(key, fragments)| {
            let features: Vec<TileFeature> = fragments
                .into_iter()
                .flat_map(|(path_index, runs)| {
                    runs.into_iter()
                        .map(move |run| self.simplify_fragment(path_index, &run, zoom))
                })
                .collect();
            (key, features)
        })
        .collect()
    }

    /// Bucket points by tile, then by path, keeping scan order.
    fn group_by_tile<'a>(&self, paths: &'a [Path], zoom: u32) -> BTreeMap<TileKey, Fragments<'a>> {
        let mut tiles: BTreeMap<TileKey, Fragments<'a>> = BTreeMap::new();

        for (path_index, path) in paths.iter().enumerate() {
            let mut previous: Option<TileKey> = None;

            for point in &path.points {
                let key = TileKey::for_point(point, zoom);
                let runs = tiles.entry(key).or_default().entry(path_index).or_default();

                let new_run = match self.config.fragment_mode {
                    FragmentMode::Concatenate => runs.is_empty(),
                    FragmentMode::ContiguousRuns => previous != Some(key),
                };
                if new_run {
                    runs.push(Vec::new());
                }
                if let Some(run) = runs.last_mut() {
                    run.push(point);
                }
                previous = Some(key);
            }
        }

        tiles
    }

    fn simplify_fragment(&self, path_index: usize, run: &[&GpsPoint], zoom: u32) -> TileFeature {
        let mean_lat = compute_center(run.iter().copied()).latitude;
        let epsilon = meters_per_pixel(self.config.earth_circumference_m, mean_lat, zoom);

        let projected: Vec<Coord> = run.iter().map(|p| metric_coord(p)).collect();
        let line: LineString = simplify_indices(&projected, epsilon)
            .into_iter()
            .map(|i| Coord { x: run[i].longitude, y: run[i].latitude })
            .collect();

        TileFeature { path_index, line }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straight east-west line of `n` points starting at (lat, lon).
    fn straight(lat: f64, lon: f64, n: usize, step: f64) -> Path {
        Path::new((0..n).map(|i| GpsPoint::new(lat, lon + i as f64 * step)).collect())
    }

    fn config(min_zoom: u32, max_zoom: u32) -> TileConfig {
        TileConfig { min_zoom, max_zoom, ..TileConfig::default() }
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(TileSlicer::new(config(5, 4)).is_err());
        assert!(TileSlicer::new(config(0, 31)).is_err());
        let mut bad = config(0, 1);
        bad.earth_circumference_m = 0.0;
        assert!(TileSlicer::new(bad).is_err());
        assert!(TileSlicer::new(config(3, 3)).is_ok());
    }

    #[test]
    fn test_file_name() {
        let key = TileKey { zoom: 12, x: 2046, y: 1362 };
        assert_eq!(key.file_name(), "12_2046_1362.json");
    }

    #[test]
    fn test_single_tile_at_zoom_zero() {
        let paths = vec![straight(46.0, 6.0, 20, 0.001), straight(-33.0, 151.0, 5, 0.001)];
        let tiles = TileSlicer::new(config(0, 0)).unwrap().slice(&paths);

        assert_eq!(tiles.len(), 1);
        let features = tiles.get(&TileKey { zoom: 0, x: 0, y: 0 }).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].path_index, 0);
        assert_eq!(features[1].path_index, 1);
        // straight lines collapse to their endpoints
        assert_eq!(features[0].line.0.len(), 2);
        assert_eq!(features[0].coordinates()[0], [6.0, 46.0]);
    }

    #[test]
    fn test_every_zoom_in_range() {
        let paths = vec![straight(51.5, -0.12, 10, 0.0001)];
        let tiles = TileSlicer::new(config(3, 6)).unwrap().slice(&paths);
        for zoom in 3..=6 {
            assert_eq!(tiles.zoom_level(zoom).count(), 1, "zoom {zoom}");
        }
        assert_eq!(tiles.zoom_level(7).count(), 0);
    }

    #[test]
    fn test_points_split_across_tiles() {
        // crosses the prime meridian: tile x changes at lon 0 for every zoom > 0
        let path = straight(10.0, -0.5, 11, 0.1);
        let tiles = TileSlicer::new(config(1, 1)).unwrap().slice(&[path]);

        assert_eq!(tiles.len(), 2);
        let west = tiles.get(&TileKey { zoom: 1, x: 0, y: 0 }).unwrap();
        let east = tiles.get(&TileKey { zoom: 1, x: 1, y: 0 }).unwrap();
        assert!(west[0].coordinates().iter().all(|c| c[0] < 0.0));
        assert!(east[0].coordinates().iter().all(|c| c[0] >= 0.0));
    }

    #[test]
    fn test_detail_kept_at_high_zoom_only() {
        // a ~100 m bump in an otherwise straight 1 km line
        let mut points: Vec<GpsPoint> = (0..11)
            .map(|i| GpsPoint::new(45.0, 7.0 + i as f64 * 0.0013))
            .collect();
        points[5].latitude = 45.0 + 0.0009;
        let path = Path::new(points);

        let slicer = TileSlicer::new(config(5, 16)).unwrap();
        let tiles = slicer.slice(&[path]);

        let low: Vec<_> = tiles.zoom_level(5).collect();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].1[0].line.0.len(), 2);

        let bump = [7.0 + 5.0 * 0.0013, 45.0 + 0.0009];
        assert!(tiles
            .zoom_level(16)
            .flat_map(|(_, fs)| fs.iter())
            .any(|f| f.coordinates().contains(&bump)));
    }

    #[test]
    fn test_revisit_concatenated_by_default() {
        // west, east, west again: the west tile sees two separate visits
        let path = Path::new(vec![
            GpsPoint::new(10.0, -0.2),
            GpsPoint::new(10.0, -0.1),
            GpsPoint::new(10.0, 0.1),
            GpsPoint::new(10.0, 0.2),
            GpsPoint::new(10.1, -0.1),
            GpsPoint::new(10.1, -0.2),
        ]);
        let west = TileKey { zoom: 1, x: 0, y: 0 };

        let concatenated = TileSlicer::new(config(1, 1)).unwrap().slice(&[path.clone()]);
        assert_eq!(concatenated.get(&west).unwrap().len(), 1);

        let runs = TileSlicer::new(TileConfig {
            fragment_mode: FragmentMode::ContiguousRuns,
            ..config(1, 1)
        })
        .unwrap()
        .slice(&[path]);
        let features = runs.get(&west).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].coordinates(), vec![[-0.2, 10.0], [-0.1, 10.0]]);
        assert_eq!(features[1].coordinates(), vec![[-0.1, 10.1], [-0.2, 10.1]]);
    }

    #[test]
    fn test_polar_points_land_in_edge_row() {
        let path = Path::new(vec![GpsPoint::new(-90.0, 0.0), GpsPoint::new(-89.9, 1.0)]);
        let tiles = TileSlicer::new(config(0, 2)).unwrap().slice(&[path]);

        let names: Vec<String> = tiles.keys().map(TileKey::file_name).collect();
        assert_eq!(names, vec!["0_0_0.json", "1_1_1.json", "2_2_3.json"]);
        for key in tiles.keys() {
            let n = 1i64 << key.zoom;
            assert!((0..n).contains(&key.x) && (0..n).contains(&key.y));
        }
    }

    #[test]
    fn test_empty_input() {
        let tiles = TileSlicer::new(config(0, 4)).unwrap().slice(&[Path::default()]);
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_write_tile_geojson() {
        let paths = vec![straight(46.0, 6.0, 3, 0.001)];
        let tiles = TileSlicer::new(config(0, 0)).unwrap().slice(&paths);

        let mut buf = Vec::new();
        tiles.write_tile(&TileKey { zoom: 0, x: 0, y: 0 }, &mut buf).unwrap();
        let value: Value = serde_json::from_slice(&buf).unwrap();

        let features = value.as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["type"], "Feature");
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[0]["geometry"]["coordinates"][0][0], 6.0);
        assert_eq!(features[0]["geometry"]["coordinates"][0][1], 46.0);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{"min_zoom": 4, "max_zoom": 9, "fragment_mode": "contiguous_runs"}"#;
        let config: TileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.min_zoom, 4);
        assert_eq!(config.max_zoom, 9);
        assert_eq!(config.fragment_mode, FragmentMode::ContiguousRuns);
        assert_eq!(config.earth_circumference_m, 40_075_000.0);
    }
}
