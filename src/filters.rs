//! Decimation filters and the filter pipeline.
//!
//! Every filter takes the whole path collection and returns a new one. Filters
//! are selected once, up front, from their textual form:
//!
//! | Selector | Filter |
//! |----------|--------|
//! | `skip=N` | [`SkipFilter`] with stride `N` |
//! | `stopped` | [`StoppedPointFilter`] |
//! | `name-match-radius=R` | [`PointClusterer`] with radius `R` meters |

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use log::info;

use crate::clustering::PointClusterer;
use crate::{Path, Result, TrackError};

/// Keep every `step`-th point of each path, plus its first and last point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipFilter {
    step: usize,
}

impl SkipFilter {
    /// # Errors
    ///
    /// [`TrackError::InvalidParameter`] for a zero stride.
    pub fn new(step: usize) -> Result<Self> {
        if step == 0 {
            return Err(TrackError::invalid("skip stride", "must be a positive integer"));
        }
        Ok(Self { step })
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn apply(&self, paths: &[Path]) -> Vec<Path> {
        paths
            .iter()
            .map(|path| {
                let last = path.points.len().saturating_sub(1);
                let points = path
                    .points
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i == 0 || *i == last || i % self.step == 0)
                    .map(|(_, p)| p.clone())
                    .collect();
                path.with_points(points)
            })
            .collect()
    }
}

/// Collapse runs of identical consecutive samples to their first sample.
///
/// Two samples are identical when latitude, longitude, elevation and name all
/// match. The first and last point of a path are always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoppedPointFilter;

impl StoppedPointFilter {
    pub fn apply(&self, paths: &[Path]) -> Vec<Path> {
        paths.iter().map(|path| path.with_points(Self::collapse(path))).collect()
    }

    fn collapse(path: &Path) -> Vec<crate::GpsPoint> {
        let points = &path.points;
        if points.len() <= 2 {
            return points.clone();
        }

        let mut kept = Vec::with_capacity(points.len());
        kept.push(points[0].clone());

        for point in &points[1..points.len() - 1] {
            let previous = &kept[kept.len() - 1];
            let stationary = point.latitude == previous.latitude
                && point.longitude == previous.longitude
                && point.elevation == previous.elevation
                && point.name == previous.name;
            if !stationary {
                kept.push(point.clone());
            }
        }

        kept.push(points[points.len() - 1].clone());
        kept
    }
}

/// A filter selected from its textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Skip(SkipFilter),
    StoppedPoints(StoppedPointFilter),
    NameMatch(PointClusterer),
}

impl Filter {
    /// Apply the filter to the whole collection.
    ///
    /// # Errors
    ///
    /// Only [`Filter::NameMatch`] can fail, when a distance does not converge.
    pub fn apply(&self, paths: &[Path]) -> Result<Vec<Path>> {
        match self {
            Filter::Skip(f) => Ok(f.apply(paths)),
            Filter::StoppedPoints(f) => Ok(f.apply(paths)),
            Filter::NameMatch(f) => f.apply(paths),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Skip(s) => write!(f, "skip={}", s.step()),
            Filter::StoppedPoints(_) => write!(f, "stopped"),
            Filter::NameMatch(c) => write!(f, "name-match-radius={}", c.radius_m()),
        }
    }
}

impl FromStr for Filter {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || TrackError::UnknownSelector {
            kind: "filter",
            value: s.to_string(),
        };

        if s == "stopped" {
            return Ok(Filter::StoppedPoints(StoppedPointFilter));
        }

        let (key, value) = s.split_once('=').ok_or_else(unknown)?;
        match key {
            "skip" => {
                let step = value.trim().parse::<usize>().map_err(|_| {
                    let message = format!("'{value}' is not a positive integer");
                    TrackError::invalid("skip stride", message)
                })?;
                Ok(Filter::Skip(SkipFilter::new(step)?))
            }
            "name-match-radius" => {
                let radius = value.trim().parse::<f64>().map_err(|_| {
                    TrackError::invalid("cluster radius", format!("'{value}' is not a distance"))
                })?;
                Ok(Filter::NameMatch(PointClusterer::with_radius(radius)?))
            }
            _ => Err(unknown()),
        }
    }
}

/// Run `filters` in order, each consuming the previous collection.
///
/// # Errors
///
/// Stops at the first failing filter; no partial result is returned.
pub fn apply_filters(paths: Vec<Path>, filters: &[Filter]) -> Result<Vec<Path>> {
    filters.iter().try_fold(paths, |paths, filter| {
        let start = Instant::now();
        let before: usize = paths.iter().map(Path::len).sum();
        let filtered = filter.apply(&paths)?;
        let after: usize = filtered.iter().map(Path::len).sum();
        info!(
            "[Filters] {}: {} -> {} points in {}ms",
            filter,
            before,
            after,
            start.elapsed().as_millis()
        );
        Ok(filtered)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    fn numbered_path(n: usize) -> Path {
        Path::new((0..n).map(|i| GpsPoint::new(i as f64 * 0.001, 0.0)).collect())
    }

    fn latitudes(path: &Path) -> Vec<f64> {
        path.points.iter().map(|p| p.latitude).collect()
    }

    #[test]
    fn test_skip_stride_three() {
        let path = numbered_path(10);
        let result = SkipFilter::new(3).unwrap().apply(&[path.clone()]);
        let expected: Vec<f64> = [0, 3, 6, 9].iter().map(|&i| path.points[i].latitude).collect();
        assert_eq!(latitudes(&result[0]), expected);
    }

    #[test]
    fn test_skip_keeps_last_point() {
        let path = numbered_path(8);
        let result = SkipFilter::new(3).unwrap().apply(&[path.clone()]);
        // indices 0, 3, 6 and the trailing 7
        assert_eq!(result[0].len(), 4);
        assert_eq!(result[0].points.last(), path.points.last());
    }

    #[test]
    fn test_skip_edge_cases() {
        assert!(SkipFilter::new(0).is_err());
        let result = SkipFilter::new(5).unwrap().apply(&[Path::default(), numbered_path(1)]);
        assert!(result[0].is_empty());
        assert_eq!(result[1].len(), 1);

        let unchanged = SkipFilter::new(1).unwrap().apply(&[numbered_path(6)]);
        assert_eq!(unchanged[0].len(), 6);
    }

    #[test]
    fn test_stopped_collapses_run() {
        let a = GpsPoint::new(1.0, 1.0).with_elevation(10.0);
        let b = GpsPoint::new(1.1, 1.0).with_elevation(10.0);
        let c = GpsPoint::new(1.2, 1.0);
        let path = Path::new(vec![a.clone(), b.clone(), b.clone(), b.clone(), c.clone()]);

        let result = StoppedPointFilter.apply(&[path]);
        assert_eq!(result[0].points, vec![a, b, c]);
    }

    #[test]
    fn test_stopped_keeps_endpoints() {
        let a = GpsPoint::new(1.0, 1.0);
        let b = GpsPoint::new(2.0, 2.0);
        // duplicated first and last samples
        let path = Path::new(vec![a.clone(), a.clone(), b.clone(), b.clone()]);
        let result = StoppedPointFilter.apply(&[path]);
        assert_eq!(result[0].points, vec![a, b.clone(), b]);
    }

    #[test]
    fn test_stopped_distinguishes_elevation_and_name() {
        let a = GpsPoint::new(1.0, 1.0).with_elevation(10.0);
        let higher = GpsPoint::new(1.0, 1.0).with_elevation(11.0);
        let named = GpsPoint::new(1.0, 1.0).with_elevation(11.0).with_name("Top");
        let end = GpsPoint::new(2.0, 2.0);
        let path = Path::new(vec![a, higher, named, end]);
        let result = StoppedPointFilter.apply(&[path]);
        assert_eq!(result[0].len(), 4);
    }

    #[test]
    fn test_stopped_whole_path_stationary() {
        let a = GpsPoint::new(1.0, 1.0);
        let path = Path::new(vec![a.clone(); 6]);
        let result = StoppedPointFilter.apply(&[path]);
        assert_eq!(result[0].points, vec![a.clone(), a]);
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("skip=4".parse::<Filter>().unwrap(), Filter::Skip(SkipFilter::new(4).unwrap()));
        assert_eq!("stopped".parse::<Filter>().unwrap(), Filter::StoppedPoints(StoppedPointFilter));
        match "name-match-radius=30".parse::<Filter>().unwrap() {
            Filter::NameMatch(c) => assert_eq!(c.radius_m(), 30.0),
            other => panic!("unexpected filter {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_selectors() {
        assert!(matches!(
            "blur=2".parse::<Filter>(),
            Err(TrackError::UnknownSelector { kind: "filter", .. })
        ));
        assert!(matches!("skip".parse::<Filter>(), Err(TrackError::UnknownSelector { .. })));
        assert!(matches!("skip=0".parse::<Filter>(), Err(TrackError::InvalidParameter { .. })));
        assert!(matches!("skip=-3".parse::<Filter>(), Err(TrackError::InvalidParameter { .. })));
        assert!(matches!(
            "name-match-radius=far".parse::<Filter>(),
            Err(TrackError::InvalidParameter { .. })
        ));
        assert!(matches!(
            "name-match-radius=0".parse::<Filter>(),
            Err(TrackError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_display_round_trips_selector() {
        for selector in ["skip=7", "stopped", "name-match-radius=12.5"] {
            let filter: Filter = selector.parse().unwrap();
            assert_eq!(filter.to_string(), selector);
        }
    }

    #[test]
    fn test_apply_filters_in_sequence() {
        let a = GpsPoint::new(1.0, 1.0);
        let mut points = vec![a.clone(); 5];
        points.extend((1..=5).map(|i| GpsPoint::new(1.0 + i as f64 * 0.01, 1.0)));
        let input = vec![Path::new(points).with_name("run")];

        let filters: Vec<Filter> = vec!["stopped".parse().unwrap(), "skip=2".parse().unwrap()];
        let result = apply_filters(input.clone(), &filters).unwrap();

        // stopped: 10 -> 6 points, then skip=2 keeps indices 0, 2, 4, 5
        assert_eq!(result[0].len(), 4);
        assert_eq!(result[0].name.as_deref(), Some("run"));
        // input collection untouched
        assert_eq!(input[0].len(), 10);

        assert_eq!(apply_filters(input.clone(), &[]).unwrap(), input);
    }
}
