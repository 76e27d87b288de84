//! Per-path summary statistics.
//!
//! Distances are geodesic (see [`crate::geo_utils::distance`]). Timing figures
//! are only available when the path carries timestamps, elevation figures only
//! when it carries elevations.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::geo_utils::distance;
use crate::{GpsPoint, Path, Result};

/// Time-derived figures of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    /// Latest minus earliest timestamp
    pub duration: Duration,
    /// Sum of intervals over which the position changed
    pub moving: Duration,
    /// Sum of intervals over which the position did not change
    pub stopped: Duration,
    /// Total distance over total duration, km/h
    pub average_speed_kmh: Option<f64>,
    /// Total distance over moving time, km/h
    pub average_moving_speed_kmh: Option<f64>,
    /// Seconds of duration per recorded point
    pub resolution_s: f64,
}

/// Elevation figures over the points that carry one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Summary of one [`Path`].
#[derive(Debug, Clone, PartialEq)]
pub struct PathStats {
    pub name: Option<String>,
    pub point_count: usize,
    pub has_elevation: bool,
    pub has_time: bool,
    /// Sum of consecutive geodesic distances, meters
    pub distance_m: f64,
    pub timing: Option<TimingStats>,
    pub elevation: Option<ElevationStats>,
}

impl PathStats {
    /// # Errors
    ///
    /// [`crate::TrackError::Computation`] when a step distance does not converge.
    pub fn from_path(path: &Path) -> Result<Self> {
        let points = &path.points;

        let steps = points
            .windows(2)
            .map(|w| distance(&w[0], &w[1]))
            .collect::<Result<Vec<f64>>>()?;
        let distance_m = steps.iter().sum();

        let timing = timing_stats(points, &steps, distance_m);
        let elevation = elevation_stats(points);

        Ok(Self {
            name: path.name.clone(),
            point_count: points.len(),
            has_elevation: elevation.is_some(),
            has_time: timing.is_some(),
            distance_m,
            timing,
            elevation,
        })
    }
}

fn timing_stats(points: &[GpsPoint], steps: &[f64], distance_m: f64) -> Option<TimingStats> {
    let times: Vec<DateTime<Utc>> = points.iter().filter_map(|p| p.timestamp).collect();
    let earliest = times.iter().min()?;
    let latest = times.iter().max()?;
    let duration = *latest - *earliest;

    let mut moving = Duration::zero();
    let mut stopped = Duration::zero();
    for (pair, &step) in points.windows(2).zip(steps) {
        if let (Some(t0), Some(t1)) = (pair[0].timestamp, pair[1].timestamp) {
            if step != 0.0 {
                moving = moving + (t1 - t0);
            } else {
                stopped = stopped + (t1 - t0);
            }
        }
    }

    let speed = |d: Duration| {
        let seconds = d.num_milliseconds() as f64 / 1000.0;
        (seconds > 0.0).then(|| distance_m / seconds * 3.6)
    };

    Some(TimingStats {
        duration,
        moving,
        stopped,
        average_speed_kmh: speed(duration),
        average_moving_speed_kmh: speed(moving),
        resolution_s: duration.num_milliseconds() as f64 / 1000.0 / points.len() as f64,
    })
}

fn elevation_stats(points: &[GpsPoint]) -> Option<ElevationStats> {
    let elevations: Vec<f64> = points.iter().filter_map(|p| p.elevation).collect();
    if elevations.is_empty() {
        return None;
    }

    let n = elevations.len() as f64;
    let mean = elevations.iter().sum::<f64>() / n;
    let variance = elevations.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;

    Some(ElevationStats {
        min: elevations.iter().copied().fold(f64::INFINITY, f64::min),
        max: elevations.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
        std_dev: variance.sqrt(),
    })
}

/// `H:MM:SS`, hours unbounded.
fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!("{}{}:{:02}:{:02}", sign, total / 3600, (total % 3600) / 60, total % 60)
}

fn format_speed(speed: Option<f64>) -> String {
    match speed {
        Some(kmh) => format!("{kmh:.2}km/h"),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for PathStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "path: {name}")?;
        }
        writeln!(
            f,
            "points: {}, has elevation: {}, has time: {}",
            self.point_count, self.has_elevation, self.has_time
        )?;
        writeln!(f, "dist: {:.2}km", self.distance_m / 1000.0)?;

        if let Some(t) = &self.timing {
            writeln!(f, "time: {}", format_duration(t.duration))?;
            writeln!(f, "avg speed: {}", format_speed(t.average_speed_kmh))?;
            writeln!(f, "moving time: {}", format_duration(t.moving))?;
            writeln!(f, "stopped time: {}", format_duration(t.stopped))?;
            writeln!(f, "avg speed when moving: {}", format_speed(t.average_moving_speed_kmh))?;
            writeln!(f, "resolution: {:.2} s/point", t.resolution_s)?;
        }

        if let Some(e) = &self.elevation {
            writeln!(
                f,
                "min ele: {:.2}m; max ele: {:.2}m; avg ele: {:.2}m; ele std dev: {:.2}m",
                e.min, e.max, e.mean, e.std_dev
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_empty_path_zeroed() {
        let stats = PathStats::from_path(&Path::default()).unwrap();
        assert_eq!(stats.point_count, 0);
        assert_eq!(stats.distance_m, 0.0);
        assert!(!stats.has_time);
        assert!(!stats.has_elevation);
        assert!(stats.timing.is_none());
        assert!(stats.elevation.is_none());
    }

    #[test]
    fn test_distance_only() {
        // one degree of longitude along the equator
        let path = Path::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)]);
        let stats = PathStats::from_path(&path).unwrap();
        assert_eq!(stats.point_count, 2);
        assert!((stats.distance_m - 111_319.49).abs() < 0.01);
        assert!(stats.timing.is_none());
    }

    #[test]
    fn test_moving_and_stopped_time() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 0.01);
        let path = Path::new(vec![
            a.clone().with_timestamp(at(0)),
            b.clone().with_timestamp(at(60)),
            b.clone().with_timestamp(at(180)),
            a.clone().with_timestamp(at(240)),
        ]);

        let stats = PathStats::from_path(&path).unwrap();
        let timing = stats.timing.unwrap();
        assert_eq!(timing.duration, Duration::seconds(240));
        assert_eq!(timing.moving, Duration::seconds(120));
        assert_eq!(timing.stopped, Duration::seconds(120));
        assert_eq!(timing.resolution_s, 60.0);

        let avg = timing.average_speed_kmh.unwrap();
        let moving = timing.average_moving_speed_kmh.unwrap();
        assert!((moving - 2.0 * avg).abs() < 1e-9);
        assert!((avg - stats.distance_m / 240.0 * 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_speed_absent_without_elapsed_time() {
        let p = GpsPoint::new(10.0, 10.0).with_timestamp(at(0));
        let path = Path::new(vec![p.clone(), p]);
        let timing = PathStats::from_path(&path).unwrap().timing.unwrap();
        assert_eq!(timing.duration, Duration::zero());
        assert!(timing.average_speed_kmh.is_none());
        assert!(timing.average_moving_speed_kmh.is_none());
    }

    #[test]
    fn test_elevation_figures() {
        let path = Path::new(vec![
            GpsPoint::new(0.0, 0.0).with_elevation(100.0),
            GpsPoint::new(0.0, 0.001),
            GpsPoint::new(0.0, 0.002).with_elevation(300.0),
        ]);
        let e = PathStats::from_path(&path).unwrap().elevation.unwrap();
        assert_eq!(e.min, 100.0);
        assert_eq!(e.max, 300.0);
        assert_eq!(e.mean, 200.0);
        assert_eq!(e.std_dev, 100.0);
    }

    #[test]
    fn test_display_lines() {
        let path = Path::new(vec![
            GpsPoint::new(0.0, 0.0).with_elevation(10.0).with_timestamp(at(0)),
            GpsPoint::new(0.0, 1.0).with_elevation(20.0).with_timestamp(at(3600)),
        ])
        .with_name("Ride");

        let text = PathStats::from_path(&path).unwrap().to_string();
        assert!(text.starts_with("path: Ride\n"));
        assert!(text.contains("points: 2, has elevation: true, has time: true\n"));
        assert!(text.contains("dist: 111.32km\n"));
        assert!(text.contains("time: 1:00:00\n"));
        assert!(text.contains("avg speed: 111.32km/h\n"));
        assert!(text.contains("resolution: 1800.00 s/point\n"));
        assert!(text.contains(
            "min ele: 10.00m; max ele: 20.00m; avg ele: 15.00m; ele std dev: 5.00m\n"
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(59)), "0:00:59");
        assert_eq!(format_duration(Duration::seconds(90_061)), "25:01:01");
    }
}
