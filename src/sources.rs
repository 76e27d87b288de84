//! # Input Sources
//!
//! Parsers that turn recorded files into [`Path`]s.
//!
//! | Format | Extension | One `Path` per |
//! |--------|-----------|----------------|
//! | GPX tracks | `.gpx` | `<trk>`, segments concatenated |
//! | GPX routes | `.gpx` (with [`GpxKind::Routes`]) | `<rte>` |
//! | Columbus CSV | `.csv` | file |
//! | KML | `.kml` | `<LineString>` or `<LinearRing>` |
//!
//! Points with unusable coordinates and malformed CSV rows are logged and
//! dropped; only unreadable input fails the parse.

use std::io::Read;
use std::path::Path as FsPath;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use xml::{reader::XmlEvent, EventReader};

use crate::{GpsPoint, Path, Result, TrackError};

/// Which GPX elements become paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpxKind {
    #[default]
    Tracks,
    Routes,
}

/// A supported input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Gpx(GpxKind),
    /// CSV export of Columbus GPS loggers
    Columbus,
    Kml,
}

/// Transportation modes recognised in file names.
const TRANSPORTATION_MODES: [&str; 7] = ["plane", "train", "bus", "car", "ferry", "bike", "walk"];

impl InputFormat {
    /// Choose the format from the file extension.
    ///
    /// # Errors
    ///
    /// [`TrackError::UnknownFormat`] for anything but `.gpx`, `.csv` or `.kml`.
    pub fn from_path(path: &FsPath, gpx_kind: GpxKind) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("gpx") => Ok(InputFormat::Gpx(gpx_kind)),
            Some("csv") => Ok(InputFormat::Columbus),
            Some("kml") => Ok(InputFormat::Kml),
            _ => Err(TrackError::UnknownFormat(path.display().to_string())),
        }
    }

    /// Parse `reader`, tagging every path with `transportation`.
    pub fn parse<R: Read>(&self, reader: R, transportation: Option<&str>) -> Result<Vec<Path>> {
        let paths = match self {
            InputFormat::Gpx(kind) => parse_gpx(reader, *kind)?,
            InputFormat::Columbus => parse_columbus(reader)?,
            InputFormat::Kml => parse_kml(reader)?,
        };
        Ok(paths
            .into_iter()
            .map(|p| p.with_transportation_mode(transportation))
            .collect())
    }
}

/// Transportation mode named in a file name, e.g. `2019-05-train-paris.gpx`.
///
/// When several modes appear the last one wins.
pub fn transportation_from_file_name(name: &str) -> Option<&'static str> {
    TRANSPORTATION_MODES
        .iter()
        .filter_map(|mode| name.rfind(mode).map(|at| (at, *mode)))
        .max_by_key(|(at, _)| *at)
        .map(|(_, mode)| mode)
}

/// Parse a coordinate, either a plain decimal or a decimal with a
/// hemisphere suffix (`12.5N`, `3.25W`).
pub fn parse_latlon(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(v) = value.parse::<f64>() {
        return Some(v);
    }

    let (at, hemisphere) = value.char_indices().last()?;
    let magnitude: f64 = value[..at].trim().parse().ok()?;
    match hemisphere {
        'N' | 'E' => Some(magnitude),
        'S' | 'W' => Some(-magnitude),
        _ => None,
    }
}

// =============================================================================
// GPX
// =============================================================================

fn parse_gpx<R: Read>(reader: R, kind: GpxKind) -> Result<Vec<Path>> {
    let gpx = gpx::read(reader)?;

    let raw: Vec<(Option<String>, Vec<gpx::Waypoint>)> = match kind {
        GpxKind::Tracks => gpx
            .tracks
            .into_iter()
            .map(|track| {
                let points = track.segments.into_iter().flat_map(|s| s.points).collect();
                (track.name, points)
            })
            .collect(),
        GpxKind::Routes => gpx
            .routes
            .into_iter()
            .map(|route| (route.name, route.points))
            .collect(),
    };

    let mut dropped = 0;
    let paths: Vec<Path> = raw
        .into_iter()
        .map(|(name, waypoints)| {
            let points: Vec<GpsPoint> = waypoints
                .into_iter()
                .filter_map(|wp| {
                    let point = waypoint_to_point(wp);
                    if point.is_valid() {
                        Some(point)
                    } else {
                        warn!(
                            "[Sources] Dropping GPX point with invalid coordinates ({}, {})",
                            point.latitude, point.longitude
                        );
                        dropped += 1;
                        None
                    }
                })
                .collect();
            let path = Path::new(points);
            match name {
                Some(name) => path.with_name(name.trim()),
                None => path,
            }
        })
        .collect();

    info!(
        "[Sources] GPX: {} paths, {} points ({} dropped)",
        paths.len(),
        paths.iter().map(Path::len).sum::<usize>(),
        dropped
    );
    Ok(paths)
}

fn waypoint_to_point(wp: gpx::Waypoint) -> GpsPoint {
    let (lon, lat) = wp.point().x_y();
    GpsPoint {
        latitude: lat,
        longitude: lon,
        elevation: wp.elevation,
        timestamp: wp.time.and_then(to_utc),
        name: wp.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    }
}

fn to_utc(time: gpx::Time) -> Option<DateTime<Utc>> {
    let t = time::OffsetDateTime::from(time);
    DateTime::<Utc>::from_timestamp(t.unix_timestamp(), t.nanosecond())
}

// =============================================================================
// Columbus CSV
// =============================================================================

fn parse_columbus<R: Read>(mut reader: R) -> Result<Vec<Path>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    bytes.retain(|&b| b != 0);
    let text = String::from_utf8_lossy(&bytes);

    let mut points = Vec::new();
    let mut skipped = 0;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("INDEX") {
            continue;
        }
        match columbus_row(line) {
            Some(point) => points.push(point),
            None => {
                warn!("[Sources] Skipping malformed CSV row {}: {}", line_no + 1, line);
                skipped += 1;
            }
        }
    }

    info!("[Sources] Columbus CSV: {} points ({} skipped)", points.len(), skipped);
    Ok(vec![Path::new(points)])
}

fn columbus_row(line: &str) -> Option<GpsPoint> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 7 {
        return None;
    }

    let stamp = format!("{}{}", fields[2], fields[3]);
    let timestamp = NaiveDateTime::parse_from_str(&stamp, "%y%m%d%H%M%S")
        .ok()?
        .and_utc();
    let latitude = parse_latlon(fields[4])?;
    let longitude = parse_latlon(fields[5])?;
    let elevation: i64 = fields[6].parse().ok()?;

    let point = GpsPoint::new(latitude, longitude)
        .with_elevation(elevation as f64)
        .with_timestamp(timestamp);
    point.is_valid().then_some(point)
}

// =============================================================================
// KML
// =============================================================================

fn is_line_element(local_name: &str) -> bool {
    matches!(local_name, "LineString" | "LinearRing")
}

fn parse_kml<R: Read>(reader: R) -> Result<Vec<Path>> {
    let mut paths = Vec::new();
    let mut line: Option<Vec<GpsPoint>> = None;
    let mut coordinates: Option<String> = None;
    let mut skipped = 0;

    for event in EventReader::new(reader) {
        match event? {
            XmlEvent::StartElement { name, .. } => {
                if is_line_element(&name.local_name) {
                    line = Some(Vec::new());
                } else if name.local_name == "coordinates" && line.is_some() {
                    coordinates = Some(String::new());
                }
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                if let Some(buffer) = coordinates.as_mut() {
                    buffer.push_str(&text);
                }
            }
            XmlEvent::EndElement { name } => {
                if name.local_name == "coordinates" {
                    if let (Some(text), Some(points)) = (coordinates.take(), line.as_mut()) {
                        for token in text.split_whitespace() {
                            match kml_coordinate(token) {
                                Some(point) => points.push(point),
                                None => {
                                    warn!("[Sources] Skipping KML coordinate '{}'", token);
                                    skipped += 1;
                                }
                            }
                        }
                    }
                } else if is_line_element(&name.local_name) {
                    if let Some(points) = line.take() {
                        paths.push(Path::new(points));
                    }
                }
            }
            _ => {}
        }
    }

    info!(
        "[Sources] KML: {} paths, {} points ({} skipped)",
        paths.len(),
        paths.iter().map(Path::len).sum::<usize>(),
        skipped
    );
    Ok(paths)
}

/// One `lon,lat[,ele]` tuple.
fn kml_coordinate(token: &str) -> Option<GpsPoint> {
    let mut fields = token.split(',').map(|f| f.trim().parse::<f64>());
    let longitude = fields.next()?.ok()?;
    let latitude = fields.next()?.ok()?;
    let elevation = fields.next().transpose().ok()?;
    if fields.next().is_some() {
        return None;
    }

    let point = GpsPoint::new(latitude, longitude);
    let point = match elevation {
        Some(e) => point.with_elevation(e),
        None => point,
    };
    point.is_valid().then_some(point)
}
