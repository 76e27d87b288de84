//! Output selectors and the text renderers.
//!
//! An output is chosen once from its selector string, before any input is read:
//!
//! | Selector | Output |
//! |----------|--------|
//! | `stats` | [`PathStats`] per path |
//! | `wkt[:path,points]` | one WKT `GEOMETRYCOLLECTION` |
//! | `kml[:path,points]` | one KML document, a folder per path |
//! | `geojson-tiles` | a directory of tiles, see [`crate::tiles`] |

use std::io::Write;
use std::str::FromStr;

use crate::stats::PathStats;
use crate::{GpsPoint, Path, Result, TrackError};

/// What a drawing renderer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Draw each path as a line
    pub draw_path: bool,
    /// Draw each sample as a point
    pub draw_points: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            draw_path: true,
            draw_points: false,
        }
    }
}

impl FromStr for RenderOptions {
    type Err = TrackError;

    /// Comma-separated list of `path` and `points`. An empty list keeps the default.
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut options = Self {
            draw_path: false,
            draw_points: false,
        };
        for item in s.split(',').map(str::trim) {
            match item {
                "path" => options.draw_path = true,
                "points" => options.draw_points = true,
                other => {
                    return Err(TrackError::UnknownSelector {
                        kind: "render option",
                        value: other.to_string(),
                    })
                }
            }
        }
        Ok(options)
    }
}

/// A back end selected from its textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSelector {
    Stats,
    Wkt(RenderOptions),
    Kml(RenderOptions),
    GeoJsonTiles,
}

impl FromStr for OutputSelector {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, options) = match s.split_once(':') {
            Some((name, options)) => (name, Some(options)),
            None => (s, None),
        };
        match (name, options) {
            ("stats", None) => Ok(OutputSelector::Stats),
            ("geojson-tiles", None) => Ok(OutputSelector::GeoJsonTiles),
            ("wkt", options) => Ok(OutputSelector::Wkt(options.unwrap_or("").parse()?)),
            ("kml", options) => Ok(OutputSelector::Kml(options.unwrap_or("").parse()?)),
            _ => Err(TrackError::UnknownSelector {
                kind: "output",
                value: s.to_string(),
            }),
        }
    }
}

fn wkt_coord(point: &GpsPoint) -> String {
    format!("{} {}", point.longitude, point.latitude)
}

fn wkt_linestring(path: &Path) -> String {
    if path.is_empty() {
        return "LINESTRING EMPTY".to_string();
    }
    let coords: Vec<String> = path.points.iter().map(wkt_coord).collect();
    format!("LINESTRING ({})", coords.join(", "))
}

/// Write all paths as one WKT `GEOMETRYCOLLECTION`, coordinates as `lon lat`.
pub fn write_wkt<W: Write>(paths: &[Path], options: RenderOptions, mut sink: W) -> Result<()> {
    let mut members: Vec<String> = Vec::new();
    for path in paths {
        if options.draw_points {
            members.extend(path.points.iter().map(|p| format!("POINT ({})", wkt_coord(p))));
        }
        if options.draw_path {
            members.push(wkt_linestring(path));
        }
    }

    writeln!(sink, "GEOMETRYCOLLECTION ({})", members.join(", "))?;
    Ok(())
}

// =============================================================================
// KML
// =============================================================================

const TRACK_ICON: &str =
    "http://earth.google.com/images/kml-icons/track-directional/track-none.png";

fn kml_header() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
<Document>
<Style id="track_n">
  <LabelStyle><scale>0</scale></LabelStyle>
  <IconStyle><scale>.5</scale><Icon><href>{TRACK_ICON}</href></Icon></IconStyle>
</Style>
<Style id="track_h">
  <IconStyle><scale>1.2</scale><Icon><href>{TRACK_ICON}</href></Icon></IconStyle>
</Style>
<StyleMap id="track">
  <Pair><key>normal</key><styleUrl>#track_n</styleUrl></Pair>
  <Pair><key>highlight</key><styleUrl>#track_h</styleUrl></Pair>
</StyleMap>
<Style id="line">
  <LineStyle><color>99ffac59</color><width>6</width></LineStyle>
</Style>
"#
    )
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn kml_placemark(point: &GpsPoint) -> String {
    let mut coordinates = format!("{},{}", point.longitude, point.latitude);
    if let Some(elevation) = point.elevation {
        coordinates.push_str(&format!(",{elevation}"));
    }
    let timestamp = point
        .timestamp
        .map(|t| format!("<TimeStamp><when>{}</when></TimeStamp>", t.format("%Y-%m-%dT%H:%M:%SZ")))
        .unwrap_or_default();
    format!(
        "<Placemark><name>{}</name><styleUrl>#track</styleUrl>\
         <Point><coordinates>{}</coordinates></Point>{}</Placemark>",
        xml_escape(point.name.as_deref().unwrap_or("")),
        coordinates,
        timestamp
    )
}

/// Write all paths as one KML document.
///
/// Each path gets a folder named after it, or `Track N` (1-based) when it has
/// no name. Points become styled placemarks carrying elevation and time when
/// known; the path becomes a tessellated `LineString`.
pub fn write_kml<W: Write>(paths: &[Path], options: RenderOptions, mut sink: W) -> Result<()> {
    sink.write_all(kml_header().as_bytes())?;
    writeln!(sink, "<Folder><name>Tracks</name>")?;
    for (i, path) in paths.iter().enumerate() {
        let name = match &path.name {
            Some(name) => xml_escape(name),
            None => format!("Track {}", i + 1),
        };
        writeln!(sink, "<Folder><name>{name}</name>")?;

        if options.draw_points {
            writeln!(sink, "<Folder><name>Points</name>")?;
            for point in &path.points {
                writeln!(sink, "{}", kml_placemark(point))?;
            }
            writeln!(sink, "</Folder>")?;
        }
        if options.draw_path {
            writeln!(
                sink,
                "<Placemark><name>Path</name><styleUrl>#line</styleUrl>\
                 <LineString><tessellate>1</tessellate><coordinates>"
            )?;
            for point in &path.points {
                writeln!(sink, "{},{}", point.longitude, point.latitude)?;
            }
            writeln!(sink, "</coordinates></LineString></Placemark>")?;
        }
        writeln!(sink, "</Folder>")?;
    }
    writeln!(sink, "</Folder>")?;
    write!(sink, "</Document></kml>")?;
    Ok(())
}

/// Write the statistics of every path, separated by blank lines.
///
/// # Errors
///
/// Fails on the first path whose distance cannot be computed, or on I/O.
pub fn write_stats<W: Write>(paths: &[Path], mut sink: W) -> Result<()> {
    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            writeln!(sink)?;
        }
        write!(sink, "{}", PathStats::from_path(path)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(paths: &[Path], options: RenderOptions) -> String {
        let mut out = Vec::new();
        write_wkt(paths, options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn sample() -> Vec<Path> {
        vec![
            Path::new(vec![GpsPoint::new(51.5, -0.12), GpsPoint::new(51.6, -0.1)]),
            Path::new(vec![GpsPoint::new(48.85, 2.35)]),
        ]
    }

    #[test]
    fn test_parse_output_selectors() {
        assert_eq!("stats".parse::<OutputSelector>().unwrap(), OutputSelector::Stats);
        assert_eq!(
            "geojson-tiles".parse::<OutputSelector>().unwrap(),
            OutputSelector::GeoJsonTiles
        );
        assert_eq!(
            "wkt".parse::<OutputSelector>().unwrap(),
            OutputSelector::Wkt(RenderOptions::default())
        );
        assert_eq!(
            "wkt:points".parse::<OutputSelector>().unwrap(),
            OutputSelector::Wkt(RenderOptions {
                draw_path: false,
                draw_points: true
            })
        );
        assert_eq!(
            "wkt:path,points".parse::<OutputSelector>().unwrap(),
            OutputSelector::Wkt(RenderOptions {
                draw_path: true,
                draw_points: true
            })
        );
        assert_eq!(
            "kml".parse::<OutputSelector>().unwrap(),
            OutputSelector::Kml(RenderOptions::default())
        );
        assert_eq!(
            "kml:points".parse::<OutputSelector>().unwrap(),
            OutputSelector::Kml(RenderOptions {
                draw_path: false,
                draw_points: true
            })
        );
    }

    #[test]
    fn test_unknown_selectors_rejected() {
        for bad in ["svg", "stats:points", "geojson-tiles:path", ""] {
            assert!(matches!(
                bad.parse::<OutputSelector>(),
                Err(TrackError::UnknownSelector { kind: "output", .. })
            ));
        }
        for bad in ["wkt:lines", "kml:polygons"] {
            assert!(matches!(
                bad.parse::<OutputSelector>(),
                Err(TrackError::UnknownSelector { kind: "render option", .. })
            ));
        }
    }

    #[test]
    fn test_wkt_paths_only() {
        assert_eq!(
            render(&sample(), RenderOptions::default()),
            "GEOMETRYCOLLECTION (LINESTRING (-0.12 51.5, -0.1 51.6), LINESTRING (2.35 48.85))\n"
        );
    }

    #[test]
    fn test_wkt_points_and_paths() {
        let options = RenderOptions {
            draw_path: true,
            draw_points: true,
        };
        let text = render(&sample()[..1], options);
        assert_eq!(
            text,
            concat!(
                "GEOMETRYCOLLECTION (POINT (-0.12 51.5), POINT (-0.1 51.6), ",
                "LINESTRING (-0.12 51.5, -0.1 51.6))\n"
            )
        );
    }

    #[test]
    fn test_wkt_empty() {
        assert_eq!(render(&[], RenderOptions::default()), "GEOMETRYCOLLECTION ()\n");
        assert_eq!(
            render(&[Path::default()], RenderOptions::default()),
            "GEOMETRYCOLLECTION (LINESTRING EMPTY)\n"
        );
    }

    #[test]
    fn test_write_stats_per_path() {
        let mut out = Vec::new();
        write_stats(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("points: ").count(), 2);
        assert!(text.contains("points: 1, has elevation: false, has time: false"));
        assert!(text.contains("\n\npoints: 1"));
    }

    fn render_kml(paths: &[Path], options: RenderOptions) -> String {
        let mut out = Vec::new();
        write_kml(paths, options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_kml_folders_and_path() {
        let mut paths = sample();
        paths[0] = paths[0].clone().with_name("Fish & Chips");
        let text = render_kml(&paths, RenderOptions::default());

        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<kml "));
        assert!(text.ends_with("</Folder>\n</Folder>\n</Document></kml>"));
        assert!(text.contains(concat!(
            "<Folder><name>Tracks</name>\n",
            "<Folder><name>Fish &amp; Chips</name>\n"
        )));
        assert!(text.contains("<Folder><name>Track 2</name>\n"));
        assert!(text.contains(concat!(
            "<LineString><tessellate>1</tessellate><coordinates>\n",
            "-0.12,51.5\n-0.1,51.6\n</coordinates></LineString></Placemark>\n"
        )));
        assert_eq!(text.matches("<name>Path</name>").count(), 2);
        assert!(!text.contains("<name>Points</name>"));
    }

    #[test]
    fn test_kml_point_placemarks() {
        use chrono::{TimeZone, Utc};

        let when = Utc.with_ymd_and_hms(2021, 6, 1, 8, 30, 0).unwrap();
        let path = Path::new(vec![
            GpsPoint::new(46.5, 6.6).with_name("Hut").with_elevation(2100.0).with_timestamp(when),
            GpsPoint::new(46.6, 6.7),
        ]);
        let options = RenderOptions {
            draw_path: false,
            draw_points: true,
        };
        let text = render_kml(&[path], options);

        assert!(text.contains(concat!(
            "<Folder><name>Points</name>\n",
            "<Placemark><name>Hut</name><styleUrl>#track</styleUrl>",
            "<Point><coordinates>6.6,46.5,2100</coordinates></Point>",
            "<TimeStamp><when>2021-06-01T08:30:00Z</when></TimeStamp></Placemark>\n",
            "<Placemark><name></name><styleUrl>#track</styleUrl>",
            "<Point><coordinates>6.7,46.6</coordinates></Point></Placemark>\n",
            "</Folder>\n"
        )));
        assert!(!text.contains("<LineString>"));
    }
}
