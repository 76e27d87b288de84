//! Parse a GPX document, filter it and write GeoJSON tiles to a temporary directory.
//!
//! Run with: cargo run --example tile_export

use track_engine::{apply_filters, Filter, GpxKind, InputFormat, TileConfig, TileSlicer};

const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="tile_export">
  <trk>
    <name>Thames walk</name>
    <trkseg>
      <trkpt lat="51.5007" lon="-0.1246"><ele>5</ele></trkpt>
      <trkpt lat="51.5007" lon="-0.1246"><ele>5</ele></trkpt>
      <trkpt lat="51.5033" lon="-0.1195"><ele>6</ele></trkpt>
      <trkpt lat="51.5080" lon="-0.1150"><ele>7</ele></trkpt>
      <trkpt lat="51.5081" lon="-0.0990"><ele>6</ele></trkpt>
      <trkpt lat="51.5076" lon="-0.0870"><ele>5</ele></trkpt>
      <trkpt lat="51.5055" lon="-0.0754"><ele>4</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

fn main() -> track_engine::Result<()> {
    let paths = InputFormat::Gpx(GpxKind::Tracks).parse(GPX.as_bytes(), Some("walk"))?;

    let filters: Vec<Filter> = vec!["stopped".parse()?];
    let paths = apply_filters(paths, &filters)?;

    let config = TileConfig {
        min_zoom: 8,
        max_zoom: 16,
        ..TileConfig::default()
    };
    let tiles = TileSlicer::new(config)?.slice(&paths);

    for (key, features) in tiles.iter() {
        let points: usize = features.iter().map(|f| f.line.0.len()).sum();
        println!("{:<22} {} features, {} points", key.file_name(), features.len(), points);
    }

    let dir = std::env::temp_dir().join("track-engine-tiles");
    let written = tiles.write_to_dir(&dir)?;
    println!("\n{} tiles written to {}", written, dir.display());
    Ok(())
}
