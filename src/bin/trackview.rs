//! trackview: load GPS tracks, filter them, and render statistics, WKT or map tiles.
//!
//! ```text
//! trackview -f stopped -f skip=2 -o geojson-tiles --out-dir tiles rides/*.gpx
//! trackview -o stats commute.csv
//! trackview -f name-match-radius=40 -o wkt:path,points survey.gpx
//! trackview -o kml:path,points trip-train.kml > trip.kml
//! ```
//!
//! Exit status is 0 on success and 65 when an input cannot be used at all (unparsable
//! GPX or KML, a distance that does not converge). Any other failure exits with 1.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use log::{debug, error, info};

use track_engine::render::{write_kml, write_stats, write_wkt};
use track_engine::sources::transportation_from_file_name;
use track_engine::{
    apply_filters, Bounds, Filter, GpxKind, InputFormat, MapCanvas, OutputSelector, Path,
    TileConfig, TileSlicer, TrackError,
};

/// Status for input that is unusable for the whole run (`EX_DATAERR`).
const EXIT_FATAL_INPUT: u8 = 65;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "GPS track filtering, statistics and tile generation",
    long_about = None
)]
struct Cli {
    /// GPX, KML or Columbus CSV files to load
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Filter to apply, in order: skip=N, stopped, name-match-radius=R
    #[arg(short = 'f', long = "filter")]
    filters: Vec<Filter>,

    /// Output: stats, wkt[:path,points], kml[:path,points], geojson-tiles
    #[arg(short, long)]
    output: OutputSelector,

    /// Read GPX routes instead of tracks
    #[arg(long, action = ArgAction::SetTrue)]
    routes: bool,

    /// Lowest tile zoom level (overrides --tile-config)
    #[arg(long)]
    min_zoom: Option<u32>,

    /// Highest tile zoom level (overrides --tile-config)
    #[arg(long)]
    max_zoom: Option<u32>,

    /// Directory receiving the tile files
    #[arg(long, default_value = "tiles", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Tile configuration JSON file
    #[arg(long, value_hint = ValueHint::FilePath)]
    tile_config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn load_tile_config(cli: &Cli) -> Result<TileConfig> {
    let mut config = match &cli.tile_config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening tile config {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing tile config {}", path.display()))?
        }
        None => TileConfig::default(),
    };
    if let Some(zoom) = cli.min_zoom {
        config.min_zoom = zoom;
    }
    if let Some(zoom) = cli.max_zoom {
        config.max_zoom = zoom;
    }
    Ok(config)
}

fn load_paths(cli: &Cli) -> Result<Vec<Path>> {
    let kind = if cli.routes { GpxKind::Routes } else { GpxKind::Tracks };

    // resolve every format before reading anything
    let formats = cli
        .inputs
        .iter()
        .map(|input| InputFormat::from_path(input, kind))
        .collect::<track_engine::Result<Vec<_>>>()?;

    let mut paths = Vec::new();
    for (input, format) in cli.inputs.iter().zip(formats) {
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let transportation = transportation_from_file_name(&file_name);

        let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
        let parsed = format
            .parse(BufReader::new(file), transportation)
            .with_context(|| format!("reading {}", input.display()))?;
        debug!("[Sources] {}: {} paths ({:?})", input.display(), parsed.len(), transportation);
        paths.extend(parsed);
    }
    Ok(paths)
}

fn run(cli: &Cli) -> Result<()> {
    let start = Instant::now();

    // tile settings are validated up front as well
    let slicer = match cli.output {
        OutputSelector::GeoJsonTiles => Some(TileSlicer::new(load_tile_config(cli)?)?),
        _ => None,
    };

    let paths = load_paths(cli)?;
    info!(
        "[trackview] Loaded {} paths, {} points",
        paths.len(),
        paths.iter().map(Path::len).sum::<usize>()
    );

    let paths = apply_filters(paths, &cli.filters)?;

    match (cli.output, slicer) {
        (OutputSelector::Stats, _) => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            write_stats(&paths, &mut out)?;
            out.flush()?;
        }
        (OutputSelector::Wkt(options), _) => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            write_wkt(&paths, options, &mut out)?;
            out.flush()?;
        }
        (OutputSelector::Kml(options), _) => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            write_kml(&paths, options, &mut out)?;
            out.flush()?;
        }
        (OutputSelector::GeoJsonTiles, Some(slicer)) => {
            if let Some(bounds) = Bounds::from_paths(&paths) {
                let zoom = MapCanvas::default().zoom_for(&bounds)?;
                info!("[trackview] Whole collection fits a 1024px view at zoom {}", zoom);
            }
            let tiles = slicer.slice(&paths);
            let written = tiles.write_to_dir(&cli.out_dir)?;
            println!("{} tiles written to {}", written, cli.out_dir.display());
        }
        (OutputSelector::GeoJsonTiles, None) => bail!("tile slicer not configured"),
    }

    info!("[trackview] Done in {}ms", start.elapsed().as_millis());
    Ok(())
}

fn exit_status(err: &anyhow::Error) -> u8 {
    let fatal = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<TrackError>())
        .any(TrackError::is_fatal_input);
    if fatal {
        EXIT_FATAL_INPUT
    } else {
        1
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}
