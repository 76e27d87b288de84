//! Simplify a synthetic track at a few zoom-level tolerances.
//!
//! Run with: cargo run --example simplify_track

use track_engine::geo_utils::{meters_per_pixel, metric_coord, polyline_length};
use track_engine::simplify::simplify_indices;
use track_engine::{GpsPoint, Path, PathStats};

fn main() {
    // A wiggly loop around Lake Geneva's northern shore
    let points: Vec<GpsPoint> = (0..500)
        .map(|i| {
            let t = i as f64 / 500.0;
            let lat = 46.45 + 0.05 * (t * std::f64::consts::TAU).sin() + 0.0005 * (t * 300.0).sin();
            let lon = 6.40 + 0.40 * t;
            GpsPoint::new(lat, lon)
        })
        .collect();

    let path = Path::new(points).with_name("Shore ride");
    let length = polyline_length(&path.points).expect("distance converges");
    println!(
        "{}: {} points, {:.2} km\n",
        path.name.as_deref().unwrap_or("?"),
        path.len(),
        length / 1000.0
    );

    let coords: Vec<_> = path.points.iter().map(metric_coord).collect();
    let mean_lat = path.points.iter().map(|p| p.latitude).sum::<f64>() / path.len() as f64;

    println!("{:>5} {:>12} {:>8}", "zoom", "epsilon (m)", "kept");
    for zoom in [6, 10, 14, 18] {
        let epsilon = meters_per_pixel(40_075_000.0, mean_lat, zoom);
        let kept = simplify_indices(&coords, epsilon);
        println!("{:>5} {:>12.2} {:>8}", zoom, epsilon, kept.len());
    }

    println!("\n{}", PathStats::from_path(&path).expect("distance converges"));
}
