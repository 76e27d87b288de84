//! Ramer-Douglas-Peucker polyline simplification.
//!
//! Works on planar coordinates (`geo::Coord`) in whatever projection the caller
//! chose; `epsilon` is in the same units. Tile slicing feeds it
//! [`project_metric`](crate::geo_utils::project_metric) meters.
//!
//! Distances are measured to the infinite line through the chord endpoints, not
//! to the chord segment. A vertical chord (including a closed loop whose first
//! and last points coincide) measures the horizontal offset.

use geo::Coord;

/// Distance from `p` to the line through `start` and `end`.
pub fn perpendicular_distance(p: Coord, start: Coord, end: Coord) -> f64 {
    if start.x == end.x {
        return (p.x - start.x).abs();
    }
    let slope = (end.y - start.y) / (end.x - start.x);
    let intercept = start.y - slope * start.x;
    (slope * p.x - p.y + intercept).abs() / (slope * slope + 1.0).sqrt()
}

/// Indices of the points kept by Ramer-Douglas-Peucker, in input order.
///
/// Fewer than three points are all kept. The first and last index are always
/// kept. Re-running on the kept points with the same `epsilon` keeps them all.
pub fn simplify_indices(points: &[Coord], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    // explicit stack: long tracks would otherwise recurse once per kept point
    let mut stack = vec![(0, n - 1)];
    while let Some((first, last)) = stack.pop() {
        let mut max_distance = 0.0;
        let mut split = None;

        for i in first + 1..last {
            let d = perpendicular_distance(points[i], points[first], points[last]);
            if d > max_distance {
                max_distance = d;
                split = Some(i);
            }
        }

        if let Some(index) = split {
            if max_distance > epsilon {
                keep[index] = true;
                stack.push((index, last));
                stack.push((first, index));
            }
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, &kept)| kept.then_some(i))
        .collect()
}

/// Simplified copy of `points`.
///
/// # Example
///
/// ```rust
/// use geo::Coord;
/// use track_engine::simplify::simplify;
///
/// let line: Vec<Coord> = (0..10).map(|i| Coord { x: i as f64, y: 0.0 }).collect();
/// assert_eq!(simplify(&line, 0.5), vec![line[0], line[9]]);
/// ```
pub fn simplify(points: &[Coord], epsilon: f64) -> Vec<Coord> {
    simplify_indices(points, epsilon)
        .into_iter()
        .map(|i| points[i])
        .collect()
}
