//! # Name-Match Clustering
//!
//! Merges repeated observations of the same named waypoint. Points that share a
//! `name` and lie within a radius of one another are grouped, and every point is
//! moved to the centroid of its group. Unnamed points form a partition of
//! their own and are clustered like any other name.
//!
//! ## Algorithm
//! 1. Partition all points of all paths by `name`
//! 2. Within a partition, walk points in input order. Each point joins the group
//!    whose current centroid is nearest, if that centroid is within `radius_m`
//!    (geodesic); otherwise it starts a new group
//! 3. Centroids are the arithmetic mean of member latitudes and longitudes
//! 4. Every point is reassigned to its nearest final centroid
//!
//! Steps 2 and 4 use the same nearest-centroid rule, measured on the
//! ellipsoid. An R-tree over spherical-mercator coordinates proposes the
//! closest few centroids; mercator scale grows with latitude, so these are
//! re-ranked by ellipsoidal distance before one is picked.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{project_metric, Ellipsoid};
use crate::{GpsPoint, Path, Result, TrackError};

/// Planar nearest neighbours re-ranked by ellipsoidal distance.
const NEAREST_CANDIDATES: usize = 4;

/// Configuration for name-match clustering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Maximum distance between a point and a group centroid to join it (meters)
    pub radius_m: f64,
    /// Ellipsoid used for the radius test
    pub ellipsoid: Ellipsoid,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_m: 50.0,
            ellipsoid: Ellipsoid::WGS84,
        }
    }
}

// =============================================================================
// R-tree Indexed Centroid
// =============================================================================

/// A group centroid in mercator meters, tagged with its group index
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedCentroid {
    group: usize,
    x: f64,
    y: f64,
}

impl RTreeObject for IndexedCentroid {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for IndexedCentroid {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Running mean of a group's member coordinates
#[derive(Debug, Clone, Copy)]
struct Group {
    sum_lat: f64,
    sum_lng: f64,
    count: usize,
}

impl Group {
    fn new(point: &GpsPoint) -> Self {
        Self {
            sum_lat: point.latitude,
            sum_lng: point.longitude,
            count: 1,
        }
    }

    fn add(&mut self, point: &GpsPoint) {
        self.sum_lat += point.latitude;
        self.sum_lng += point.longitude;
        self.count += 1;
    }

    fn centroid(&self) -> GpsPoint {
        GpsPoint::new(self.sum_lat / self.count as f64, self.sum_lng / self.count as f64)
    }

    fn indexed(&self, group: usize) -> IndexedCentroid {
        let c = self.centroid();
        let (x, y) = project_metric(c.latitude, c.longitude);
        IndexedCentroid { group, x, y }
    }
}

fn query(point: &GpsPoint) -> [f64; 2] {
    let (x, y) = project_metric(point.latitude, point.longitude);
    [x, y]
}

// =============================================================================
// Clusterer
// =============================================================================

/// The name-match filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PointClusterer {
    config: ClusterConfig,
}

impl PointClusterer {
    /// # Errors
    ///
    /// [`TrackError::InvalidParameter`] unless the radius is positive and finite.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        if !(config.radius_m.is_finite() && config.radius_m > 0.0) {
            return Err(TrackError::invalid(
                "cluster radius",
                format!("{} m, expected a positive distance", config.radius_m),
            ));
        }
        Ok(Self { config })
    }

    /// Clusterer with the WGS-84 ellipsoid and the given radius.
    pub fn with_radius(radius_m: f64) -> Result<Self> {
        Self::new(ClusterConfig {
            radius_m,
            ..ClusterConfig::default()
        })
    }

    pub fn radius_m(&self) -> f64 {
        self.config.radius_m
    }

    /// Return a copy of `paths` with every point moved to its group centroid.
    ///
    /// # Errors
    ///
    /// Propagates [`TrackError::Computation`] from the distance function; the
    /// whole run must stop in that case.
    pub fn apply(&self, paths: &[Path]) -> Result<Vec<Path>> {
        let start = Instant::now();

        // 1. Partition by name, keeping first-seen order of points
        let mut partitions: HashMap<Option<&str>, Vec<&GpsPoint>> = HashMap::new();
        for point in paths.iter().flat_map(|p| &p.points) {
            partitions.entry(point.name.as_deref()).or_default().push(point);
        }

        // 2-3. Group each partition and index its final centroids
        let mut centroid_trees: HashMap<Option<&str>, (RTree<IndexedCentroid>, Vec<GpsPoint>)> =
            HashMap::with_capacity(partitions.len());
        let mut total_groups = 0;
        for (name, members) in &partitions {
            let groups = self.group_points(members)?;
            debug!(
                "[Cluster] '{}': {} points -> {} groups",
                name.unwrap_or(""),
                members.len(),
                groups.len()
            );
            total_groups += groups.len();

            let centroids: Vec<GpsPoint> = groups.iter().map(Group::centroid).collect();
            let tree = RTree::bulk_load(
                groups.iter().enumerate().map(|(i, g)| g.indexed(i)).collect(),
            );
            centroid_trees.insert(*name, (tree, centroids));
        }

        // 4. Reassign every point to its nearest centroid
        let result = paths
            .iter()
            .map(|path| {
                let points = path
                    .points
                    .iter()
                    .map(|point| {
                        let Some((tree, centroids)) = centroid_trees.get(&point.name.as_deref())
                        else {
                            return Ok(point.clone());
                        };
                        let nearest = self.nearest_centroid(tree, point, |g| centroids[g].clone())?;
                        Ok(match nearest {
                            Some((group, _)) => {
                                let c = &centroids[group];
                                point.with_position(c.latitude, c.longitude)
                            }
                            None => point.clone(),
                        })
                    })
                    .collect::<Result<Vec<GpsPoint>>>()?;
                Ok(path.with_points(points))
            })
            .collect::<Result<Vec<Path>>>()?;

        info!(
            "[Cluster] {} names, {} groups (radius {}m) in {}ms",
            partitions.len(),
            total_groups,
            self.config.radius_m,
            start.elapsed().as_millis()
        );

        Ok(result)
    }

    /// Greedy nearest-centroid grouping of one name partition, in input order.
    fn group_points(&self, points: &[&GpsPoint]) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = Vec::new();
        let mut tree: RTree<IndexedCentroid> = RTree::new();

        for &point in points {
            let nearest = self.nearest_centroid(&tree, point, |g| groups[g].centroid())?;
            let joined = nearest.filter(|&(_, d)| d <= self.config.radius_m);

            match joined {
                Some((index, _)) => {
                    tree.remove(&groups[index].indexed(index));
                    let group = &mut groups[index];
                    group.add(point);
                    tree.insert(group.indexed(index));
                }
                None => {
                    let group = Group::new(point);
                    tree.insert(group.indexed(groups.len()));
                    groups.push(group);
                }
            }
        }

        Ok(groups)
    }

    /// Group index and ellipsoidal distance of the centroid closest to `point`.
    fn nearest_centroid(
        &self,
        tree: &RTree<IndexedCentroid>,
        point: &GpsPoint,
        centroid_of: impl Fn(usize) -> GpsPoint,
    ) -> Result<Option<(usize, f64)>> {
        let mut best: Option<(usize, f64)> = None;
        for entry in tree.nearest_neighbor_iter(&query(point)).take(NEAREST_CANDIDATES) {
            let d = self.config.ellipsoid.distance(point, &centroid_of(entry.group))?;
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((entry.group, d));
            }
        }
        Ok(best)
    }
}
