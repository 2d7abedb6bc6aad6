//! Cluster Model - scored points grouped by their cluster label
//!
//! A `ClusterCollection` is built once per analysis run by the aggregator and
//! only its anomaly flags change afterwards.

use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;

/// Name/value pairs kept in column order, serialized as a JSON object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: String, value: V) {
        self.0.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// Distance(s) reported by the scoring service for one point
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Distance {
    /// Distance to the point's own centroid only
    Nearest(f64),
    /// Distance to every centroid; `own` is the entry for the assigned one
    AllCentroids {
        own: f64,
        centroids: OrderedMap<f64>,
    },
}

impl Distance {
    /// Distance to the centroid of the point's own cluster
    pub fn own(&self) -> f64 {
        match self {
            Distance::Nearest(d) => *d,
            Distance::AllCentroids { own, .. } => *own,
        }
    }
}

/// One scored observation
#[derive(Debug, Clone, serde::Serialize)]
pub struct Point {
    features: OrderedMap<String>,
    distance: Distance,
    anomalous: bool,
}

impl Point {
    pub fn new(features: OrderedMap<String>, distance: Distance) -> Self {
        Self {
            features,
            distance,
            anomalous: false,
        }
    }

    pub fn features(&self) -> &OrderedMap<String> {
        &self.features
    }

    pub fn distance(&self) -> &Distance {
        &self.distance
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomalous
    }

    /// One-way: a flagged point stays flagged for the rest of the run
    pub fn mark_anomalous(&mut self) {
        self.anomalous = true;
    }
}

/// Mean and population standard deviation of a cluster's own-centroid distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Points sharing one cluster label, in first-seen order
#[derive(Debug, Clone, serde::Serialize)]
pub struct Cluster {
    id: String,
    anomalous: bool,
    points: Vec<Point>,
}

impl Cluster {
    pub fn new(id: String) -> Self {
        Self {
            id,
            anomalous: false,
            points: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut [Point] {
        &mut self.points
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomalous
    }

    /// Flags the cluster and every point in it
    pub fn mark_anomalous(&mut self) {
        self.anomalous = true;
        for point in &mut self.points {
            point.mark_anomalous();
        }
    }

    pub fn mean_distance(&self) -> f64 {
        self.distance_stats().mean
    }

    pub fn std_dev_distance(&self) -> f64 {
        self.distance_stats().std_dev
    }

    pub fn distance_stats(&self) -> DistanceStats {
        if self.points.is_empty() {
            return DistanceStats { mean: 0.0, std_dev: 0.0 };
        }
        let n = self.points.len() as f64;
        let mean = self.points.iter().map(|p| p.distance.own()).sum::<f64>() / n;
        let variance = self
            .points
            .iter()
            .map(|p| {
                let delta = p.distance.own() - mean;
                delta * delta
            })
            .sum::<f64>()
            / n;
        DistanceStats {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// All clusters of one analysis run, keyed by label, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ClusterCollection {
    feature_names: Vec<String>,
    clusters: Vec<Cluster>,
    index: HashMap<String, usize>,
    total_valid_points: usize,
    largest_cluster: usize,
}

impl ClusterCollection {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            ..Self::default()
        }
    }

    /// Append a point to the cluster for `label`, creating it on first sight
    pub fn insert(&mut self, label: &str, point: Point) {
        let slot = match self.index.get(label) {
            Some(&slot) => slot,
            None => {
                self.clusters.push(Cluster::new(label.to_string()));
                let slot = self.clusters.len() - 1;
                self.index.insert(label.to_string(), slot);
                slot
            }
        };
        let cluster = &mut self.clusters[slot];
        cluster.push(point);
        self.total_valid_points += 1;
        self.largest_cluster = self.largest_cluster.max(cluster.size());
    }

    pub fn get(&self, id: &str) -> Option<&Cluster> {
        self.index.get(id).map(|&slot| &self.clusters[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cluster> {
        self.clusters.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn total_valid_points(&self) -> usize {
        self.total_valid_points
    }

    pub fn largest_cluster_size(&self) -> usize {
        self.largest_cluster
    }

    pub fn anomalous_point_count(&self) -> usize {
        self.clusters
            .iter()
            .flat_map(|c| c.points.iter())
            .filter(|p| p.anomalous)
            .count()
    }
}

impl Serialize for ClusterCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(d: f64) -> Point {
        Point::new(OrderedMap::new(), Distance::Nearest(d))
    }

    #[test]
    fn test_insert_keeps_first_seen_order() {
        let mut collection = ClusterCollection::new(vec![]);
        collection.insert("2", point(1.0));
        collection.insert("0", point(1.0));
        collection.insert("2", point(2.0));

        let ids: Vec<&str> = collection.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["2", "0"]);
        assert_eq!(collection.total_valid_points(), 3);
        assert_eq!(collection.largest_cluster_size(), 2);
        assert_eq!(collection.get("2").map(|c| c.size()), Some(2));
    }

    #[test]
    fn test_population_std_dev() {
        let mut cluster = Cluster::new("0".to_string());
        for d in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            cluster.push(point(d));
        }
        assert_eq!(cluster.mean_distance(), 5.0);
        assert_eq!(cluster.std_dev_distance(), 2.0);
    }

    #[test]
    fn test_mark_anomalous_cascades() {
        let mut cluster = Cluster::new("7".to_string());
        cluster.push(point(1.0));
        cluster.push(point(3.0));
        cluster.mark_anomalous();

        assert!(cluster.is_anomalous());
        assert!(cluster.points().iter().all(|p| p.is_anomalous()));
    }

    #[test]
    fn test_ordered_map_serializes_in_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("zeta".to_string(), 1.0);
        map.insert("alpha".to_string(), 2.0);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"zeta":1.0,"alpha":2.0}"#);
    }
}
