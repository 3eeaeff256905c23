//! # Routing
//!
//! Shortest distances and paths over a [`Network`] with Dijkstra's algorithm, and an
//! all-pairs table (bounded by a cut-off distance) that answers later queries with two
//! map lookups.
//!
//! The table persists as JSON:
//!
//! ```json
//! { "version": 1, "cut": 500.0,
//!   "table": { "0": { "0": [0.0, null, null], "1": [100.0, 0, 0] } } }
//! ```
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{srid_of, Network};
use crate::constants::{EdgeId, Meter, NodeId};
use crate::coords::Coord;
use crate::progress::Progress;
use crate::time::Timestamp;
use crate::track::Track;
use crate::track_errors::TrackError;

/// Version tag written in persisted tables.
pub const PREPARED_VERSION: u32 = 1;

/// Distance to a node and the last hop used to reach it, persisted as a
/// `[distance, pred_node, pred_edge]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Meter, Option<NodeId>, Option<EdgeId>)", into = "(Meter, Option<NodeId>, Option<EdgeId>)")]
pub struct PreparedEntry {
    pub distance: Meter,
    pub pred_node: Option<NodeId>,
    pub pred_edge: Option<EdgeId>,
}

impl From<(Meter, Option<NodeId>, Option<EdgeId>)> for PreparedEntry {
    fn from((distance, pred_node, pred_edge): (Meter, Option<NodeId>, Option<EdgeId>)) -> Self {
        PreparedEntry {
            distance,
            pred_node,
            pred_edge,
        }
    }
}

impl From<PreparedEntry> for (Meter, Option<NodeId>, Option<EdgeId>) {
    fn from(e: PreparedEntry) -> Self {
        (e.distance, e.pred_node, e.pred_edge)
    }
}

/// All-pairs shortest distances up to `cut`, keyed by source then target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTable {
    pub version: u32,
    pub cut: Meter,
    pub table: BTreeMap<NodeId, BTreeMap<NodeId, PreparedEntry>>,
}

/// Output of a single-source run, indexed by node slot.
struct Tree {
    dist: Vec<Meter>,
    /// `(predecessor slot, edge id)`
    pred: Vec<Option<(usize, EdgeId)>>,
}

impl Network {
    /// Dijkstra from `source`. The run stops once `target` is settled, and never
    /// relaxes a node beyond `cut`.
    fn dijkstra(&self, source: usize, target: Option<usize>, cut: Meter) -> Tree {
        let n = self.node_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut pred = vec![None; n];
        let mut settled = vec![false; n];
        let mut heap = BinaryHeap::new();

        dist[source] = 0.0;
        heap.push(Reverse((OrderedFloat(0.0), source)));

        while let Some(Reverse((OrderedFloat(d), u))) = heap.pop() {
            if settled[u] {
                continue;
            }
            settled[u] = true;
            if Some(u) == target {
                break;
            }
            let uid = self.node_at(u).id;
            for edge in self.incident(u).filter(|e| e.leaves(uid)) {
                let Ok(v) = self.node_slot(edge.opposite(uid)) else {
                    continue;
                };
                let candidate = d + edge.weight;
                if candidate <= cut && candidate < dist[v] {
                    dist[v] = candidate;
                    pred[v] = Some((u, edge.id));
                    heap.push(Reverse((OrderedFloat(candidate), v)));
                }
            }
        }
        Tree { dist, pred }
    }

    /// Length of the shortest path from `source` to `target`.
    ///
    /// Arguments
    /// -----------------
    /// * `cut` – optional search radius.
    ///
    /// Return
    /// ----------
    /// * `None` when `target` is unreachable or farther than `cut`.
    ///
    /// Errors
    /// ----------
    /// * `UnknownNode` for an id absent from the network.
    pub fn shortest_distance(
        &self,
        source: NodeId,
        target: NodeId,
        cut: Option<Meter>,
    ) -> Result<Option<Meter>, TrackError> {
        let s = self.node_slot(source)?;
        let t = self.node_slot(target)?;
        let tree = self.dijkstra(s, Some(t), cut.unwrap_or(f64::INFINITY));
        Ok(tree.dist[t].is_finite().then_some(tree.dist[t]))
    }

    /// Distances from `source` to every node reachable within `cut`, source included.
    pub fn shortest_distances(
        &self,
        source: NodeId,
        cut: Option<Meter>,
    ) -> Result<BTreeMap<NodeId, Meter>, TrackError> {
        let s = self.node_slot(source)?;
        let tree = self.dijkstra(s, None, cut.unwrap_or(f64::INFINITY));
        Ok(tree
            .dist
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .map(|(slot, d)| (self.node_at(slot).id, *d))
            .collect())
    }

    /// Shortest path as a polyline, edge geometries being reversed when travelled from
    /// target to source. The junction points shared by consecutive edges appear once.
    ///
    /// Return
    /// ----------
    /// * `None` when `target` is unreachable, a single point when `source == target`.
    pub fn shortest_path(&self, source: NodeId, target: NodeId) -> Result<Option<Track>, TrackError> {
        let s = self.node_slot(source)?;
        let t = self.node_slot(target)?;
        let tree = self.dijkstra(s, Some(t), f64::INFINITY);
        if !tree.dist[t].is_finite() {
            return Ok(None);
        }
        let mut hops = Vec::new();
        let mut v = t;
        while let Some((u, e)) = tree.pred[v] {
            hops.push((self.node_at(u).id, e));
            v = u;
        }
        hops.reverse();
        self.assemble(source, &hops).map(Some)
    }

    /// Polyline of a path given as `(entry node, edge)` hops.
    fn assemble(&self, source: NodeId, hops: &[(NodeId, EdgeId)]) -> Result<Track, TrackError> {
        let start = self.node(source)?.coord;
        let mut points: Vec<Coord> = vec![start];
        for &(from, e) in hops {
            let edge = self.edge(e)?;
            let geom = edge.geom.positions();
            let oriented: Box<dyn Iterator<Item = &Coord>> = if edge.source == from {
                Box::new(geom.iter())
            } else {
                Box::new(geom.iter().rev())
            };
            for c in oriented {
                if points.last().is_some_and(|last| last.distance_3d(c) == 0.0) {
                    continue;
                }
                points.push(*c);
            }
        }
        let timestamps = (0..points.len())
            .map(|i| Timestamp::from_unix_seconds(i as f64))
            .collect();
        Ok(Track::from_parts(srid_of(&start), points, timestamps)?.with_ids("path", format!("{source}")))
    }

    /// Run a bounded single-source search from every node and keep the resulting table.
    pub fn prepare(&mut self, cut: Meter) -> Result<(), TrackError> {
        if !(cut > 0.0) {
            return Err(TrackError::OutOfDomain(format!("cut distance must be positive, got {cut}")));
        }
        let mut progress = Progress::new("routing preparation", self.node_count() as u64);
        let mut table = BTreeMap::new();
        for s in 0..self.node_count() {
            let tree = self.dijkstra(s, None, cut);
            let row: BTreeMap<NodeId, PreparedEntry> = (0..self.node_count())
                .filter(|&v| tree.dist[v].is_finite())
                .map(|v| {
                    (
                        self.node_at(v).id,
                        PreparedEntry {
                            distance: tree.dist[v],
                            pred_node: tree.pred[v].map(|(u, _)| self.node_at(u).id),
                            pred_edge: tree.pred[v].map(|(_, e)| e),
                        },
                    )
                })
                .collect();
            table.insert(self.node_at(s).id, row);
            progress.inc();
        }
        progress.finish();
        let pairs: usize = table.values().map(BTreeMap::len).sum();
        debug!(nodes = self.node_count(), pairs, cut, "routing table prepared");
        self.prepared = Some(PreparedTable {
            version: PREPARED_VERSION,
            cut,
            table,
        });
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    fn prepared_table(&self) -> Result<&PreparedTable, TrackError> {
        self.prepared
            .as_ref()
            .ok_or_else(|| TrackError::OutOfDomain("network routing table not prepared".into()))
    }

    /// Write the prepared table as JSON.
    pub fn save_prep(&self, path: impl AsRef<Path>) -> Result<(), TrackError> {
        let table = self.prepared_table()?;
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, table)?;
        debug!(path = %path.as_ref().display(), "routing table saved");
        Ok(())
    }

    /// Load a table written by [`Network::save_prep`].
    ///
    /// Errors
    /// ----------
    /// * `OutOfDomain` for an unsupported version.
    /// * `UnknownNode` when the table refers to a node missing from this network.
    pub fn load_prep(&mut self, path: impl AsRef<Path>) -> Result<(), TrackError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let prepared: PreparedTable = serde_json::from_reader(reader)?;
        if prepared.version != PREPARED_VERSION {
            return Err(TrackError::OutOfDomain(format!(
                "unsupported routing table version {}",
                prepared.version
            )));
        }
        for (s, row) in &prepared.table {
            self.node_slot(*s)?;
            for t in row.keys() {
                self.node_slot(*t)?;
            }
        }
        if prepared.table.len() != self.node_count() {
            warn!(
                table = prepared.table.len(),
                nodes = self.node_count(),
                "routing table does not cover every node"
            );
        }
        self.prepared = Some(prepared);
        Ok(())
    }

    /// Table lookup of the distance from `source` to `target`.
    ///
    /// Return
    /// ----------
    /// * `None` when `target` is farther than the preparation cut.
    pub fn prepared_shortest_distance(
        &self,
        source: NodeId,
        target: NodeId,
    ) -> Result<Option<Meter>, TrackError> {
        self.node_slot(source)?;
        self.node_slot(target)?;
        Ok(self
            .prepared_table()?
            .table
            .get(&source)
            .and_then(|row| row.get(&target))
            .map(|entry| entry.distance))
    }

    /// Shortest path rebuilt from the predecessors stored in the table.
    pub fn prepared_shortest_path(
        &self,
        source: NodeId,
        target: NodeId,
    ) -> Result<Option<Track>, TrackError> {
        self.node_slot(source)?;
        self.node_slot(target)?;
        let Some(row) = self.prepared_table()?.table.get(&source) else {
            return Ok(None);
        };
        if !row.contains_key(&target) {
            return Ok(None);
        }
        let mut hops = Vec::new();
        let mut v = target;
        while let Some(entry) = row.get(&v) {
            match (entry.pred_node, entry.pred_edge) {
                (Some(u), Some(e)) => {
                    hops.push((u, e));
                    v = u;
                }
                _ => break,
            }
            if hops.len() > self.edge_count() {
                return Err(TrackError::OutOfDomain("cycle in routing table predecessors".into()));
            }
        }
        if v != source {
            return Ok(None);
        }
        hops.reverse();
        self.assemble(source, &hops).map(Some)
    }
}

#[cfg(test)]
mod routing_test {
    use super::*;
    use crate::network::network_test::grid_network;
    use crate::network::Orientation;
    use approx::assert_relative_eq;

    #[test]
    fn test_shortest_distance() {
        let net = grid_network();
        let d = net.shortest_distance(0, 3, None).unwrap().unwrap();
        assert_relative_eq!(d, 100.0 + 100.0 * 2f64.sqrt());
        assert_eq!(net.shortest_distance(0, 0, None).unwrap(), Some(0.0));
        assert_eq!(net.shortest_distance(0, 5, Some(200.0)).unwrap(), None);
        assert!(net.shortest_distance(0, 12, None).is_err());

        let within = net.shortest_distances(0, Some(150.0)).unwrap();
        assert_eq!(within.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(net.shortest_distances(0, None).unwrap().len(), 6);
    }

    #[test]
    fn test_shortest_path() {
        let net = grid_network();
        let size = |s, t| net.shortest_path(s, t).unwrap().unwrap().size();
        assert_eq!(size(0, 3), 3);
        assert_eq!(size(5, 3), 2);
        assert_eq!(size(0, 5), 4);
        assert_eq!(size(0, 4), 3);

        let path = net.shortest_path(5, 0).unwrap().unwrap();
        let xs: Vec<f64> = path.positions().iter().map(|c| c.get_x()).collect();
        assert_eq!(xs, vec![300.0, 200.0, 100.0, 0.0]);
        assert_eq!(net.shortest_path(2, 2).unwrap().unwrap().size(), 1);
    }

    #[test]
    fn test_one_way_edges() {
        let mut net = Network::new();
        net.add_node(0, Coord::enu(0.0, 0.0, 0.0));
        net.add_node(1, Coord::enu(10.0, 0.0, 0.0));
        net.add_straight_edge(0, 0, 1, Orientation::Direct).unwrap();
        assert_eq!(net.shortest_distance(0, 1, None).unwrap(), Some(10.0));
        assert_eq!(net.shortest_distance(1, 0, None).unwrap(), None);
        assert!(net.shortest_path(1, 0).unwrap().is_none());

        net.add_straight_edge(1, 0, 1, Orientation::Reverse).unwrap();
        let back = net.shortest_path(1, 0).unwrap().unwrap();
        assert_eq!(back.positions()[0].get_x(), 10.0);
    }

    #[test]
    fn test_prepared_queries_and_cache() {
        let mut net = grid_network();
        assert!(net.prepared_shortest_distance(0, 3).is_err());
        net.prepare(1000.0).unwrap();
        for s in 0..6 {
            for t in 0..6 {
                let direct = net.shortest_distance(s, t, None).unwrap().unwrap();
                let cached = net.prepared_shortest_distance(s, t).unwrap().unwrap();
                assert_relative_eq!(direct, cached, epsilon = 1e-9);
                assert_eq!(
                    net.prepared_shortest_path(s, t).unwrap().unwrap().size(),
                    net.shortest_path(s, t).unwrap().unwrap().size()
                );
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.json");
        net.save_prep(&path).unwrap();
        let mut other = grid_network();
        other.load_prep(&path).unwrap();
        assert_eq!(other.prepared_shortest_distance(0, 3).unwrap(), net.prepared_shortest_distance(0, 3).unwrap());

        let text = std::fs::read_to_string(&path).unwrap().replace("\"version\":1", "\"version\":7");
        std::fs::write(&path, text).unwrap();
        assert!(matches!(other.load_prep(&path), Err(TrackError::OutOfDomain(_))));
    }

    #[test]
    fn test_prepared_cut() {
        let mut net = grid_network();
        net.prepare(150.0).unwrap();
        assert_eq!(net.prepared_shortest_distance(0, 1).unwrap(), Some(100.0));
        assert_eq!(net.prepared_shortest_distance(0, 3).unwrap(), None);
        assert!(net.prepared_shortest_path(0, 3).unwrap().is_none());
        net.add_node(6, Coord::enu(0.0, 50.0, 0.0));
        net.add_straight_edge(8, 0, 6, Orientation::Both).unwrap();
        assert!(!net.is_prepared());
    }
}
