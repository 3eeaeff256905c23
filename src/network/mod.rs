//! # Road networks
//!
//! A [`Network`] is a directed multigraph whose edges carry a polyline geometry (a
//! [`Track`]). Nodes and edges live in owning vectors (an arena); they refer to each
//! other through their [`NodeId`] / [`EdgeId`] and the adjacency of a node is the list
//! of arena slots of its incident edges.
//!
//! Submodules
//! -----------------
//! * [`routing`] – Dijkstra shortest distances and paths, all-pairs precomputation and
//!   its persisted cache,
//! * [`spatial_index`] – regular grid over a network or a track collection.
pub mod routing;
pub mod spatial_index;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithms::simplification::SimplificationMode;
use crate::constants::{EdgeId, Meter, NodeId};
use crate::coords::{Coord, Srid};
use crate::time::Timestamp;
use crate::track::{BoundingBox, Track};
use crate::track_errors::TrackError;

pub use routing::PreparedTable;
pub use spatial_index::{Request, SpatialIndex};

/// Directions in which an edge may be travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// From `source` to `target` only.
    Direct,
    /// From `target` to `source` only.
    Reverse,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub orientation: Orientation,
    /// Polyline from `source` to `target`.
    pub geom: Track,
    /// Routing weight, the horizontal length of `geom`.
    pub weight: Meter,
}

impl Edge {
    /// `true` when the edge can be entered at `from`.
    pub fn leaves(&self, from: NodeId) -> bool {
        match self.orientation {
            Orientation::Direct => self.source == from,
            Orientation::Reverse => self.target == from,
            Orientation::Both => self.source == from || self.target == from,
        }
    }

    /// The other end of the edge, seen from `from`.
    pub fn opposite(&self, from: NodeId) -> NodeId {
        if self.source == from {
            self.target
        } else {
            self.source
        }
    }
}

/// Frame of the tracks built from network coordinates.
pub(crate) fn srid_of(c: &Coord) -> Srid {
    match c {
        Coord::Geo(_) => Srid::Geo,
        Coord::Ecef(_) => Srid::Ecef,
        Coord::Enu(_) => Srid::Enu,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_slots: HashMap<NodeId, usize>,
    edge_slots: HashMap<EdgeId, usize>,
    /// Incident edge slots, per node slot.
    adjacency: Vec<Vec<usize>>,
    prepared: Option<PreparedTable>,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    /// Add a node, or move an existing node with the same id.
    pub fn add_node(&mut self, id: NodeId, coord: Coord) {
        match self.node_slots.get(&id) {
            Some(&slot) => self.nodes[slot].coord = coord,
            None => {
                self.node_slots.insert(id, self.nodes.len());
                self.nodes.push(Node { id, coord });
                self.adjacency.push(Vec::new());
            }
        }
    }

    /// Add an edge between two existing nodes. An existing edge with the same id is
    /// replaced. Any prepared routing table is dropped.
    ///
    /// Errors
    /// ----------
    /// * `UnknownNode` when an end is not in the network.
    pub fn add_edge(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        orientation: Orientation,
        geom: Track,
    ) -> Result<(), TrackError> {
        let s = self.node_slot(source)?;
        let t = self.node_slot(target)?;
        if self.edge_slots.contains_key(&id) {
            self.remove_edge(id)?;
        }
        let slot = self.edges.len();
        self.edges.push(Edge {
            id,
            source,
            target,
            orientation,
            weight: geom.length_2d(),
            geom,
        });
        self.edge_slots.insert(id, slot);
        self.adjacency[s].push(slot);
        if t != s {
            self.adjacency[t].push(slot);
        }
        self.invalidate();
        Ok(())
    }

    /// Straight edge between two existing nodes.
    pub fn add_straight_edge(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        orientation: Orientation,
    ) -> Result<(), TrackError> {
        let a = self.node(source)?.coord;
        let b = self.node(target)?.coord;
        let geom = Track::from_parts(
            srid_of(&a),
            vec![a, b],
            vec![Timestamp::from_unix_seconds(0.0), Timestamp::from_unix_seconds(1.0)],
        )?;
        self.add_edge(id, source, target, orientation, geom)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, TrackError> {
        let slot = self.edge_slot(id)?;
        let edge = self.edges.swap_remove(slot);
        self.edge_slots.remove(&id);
        for adj in self.adjacency.iter_mut() {
            adj.retain(|&e| e != slot);
        }
        // the former last edge now lives in `slot`
        let moved = self.edges.len();
        if slot < moved {
            self.edge_slots.insert(self.edges[slot].id, slot);
            for adj in self.adjacency.iter_mut() {
                adj.iter_mut().filter(|e| **e == moved).for_each(|e| *e = slot);
            }
        }
        self.invalidate();
        Ok(edge)
    }

    fn invalidate(&mut self) {
        if self.prepared.take().is_some() {
            debug!("network changed, prepared routing table dropped");
        }
    }

    pub(crate) fn node_slot(&self, id: NodeId) -> Result<usize, TrackError> {
        self.node_slots.get(&id).copied().ok_or(TrackError::UnknownNode(id))
    }

    fn edge_slot(&self, id: EdgeId) -> Result<usize, TrackError> {
        self.edge_slots.get(&id).copied().ok_or(TrackError::UnknownEdge(id))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TrackError> {
        Ok(&self.nodes[self.node_slot(id)?])
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge, TrackError> {
        Ok(&self.edges[self.edge_slot(id)?])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of edge ends at node `id` (a loop counts once).
    pub fn degree(&self, id: NodeId) -> Result<usize, TrackError> {
        Ok(self.adjacency[self.node_slot(id)?].len())
    }

    /// Edges incident to node slot `slot`.
    pub(crate) fn incident(&self, slot: usize) -> impl Iterator<Item = &Edge> {
        self.adjacency[slot].iter().map(|&e| &self.edges[e])
    }

    pub(crate) fn node_at(&self, slot: usize) -> &Node {
        &self.nodes[slot]
    }

    pub fn total_length(&self) -> Meter {
        self.edges.iter().map(|e| e.weight).sum()
    }

    /// Bounding box of nodes and edge geometries.
    pub fn bbox(&self) -> Result<BoundingBox, TrackError> {
        BoundingBox::from_coords(
            self.nodes
                .iter()
                .map(|n| &n.coord)
                .chain(self.edges.iter().flat_map(|e| e.geom.positions())),
        )
        .ok_or_else(|| TrackError::EmptyTrack("network bbox".into()))
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            total_length: self.total_length(),
            bbox: self.bbox().ok(),
        }
    }

    /// Simplify every edge geometry in place and refresh the edge weights.
    pub fn simplify(&mut self, mode: &SimplificationMode) -> Result<(), TrackError> {
        for edge in self.edges.iter_mut() {
            edge.geom = edge.geom.simplify(mode)?;
            edge.weight = edge.geom.length_2d();
        }
        self.invalidate();
        Ok(())
    }
}

/// Size summary of a [`Network`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStats {
    pub nodes: usize,
    pub edges: usize,
    pub total_length: Meter,
    pub bbox: Option<BoundingBox>,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network")?;
        writeln!(f, "  nodes        : {}", self.nodes)?;
        writeln!(f, "  edges        : {}", self.edges)?;
        write!(f, "  total length : {:.3} m", self.total_length)?;
        if let Some(b) = &self.bbox {
            write!(
                f,
                "\n  bbox         : [{:.3}, {:.3}] x [{:.3}, {:.3}]",
                b.xmin, b.xmax, b.ymin, b.ymax
            )?;
        }
        Ok(())
    }
}
