//! Region-keyed access to candidate nodes and edges.
//!
//! The tracking core only ever talks to its candidate producer through this
//! interface; the production deployment backs it with a document database,
//! the CLI with a JSON file holding the same documents.

use crate::*;
use data::*;
use graph::*;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::*;

/// A labellable entity of the candidate store
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Entity {
	Node(NodeId),
	Edge(NodeId, NodeId),
}

pub trait CandidateStore {
	/// All nodes whose position lies in `region`
	fn read_nodes(&self, region: &Region) -> Result<Vec<CandidateNode>, Error>;
	/// All edges with both endpoints in `nodes`
	fn read_edges(&self, region: &Region, nodes: &[CandidateNode]) -> Result<Vec<CandidateEdge>, Error>;
	/// Persist a selection label; idempotent
	fn write_selection(&mut self, entity: Entity, key: &str, value: bool) -> Result<(), Error>;
	/// Read the candidate graph of a region
	fn get_subgraph(&self, region: &Region, frame_key: &str) -> Result<TrackGraph, Error> {
		let nodes = self.read_nodes(region)?;
		let edges = self.read_edges(region, &nodes)?;
		TrackGraph::new(nodes, edges, frame_key, Some(*region))
	}
}

/// On-disk document collections, one JSON object `{"nodes": […], "edges": […]}`
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
struct Documents {
	#[serde(default)]
	nodes: Vec<CandidateNode>,
	#[serde(default)]
	edges: Vec<CandidateEdge>,
}

/// A candidate store over a single JSON document file
#[derive(Clone, Debug, Default)]
pub struct JsonStore {
	nodes: IndexMap<NodeId, CandidateNode>,
	edges: IndexMap<(NodeId, NodeId), CandidateEdge>,
}

impl JsonStore {
	pub fn from_reader(reader: impl std::io::Read) -> Result<Self, Error> {
		let documents: Documents = serde_json::from_reader(reader).map_err(|e| Error::MalformedRecord(e.to_string()))?;
		Self::from_documents(documents.nodes, documents.edges)
	}
	pub fn from_documents(nodes: Vec<CandidateNode>, edges: Vec<CandidateEdge>) -> Result<Self, Error> {
		let seen_nodes = std::cell::RefCell::new(HashSet::new());
		let nodes: IndexMap<_, _> = nodes.into_iter().try_map_all(|n| {
			if !n.score.is_finite() {
				return Err(Error::MalformedRecord(format!("node {} has a non-finite score", n.id)));
			}
			if !seen_nodes.borrow_mut().insert(n.id) {
				return Err(Error::MalformedRecord(format!("duplicate node id {}", n.id)));
			}
			Ok((n.id, n))
		})?.collect();
		let seen_edges = std::cell::RefCell::new(HashSet::new());
		let edges: IndexMap<_, _> = edges.into_iter().try_map_all(|e| {
			if !e.score.is_finite() || !e.prediction_distance.is_finite() {
				return Err(Error::MalformedRecord(format!("edge ({}, {}) has a non-finite score", e.source, e.target)));
			}
			if !seen_edges.borrow_mut().insert(e.key()) {
				return Err(Error::MalformedRecord(format!("duplicate edge ({}, {})", e.source, e.target)));
			}
			Ok((e.key(), e))
		})?.collect();
		Ok(Self { nodes, edges })
	}
	pub fn to_writer(&self, writer: impl std::io::Write) -> Result<(), Error> {
		let documents = Documents {
			nodes: self.nodes.values().cloned().collect(),
			edges: self.edges.values().cloned().collect(),
		};
		serde_json::to_writer(writer, &documents).map_err(|e| Error::StoreUnavailable(e.to_string()))
	}
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}
	pub fn edge_count(&self) -> usize {
		self.edges.len()
	}
}

impl CandidateStore for JsonStore {
	fn read_nodes(&self, region: &Region) -> Result<Vec<CandidateNode>, Error> {
		Ok(self.nodes.values().filter(|n| region.contains(&n.position())).cloned().collect())
	}
	fn read_edges(&self, _region: &Region, nodes: &[CandidateNode]) -> Result<Vec<CandidateEdge>, Error> {
		let ids: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
		Ok(self.edges.values().filter(|e| ids.contains(&e.source) && ids.contains(&e.target)).cloned().collect())
	}
	fn write_selection(&mut self, entity: Entity, key: &str, value: bool) -> Result<(), Error> {
		match entity {
			Entity::Node(id) => self.nodes.get_mut(&id)
				.ok_or_else(|| Error::MalformedRecord(format!("no node {} to label", id)))?
				.set_selected(key, value),
			Entity::Edge(source, target) => self.edges.get_mut(&(source, target))
				.ok_or_else(|| Error::MalformedRecord(format!("no edge ({}, {}) to label", source, target)))?
				.set_selected(key, value),
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn store() -> JsonStore {
		JsonStore::from_reader(r#"{
			"nodes": [
				{"id": 0, "t": 0, "z": 1, "y": 1, "x": 1, "score": 2.0},
				{"id": 1, "t": 1, "z": 1, "y": 1, "x": 1, "score": 2.0},
				{"id": 2, "t": 2, "z": 1, "y": 1, "x": 9, "score": 2.0}
			],
			"edges": [
				{"source": 1, "target": 0, "score": 1.0, "prediction_distance": 0.0},
				{"source": 2, "target": 1, "score": 1.0, "prediction_distance": 8.0}
			]
		}"#.as_bytes()).unwrap()
	}

	#[test]
	fn test_read_by_region() {
		let store = store();
		let all = Region::all();
		assert_eq!(store.read_nodes(&all).unwrap().len(), 3);
		// node 2 lies outside x < 5, and the edge hanging off it follows
		let region = Region::new([0.0, 0.0, 0.0, 0.0], [5.0, 5.0, 5.0, 5.0]);
		let nodes = store.read_nodes(&region).unwrap();
		assert_eq!(nodes.len(), 2);
		let edges = store.read_edges(&region, &nodes).unwrap();
		assert_eq!(edges.len(), 1);
		assert_eq!(edges[0].key(), (1, 0));
		let g = store.get_subgraph(&region, "t").unwrap();
		assert_eq!((g.node_count(), g.edge_count()), (2, 1));
		assert_eq!(g.roi(), Some(&region));
	}

	#[test]
	fn test_write_selection() {
		let mut store = store();
		store.write_selection(Entity::Node(0), "selected", true).unwrap();
		store.write_selection(Entity::Edge(1, 0), "selected", true).unwrap();
		// idempotent, and last write wins
		store.write_selection(Entity::Node(0), "selected", true).unwrap();
		store.write_selection(Entity::Edge(1, 0), "selected", false).unwrap();
		let mut out = Vec::new();
		store.to_writer(&mut out).unwrap();
		let mut store = JsonStore::from_reader(out.as_slice()).unwrap();
		let g = store.get_subgraph(&Region::all(), "t").unwrap();
		assert_eq!(g.node(0).unwrap().selected("selected"), Some(true));
		assert_eq!(g.node(1).unwrap().selected("selected"), None);
		assert_eq!(g.edge(1, 0).unwrap().selected("selected"), Some(false));
		assert!(store.write_selection(Entity::Node(17), "selected", true).is_err());
	}

	#[test]
	fn test_malformed_records() {
		let dup = r#"{"nodes": [
			{"id": 0, "t": 0, "z": 1, "y": 1, "x": 1},
			{"id": 0, "t": 1, "z": 1, "y": 1, "x": 1}
		]}"#;
		match JsonStore::from_reader(dup.as_bytes()) {
			Err(Error::MalformedRecord(_)) => {},
			other => panic!("expected a malformed record, got {:?}", other.map(|_| ())),
		}
		assert!(JsonStore::from_reader(&b"{\"nodes\": [{\"id\": 3}]}"[..]).is_err());
	}
}
