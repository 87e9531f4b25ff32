//! Data structures to operate on frame-indexed candidate graphs.
//!
//! A [`TrackGraph`] owns flat node and edge tables plus the secondary indices
//! (frame → nodes, node → incident edges) that the solver and the evaluator
//! query; all queries return borrowed views.

use crate::*;
use data::*;

use indexmap::{IndexMap, IndexSet};
use serde::*;

/// A directed candidate graph, indexed by frame.
///
/// Edges run from a node to its hypothesized parent one frame earlier; edges
/// with a missing endpoint or a frame gap ≠ 1 are discarded on construction.
#[derive(Clone, Default, Debug)]
pub struct TrackGraph {
	nodes: IndexMap<NodeId, CandidateNode>,
	edges: IndexMap<(NodeId, NodeId), CandidateEdge>,
	node_frames: IndexMap<NodeId, i64>,
	frames: IndexMap<i64, IndexSet<NodeId>>,
	/// incoming edges per node, i.e. its children one frame later
	children: IndexMap<NodeId, IndexSet<(NodeId, NodeId)>>,
	/// outgoing edges per node, i.e. its parent link candidates
	parents: IndexMap<NodeId, IndexSet<(NodeId, NodeId)>>,
	roi: Option<Region>,
	/// An always empty set of nodes (useful for [`nodes_at`] on a non-existing frame)
	_empty: IndexSet<NodeId>,
	/// An always empty set of edges (useful for edge queries on a non-existing node)
	_empty_edges: IndexSet<(NodeId, NodeId)>,
}

impl TrackGraph {
	/// Constructs a new graph from candidate documents.
	///
	/// Arguments:
	/// - `frame_key`: name of the node attribute holding the frame (normally `"t"`)
	/// - `roi`: bounding region the candidates were read from, if known
	pub fn new(nodes: Vec<CandidateNode>, edges: Vec<CandidateEdge>, frame_key: &str, roi: Option<Region>) -> Result<Self, Error> {
		let mut g = Self { roi, ..Default::default() };
		for node in nodes {
			let frame = node.frame(frame_key)?;
			g.frames.entry(frame).or_default().insert(node.id);
			g.node_frames.insert(node.id, frame);
			g.nodes.insert(node.id, node);
		}
		for edge in edges {
			let (fu, fv) = match (g.node_frames.get(&edge.source), g.node_frames.get(&edge.target)) {
				(Some(fu), Some(fv)) => (*fu, *fv),
				_ => {
					log::warn!("discarding edge ({}, {}) with an endpoint outside the graph", edge.source, edge.target);
					continue;
				}
			};
			if fu != fv + 1 {
				log::warn!("discarding edge ({}, {}) spanning frames {} -> {}", edge.source, edge.target, fu, fv);
				continue;
			}
			g.children.entry(edge.target).or_default().insert(edge.key());
			g.parents.entry(edge.source).or_default().insert(edge.key());
			g.edges.insert(edge.key(), edge);
		}
		log::debug!("constructed track graph with {} nodes and {} edges over frames [{}, {})",
			g.node_count(), g.edge_count(), g.begin_frame(), g.end_frame());
		Ok(g)
	}
	/// Bounding region the graph was read from, if known
	pub fn roi(&self) -> Option<&Region> {
		self.roi.as_ref()
	}
	/// Get node by id
	pub fn node(&self, n: NodeId) -> Option<&CandidateNode> {
		self.nodes.get(&n)
	}
	/// Get edge by its (source, target) pair
	pub fn edge(&self, source: NodeId, target: NodeId) -> Option<&CandidateEdge> {
		self.edges.get(&(source, target))
	}
	/// Frame of a node
	pub fn frame(&self, n: NodeId) -> Option<i64> {
		self.node_frames.get(&n).copied()
	}
	/// Get all nodes
	pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &CandidateNode)> {
		self.nodes.iter().map(|(id, n)| (*id, n))
	}
	/// Get all edges
	pub fn edges(&self) -> impl Iterator<Item = ((NodeId, NodeId), &CandidateEdge)> {
		self.edges.iter().map(|(k, e)| (*k, e))
	}
	/// Number of nodes
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}
	/// Number of edges
	pub fn edge_count(&self) -> usize {
		self.edges.len()
	}
	/// Whether the graph is empty
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}
	/// All nodes at the given frame
	pub fn nodes_at(&self, t: i64) -> &IndexSet<NodeId> {
		self.frames.get(&t).unwrap_or(&self._empty)
	}
	/// First frame holding any node (0 on an empty graph)
	pub fn begin_frame(&self) -> i64 {
		self.frames.keys().min().copied().unwrap_or(0)
	}
	/// One past the last frame holding any node (0 on an empty graph)
	pub fn end_frame(&self) -> i64 {
		self.frames.keys().max().map(|t| t + 1).unwrap_or(0)
	}
	/// Edges arriving at `n` from the next frame - the children pointing to `n`
	pub fn prev_edges(&self, n: NodeId) -> impl Iterator<Item = &CandidateEdge> {
		self.children.get(&n).unwrap_or(&self._empty_edges).iter().filter_map(move |k| self.edges.get(k))
	}
	/// Edges leaving `n` towards the previous frame - its parent link candidates
	pub fn next_edges(&self, n: NodeId) -> impl Iterator<Item = &CandidateEdge> {
		self.parents.get(&n).unwrap_or(&self._empty_edges).iter().filter_map(move |k| self.edges.get(k))
	}
	/// Write a selection label onto a node
	pub fn set_node_selected(&mut self, n: NodeId, key: &str, value: bool) {
		if let Some(node) = self.nodes.get_mut(&n) {
			node.set_selected(key, value);
		}
	}
	/// Write a selection label onto an edge
	pub fn set_edge_selected(&mut self, e: (NodeId, NodeId), key: &str, value: bool) {
		if let Some(edge) = self.edges.get_mut(&e) {
			edge.set_selected(key, value);
		}
	}
	/// Partition the (selected) subgraph into lineage tracks.
	///
	/// Arguments:
	/// - `key`: selection label to restrict to; `None` takes the whole graph
	///
	/// Returns: weakly-connected components with at least one edge, ordered and
	/// numbered by their smallest node id
	pub fn get_tracks(&self, key: Option<&str>) -> Vec<Track> {
		let node_on = |n: NodeId| self.nodes.get(&n).map_or(false, |node| key.map_or(true, |k| node.selected(k) == Some(true)));
		let mut adjacency: IndexMap<NodeId, Vec<(NodeId, NodeId)>> = IndexMap::new();
		for (k, edge) in self.edges.iter() {
			if key.map_or(true, |kk| edge.selected(kk) == Some(true)) && node_on(edge.source) && node_on(edge.target) {
				adjacency.entry(edge.source).or_default().push(*k);
				adjacency.entry(edge.target).or_default().push(*k);
			}
		}
		let mut visited: IndexSet<NodeId> = IndexSet::new();
		let mut components = Vec::new();
		for start in adjacency.keys() {
			if visited.contains(start) {
				continue;
			}
			let mut nodes = IndexSet::new();
			let mut edges = IndexSet::new();
			let mut stack = vec![*start];
			while let Some(u) = stack.pop() {
				if !visited.insert(u) {
					continue;
				}
				nodes.insert(u);
				for (s, t) in &adjacency[&u] {
					edges.insert((*s, *t));
					stack.push(if *s == u { *t } else { *s });
				}
			}
			components.push((nodes, edges));
		}
		components.sort_by_key(|(nodes, _)| nodes.iter().min().copied());
		components.into_iter().enumerate().map(|(track_id, (nodes, edges))| {
			let mut nodes: Vec<NodeId> = nodes.into_iter().collect();
			nodes.sort_by_key(|n| (self.node_frames[n], *n));
			let mut edges: Vec<(NodeId, NodeId)> = edges.into_iter().collect();
			edges.sort_by_key(|(s, t)| (self.node_frames[t], *t, *s));
			Track {
				track_id,
				start_frame: self.node_frames[&nodes[0]],
				end_frame: nodes.iter().map(|n| self.node_frames[n]).max().unwrap_or(0),
				nodes,
				edges,
			}
		}).collect()
	}
}

/// One lineage: a weakly-connected component of the selected subgraph
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Track {
	pub track_id: usize,
	/// frame of the earliest cell
	pub start_frame: i64,
	/// frame of the latest cell
	pub end_frame: i64,
	/// cells, ordered by (frame, id)
	pub nodes: Vec<NodeId>,
	/// links, ordered chronologically by their parent end
	pub edges: Vec<(NodeId, NodeId)>,
}

impl Track {
	pub fn num_cells(&self) -> usize {
		self.nodes.len()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn cell(id: NodeId, t: i64, x: f64) -> CandidateNode {
		CandidateNode {
			id,
			t,
			z: 1.0,
			y: 1.0,
			x,
			score: 2.0,
			attrs: Default::default(),
		}
	}

	fn link(source: NodeId, target: NodeId) -> CandidateEdge {
		CandidateEdge {
			source,
			target,
			score: 1.0,
			prediction_distance: 0.0,
			attrs: Default::default(),
		}
	}

	/// 1 - 2 - 3 - 4 with a division at 2 (children 3 and 5)
	fn division_graph(edges: Vec<CandidateEdge>) -> TrackGraph {
		let cells = vec![
			cell(1, 0, 0.0),
			cell(2, 1, 0.0),
			cell(3, 2, 0.0),
			cell(4, 3, 0.0),
			cell(5, 2, 3.0),
			cell(6, 3, 3.0),
			cell(7, 4, 3.0),
		];
		TrackGraph::new(cells, edges, "t", None).unwrap()
	}

	fn division_edges() -> Vec<CandidateEdge> {
		vec![link(2, 1), link(3, 2), link(4, 3), link(5, 2), link(6, 5), link(7, 6)]
	}

	#[test]
	fn test_construction_discards_bad_edges() {
		let cells = vec![cell(0, 0, 1.0), cell(1, 1, 1.0), cell(2, 2, 1.0)];
		let edges = vec![
			link(1, 0),
			link(2, 0), // frame gap of 2
			link(3, 1), // endpoint 3 does not exist
		];
		let g = TrackGraph::new(cells, edges, "t", None).unwrap();
		assert_eq!(g.node_count(), 3);
		assert_eq!(g.edge_count(), 1);
		assert!(g.edge(1, 0).is_some());
	}

	#[test]
	fn test_frame_queries() {
		let g = division_graph(division_edges());
		assert_eq!(g.begin_frame(), 0);
		assert_eq!(g.end_frame(), 5);
		assert_eq!(g.nodes_at(2).len(), 2);
		assert!(g.nodes_at(2).contains(&3) && g.nodes_at(2).contains(&5));
		assert!(g.nodes_at(17).is_empty());
		// node 2 has children 3 and 5, and a single parent candidate 1
		let children: Vec<_> = g.prev_edges(2).map(|e| e.source).collect();
		assert_eq!(children.len(), 2);
		assert!(children.contains(&3) && children.contains(&5));
		let parents: Vec<_> = g.next_edges(2).map(|e| e.target).collect();
		assert_eq!(parents, vec![1]);
		assert_eq!(g.prev_edges(7).count(), 0);
	}

	#[test]
	fn test_custom_frame_key() {
		let mut a = cell(1, 0, 0.0);
		a.attrs.insert("frame".to_string(), serde_json::json!(3));
		let mut b = cell(2, 0, 0.0);
		b.attrs.insert("frame".to_string(), serde_json::json!(4));
		let g = TrackGraph::new(vec![a, b], vec![link(2, 1)], "frame", None).unwrap();
		assert_eq!(g.begin_frame(), 3);
		assert_eq!(g.end_frame(), 5);
		assert_eq!(g.edge_count(), 1);
		// a node without the attribute is a malformed graph
		match TrackGraph::new(vec![cell(1, 0, 0.0)], vec![], "frame", None) {
			Err(Error::MalformedGraph(_)) => {},
			other => panic!("expected a malformed graph, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn test_single_track() {
		let g = division_graph(division_edges());
		let tracks = g.get_tracks(None);
		assert_eq!(tracks.len(), 1);
		assert_eq!(tracks[0].track_id, 0);
		assert_eq!(tracks[0].num_cells(), 7);
		assert_eq!(tracks[0].start_frame, 0);
		assert_eq!(tracks[0].end_frame, 4);
		assert_eq!(tracks[0].edges.len(), 6);
		assert_eq!(tracks[0].edges[0], (2, 1));
	}

	#[test]
	fn test_split_tracks() {
		let edges = division_edges().into_iter().filter(|e| e.key() != (5, 2)).collect();
		let g = division_graph(edges);
		let tracks = g.get_tracks(None);
		assert_eq!(tracks.len(), 2);
		assert_eq!(tracks[0].nodes, vec![1, 2, 3, 4]);
		assert_eq!(tracks[1].nodes, vec![5, 6, 7]);
		assert_eq!(tracks[1].start_frame, 2);
		assert_eq!(tracks[1].end_frame, 4);
	}

	#[test]
	fn test_tracks_under_selection() {
		let mut g = division_graph(division_edges());
		for n in [1, 2, 3, 4].iter() {
			g.set_node_selected(*n, "selected", true);
		}
		g.set_node_selected(5, "selected", false);
		for e in [(2, 1), (3, 2), (4, 3)].iter() {
			g.set_edge_selected(*e, "selected", true);
		}
		g.set_edge_selected((5, 2), "selected", false);
		let tracks = g.get_tracks(Some("selected"));
		assert_eq!(tracks.len(), 1);
		assert_eq!(tracks[0].nodes, vec![1, 2, 3, 4]);
		// an isolated selected node is not a track
		g.set_edge_selected((2, 1), "selected", false);
		g.set_edge_selected((3, 2), "selected", false);
		g.set_edge_selected((4, 3), "selected", false);
		assert!(g.get_tracks(Some("selected")).is_empty());
	}
}
