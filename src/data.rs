//! Crusty data types for the candidate document schema

use crate::*;

use indexmap::IndexMap;
use serde::*;

pub trait Distance {
	type Measure;
	fn distance(&self, other: &Self) -> Self::Measure;
}

impl Distance for [f64; 3] {
	type Measure = f64;
	fn distance(&self, othr: &Self) -> Self::Measure {
		(self[0]-othr[0])*(self[0]-othr[0]) + (self[1]-othr[1])*(self[1]-othr[1]) + (self[2]-othr[2])*(self[2]-othr[2])
	}
}

/// Half-open 4D box `[begin, end)` over `(t, z, y, x)`, in world units.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Region {
	pub begin: [f64; 4],
	pub end: [f64; 4],
}

impl Region {
	pub fn new(begin: [f64; 4], end: [f64; 4]) -> Self {
		Self { begin, end }
	}
	/// The region containing every position
	pub fn all() -> Self {
		Self {
			begin: [f64::NEG_INFINITY; 4],
			end: [f64::INFINITY; 4],
		}
	}
	pub fn contains(&self, position: &[f64; 4]) -> bool {
		position.iter().zip(self.begin.iter().zip(self.end.iter())).all(|(p, (b, e))| p >= b && p < e)
	}
	/// Spatial `(begin, end)` bounds, in `(z, y, x)` order
	pub fn spatial_bounds(&self) -> [(f64, f64); 3] {
		[(self.begin[1], self.end[1]), (self.begin[2], self.end[2]), (self.begin[3], self.end[3])]
	}
}

/// A detected cell center at a discrete time frame.
///
/// Beyond the fixed document fields, a node carries arbitrary attributes -
/// selection labels (one boolean per solved parameter set) and, when a cell
/// state classifier ran upstream, a length-3 probability vector over
/// {division, child, continuation}.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CandidateNode {
	pub id: NodeId,
	pub t: i64,
	pub z: f64,
	pub y: f64,
	pub x: f64,
	#[serde(default)]
	pub score: f64,
	#[serde(flatten)]
	pub attrs: IndexMap<String, serde_json::Value>,
}

impl CandidateNode {
	pub fn position(&self) -> [f64; 4] {
		[self.t as f64, self.z, self.y, self.x]
	}
	pub fn spatial(&self) -> [f64; 3] {
		[self.z, self.y, self.x]
	}
	/// Frame of the node, under the given frame attribute name
	pub fn frame(&self, frame_key: &str) -> Result<i64, Error> {
		if frame_key == "t" {
			return Ok(self.t);
		}
		self.attrs.get(frame_key).and_then(|v| v.as_i64())
			.ok_or_else(|| Error::MalformedGraph(format!("node {} has no frame attribute {:?}", self.id, frame_key)))
	}
	/// Selection label previously written under `key`, if any
	pub fn selected(&self, key: &str) -> Option<bool> {
		self.attrs.get(key).and_then(serde_json::Value::as_bool)
	}
	pub fn set_selected(&mut self, key: &str, value: bool) {
		self.attrs.insert(key.to_string(), serde_json::Value::Bool(value));
	}
	/// Cell state probabilities `[division, child, continuation]` stored under `key`
	pub fn cell_cycle_probs(&self, key: &str) -> Result<[f64; 3], Error> {
		let malformed = || Error::MalformedRecord(format!("node {} has no length-3 probability vector under {:?}", self.id, key));
		let probs = self.attrs.get(key).and_then(|v| v.as_array()).ok_or_else(malformed)?;
		if probs.len() != 3 {
			return Err(malformed());
		}
		let mut out = [0.0; 3];
		for (o, p) in out.iter_mut().zip(probs) {
			*o = p.as_f64().ok_or_else(malformed)?;
		}
		Ok(out)
	}
}

/// A hypothesized parent-child link, directed from the later-frame node
/// (`source`) to its parent in the previous frame (`target`).
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CandidateEdge {
	pub source: NodeId,
	pub target: NodeId,
	#[serde(default)]
	pub score: f64,
	/// Distance between the source position and the parent location predicted
	/// upstream - not the distance between the endpoint positions.
	#[serde(default)]
	pub prediction_distance: f64,
	#[serde(flatten)]
	pub attrs: IndexMap<String, serde_json::Value>,
}

impl CandidateEdge {
	pub fn key(&self) -> (NodeId, NodeId) {
		(self.source, self.target)
	}
	pub fn selected(&self, key: &str) -> Option<bool> {
		self.attrs.get(key).and_then(serde_json::Value::as_bool)
	}
	pub fn set_selected(&mut self, key: &str, value: bool) {
		self.attrs.insert(key.to_string(), serde_json::Value::Bool(value));
	}
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("malformed graph: {0}")]
	MalformedGraph(String),
	#[error("invalid parameters: {0}")]
	ParameterError(String),
	#[error("no feasible assignment exists")]
	InfeasibleModel,
	#[error("ILP backend failure: {0}")]
	BackendError(String),
	#[error("deadline exceeded while solving")]
	Timeout,
	#[error("candidate store unavailable: {0}")]
	StoreUnavailable(String),
	#[error("malformed record: {0}")]
	MalformedRecord(String),
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_region_contains() {
		let r = Region::new([0.0, 0.0, 0.0, 0.0], [4.0, 5.0, 5.0, 5.0]);
		assert!(r.contains(&[0.0, 0.0, 0.0, 0.0]));
		assert!(r.contains(&[3.0, 4.9, 1.0, 1.0]));
		assert!(!r.contains(&[4.0, 1.0, 1.0, 1.0]));
		assert!(!r.contains(&[1.0, 5.0, 1.0, 1.0]));
		assert!(Region::all().contains(&[-1e12, 0.0, 1e12, 42.0]));
	}

	#[test]
	fn test_node_documents() {
		let doc = r#"{"id": 7, "t": 2, "z": 1.0, "y": 1.5, "x": 0.25, "score": 0.9, "vgg_score": [0.1, 0.2, 0.7], "selected": true}"#;
		let node: CandidateNode = serde_json::from_str(doc).unwrap();
		assert_eq!(node.id, 7);
		assert_eq!(node.frame("t").unwrap(), 2);
		assert_eq!(node.spatial(), [1.0, 1.5, 0.25]);
		assert_eq!(node.selected("selected"), Some(true));
		assert_eq!(node.selected("selected_2"), None);
		assert_eq!(node.cell_cycle_probs("vgg_score").unwrap(), [0.1, 0.2, 0.7]);
		assert!(node.cell_cycle_probs("nope").is_err());
		let back = serde_json::to_value(&node).unwrap();
		assert_eq!(back["vgg_score"][2], serde_json::json!(0.7));
	}

	#[test]
	fn test_edge_documents() {
		let doc = r#"{"source": 3, "target": 1, "score": 0.5, "prediction_distance": 1.25}"#;
		let mut edge: CandidateEdge = serde_json::from_str(doc).unwrap();
		assert_eq!(edge.key(), (3, 1));
		assert_eq!(edge.selected("selected"), None);
		edge.set_selected("selected", false);
		assert_eq!(edge.selected("selected"), Some(false));
	}
}
