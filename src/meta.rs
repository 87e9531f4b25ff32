//! Meta parameters for the 🦠 lineage tracking ILP solver

use crate::*;
use data::*;
use serde::*;

/// Weights and costs of one tracking objective.
///
/// `block_size` and `context` are carried for the benefit of an outer
/// block-wise scheduler and are not consumed by the solver itself.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct TrackingParameters {
	/// additive cost per started lineage
	pub track_cost: f64,
	pub weight_node_score: f64,
	pub weight_edge_score: f64,
	/// fixed bias added per selected node
	pub selection_constant: f64,
	/// nodes closer than this to a spatial region face may start tracks for free
	pub max_cell_move: f64,
	#[serde(default)]
	pub weight_division: Option<f64>,
	#[serde(default)]
	pub weight_child: Option<f64>,
	#[serde(default)]
	pub weight_continuation: Option<f64>,
	#[serde(default)]
	pub division_constant: Option<f64>,
	#[serde(default)]
	pub block_size: Option<Vec<i64>>,
	#[serde(default)]
	pub context: Option<Vec<i64>>,
}

/// How node selection couples to cell state in the objective
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum CostModel {
	/// no classifier - divisions pay a fixed unit cost
	Basic,
	/// per-node state probabilities weigh in
	CellCycle {
		weight_division: f64,
		weight_child: f64,
		weight_continuation: f64,
		division_constant: f64,
	},
}

impl TrackingParameters {
	/// Derive the cost model for these parameters.
	///
	/// Arguments:
	/// - `cell_cycle_key`: name of the node attribute holding state probabilities, if any
	pub fn cost_model(&self, cell_cycle_key: Option<&str>) -> Result<CostModel, Error> {
		match cell_cycle_key {
			None => Ok(CostModel::Basic),
			Some(key) => match (self.weight_division, self.weight_child, self.weight_continuation, self.division_constant) {
				(Some(weight_division), Some(weight_child), Some(weight_continuation), Some(division_constant)) => Ok(CostModel::CellCycle {
					weight_division,
					weight_child,
					weight_continuation,
					division_constant,
				}),
				_ => Err(Error::ParameterError(format!("cell cycle key {:?} is set but division/child/continuation weights are incomplete", key))),
			},
		}
	}
}

/// A complete tracking job, as loaded from the meta YAML file
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct TrackingConfig {
	pub parameters: Vec<TrackingParameters>,
	pub selected_keys: Vec<String>,
	#[serde(default = "default_frame_key")]
	pub frame_key: String,
	#[serde(default)]
	pub cell_cycle_key: Option<String>,
	/// start (inclusive) and end (exclusive) frames to solve in
	#[serde(default)]
	pub frames: Option<(i64, i64)>,
	#[serde(default)]
	pub region: Option<Region>,
	#[serde(default)]
	pub timeout_seconds: Option<u64>,
}

fn default_frame_key() -> String {
	"t".to_string()
}

#[cfg(test)]
mod test {
	use super::*;

	fn minimal() -> TrackingParameters {
		serde_yaml::from_str(r#"
track_cost: 4.0
weight_edge_score: 0.1
weight_node_score: -0.1
selection_constant: -1.0
max_cell_move: 0.0
block_size: [5, 100, 100, 100]
context: [2, 100, 100, 100]
"#).unwrap()
	}

	#[test]
	fn test_parameters_defaults() {
		let ps = minimal();
		assert_eq!(ps.track_cost, 4.0);
		assert_eq!(ps.weight_division, None);
		assert_eq!(ps.block_size, Some(vec![5, 100, 100, 100]));
		assert_eq!(ps.cost_model(None).unwrap(), CostModel::Basic);
	}

	#[test]
	fn test_cell_cycle_needs_all_weights() {
		let mut ps = minimal();
		assert!(ps.cost_model(Some("vgg_score")).is_err());
		ps.weight_division = Some(-0.1);
		ps.weight_child = Some(-0.1);
		assert!(ps.cost_model(Some("vgg_score")).is_err());
		ps.weight_continuation = Some(-0.1);
		ps.division_constant = Some(1.0);
		assert_eq!(ps.cost_model(Some("vgg_score")).unwrap(), CostModel::CellCycle {
			weight_division: -0.1,
			weight_child: -0.1,
			weight_continuation: -0.1,
			division_constant: 1.0,
		});
	}

	#[test]
	fn test_config_defaults() {
		let config: TrackingConfig = serde_yaml::from_str(r#"
parameters:
  - track_cost: 1.0
    weight_edge_score: 0.01
    weight_node_score: -0.01
    selection_constant: -0.1
    max_cell_move: 0.0
selected_keys: [selected]
"#).unwrap();
		assert_eq!(config.frame_key, "t");
		assert_eq!(config.cell_cycle_key, None);
		assert_eq!(config.frames, None);
		assert_eq!(config.parameters.len(), config.selected_keys.len());
	}
}
