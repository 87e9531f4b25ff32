//! 🧫 lineage tracking ILP solver
//!
//! Selects a biologically plausible forest of cell lineages out of a candidate
//! graph, by minimizing a linear objective over binary selection indicators.
//! Variables and structural constraints are generated once per graph; solving
//! for another parameter set only rewrites objective coefficients.

use crate::*;
use data::*;
use graph::*;
use ilp::*;
use meta::*;

use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// State of a selected cell within its lineage
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellState {
	/// mother of two selected children
	Division,
	/// its selected parent link leads to a dividing cell
	Daughter,
	/// everything else
	Continuation,
}

/// Tracking solver with a candidate graph attached.
///
/// Owns the variable tables, the immutable constraint set, and the per-key
/// pin constraints; the graph is borrowed for the solver's lifetime and
/// receives the selection labels on every successful [`Solver::solve`].
pub struct Solver<'a> {
	graph: &'a mut TrackGraph,
	ilp: Ilp,
	/// per-key equality constraints for labels already written by adjacent blocks
	pins: Vec<LinearConstraint>,
	node_selected: IndexMap<NodeId, Var>,
	edge_selected: IndexMap<(NodeId, NodeId), Var>,
	node_appear: IndexMap<NodeId, Var>,
	node_split: IndexMap<NodeId, Var>,
	node_child: IndexMap<NodeId, Var>,
	node_continuation: IndexMap<NodeId, Var>,
	selected_key: String,
	cell_cycle_key: Option<String>,
	start_frame: i64,
	backend: Box<dyn Backend>,
	solution: Option<Vec<f64>>,
}

impl<'a> Solver<'a> {
	/// Build variables and constraints for `graph` and attach the initial objective.
	///
	/// Arguments:
	/// - `selected_key`: node/edge attribute the selection is written under
	/// - `frames`: start (inclusive) and end (exclusive) frames to solve in, if the graph does not span them
	/// - `cell_cycle_key`: node attribute with `[division, child, continuation]` probabilities; switches cell cycle mode on
	pub fn new(graph: &'a mut TrackGraph, parameters: &TrackingParameters, selected_key: &str, frames: Option<(i64, i64)>, cell_cycle_key: Option<&str>) -> Result<Self, Error> {
		let start_frame = frames.map(|(begin, _)| begin).unwrap_or_else(|| graph.begin_frame());
		let mut solver = Self {
			graph,
			ilp: Ilp::new(),
			pins: Vec::new(),
			node_selected: IndexMap::new(),
			edge_selected: IndexMap::new(),
			node_appear: IndexMap::new(),
			node_split: IndexMap::new(),
			node_child: IndexMap::new(),
			node_continuation: IndexMap::new(),
			selected_key: String::new(),
			cell_cycle_key: cell_cycle_key.map(str::to_string),
			start_frame,
			backend: Box::new(Microlp),
			solution: None,
		};
		solver.create_variables();
		solver.create_constraints();
		log::debug!("created {} variables and {} constraints", solver.ilp.num_variables(), solver.ilp.constraints().len());
		solver.update_objective(parameters, selected_key)?;
		Ok(solver)
	}

	fn create_variables(&mut self) {
		let cell_cycle = self.cell_cycle_key.is_some();
		for ((u, v), _) in self.graph.edges() {
			self.edge_selected.insert((u, v), self.ilp.add_binary());
		}
		for (n, _) in self.graph.nodes() {
			self.node_selected.insert(n, self.ilp.add_binary());
			self.node_appear.insert(n, self.ilp.add_binary());
			self.node_split.insert(n, self.ilp.add_binary());
			if cell_cycle {
				self.node_child.insert(n, self.ilp.add_binary());
				self.node_continuation.insert(n, self.ilp.add_binary());
			}
		}
	}

	fn create_constraints(&mut self) {
		let cell_cycle = self.cell_cycle_key.is_some();
		for ((u, v), _) in self.graph.edges() {
			// a selected link selects both of its endpoints
			let mut c = LinearConstraint::new(Relation::LessEqual, 0.0);
			c.set_coefficient(self.edge_selected[&(u, v)], 2.0);
			c.set_coefficient(self.node_selected[&u], -1.0);
			c.set_coefficient(self.node_selected[&v], -1.0);
			self.ilp.add_constraint(c);
		}
		for (n, _) in self.graph.nodes() {
			// a selected node has exactly one parent link, or appears
			let mut c = LinearConstraint::new(Relation::Equal, 0.0);
			for e in self.graph.next_edges(n) {
				c.set_coefficient(self.edge_selected[&e.key()], 1.0);
			}
			c.set_coefficient(self.node_appear[&n], 1.0);
			c.set_coefficient(self.node_selected[&n], -1.0);
			self.ilp.add_constraint(c);
			// at most two children, and only on a selected node
			let mut c = LinearConstraint::new(Relation::LessEqual, 0.0);
			for e in self.graph.prev_edges(n) {
				c.set_coefficient(self.edge_selected[&e.key()], 1.0);
			}
			c.set_coefficient(self.node_selected[&n], -2.0);
			self.ilp.add_constraint(c);
			// split is set iff both children are picked
			let mut le = LinearConstraint::new(Relation::LessEqual, 1.0);
			let mut ge = LinearConstraint::new(Relation::GreaterEqual, 0.0);
			for e in self.graph.prev_edges(n) {
				le.set_coefficient(self.edge_selected[&e.key()], 1.0);
				ge.set_coefficient(self.edge_selected[&e.key()], 1.0);
			}
			le.set_coefficient(self.node_split[&n], -2.0);
			ge.set_coefficient(self.node_split[&n], -2.0);
			self.ilp.add_constraint(le);
			self.ilp.add_constraint(ge);
			if cell_cycle {
				// the three states partition a selected node
				let mut c = LinearConstraint::new(Relation::Equal, 0.0);
				c.set_coefficient(self.node_split[&n], 1.0);
				c.set_coefficient(self.node_child[&n], 1.0);
				c.set_coefficient(self.node_continuation[&n], 1.0);
				c.set_coefficient(self.node_selected[&n], -1.0);
				self.ilp.add_constraint(c);
				// a daughter has a selected parent link
				let mut c = LinearConstraint::new(Relation::LessEqual, 0.0);
				c.set_coefficient(self.node_child[&n], 1.0);
				for e in self.graph.next_edges(n) {
					c.set_coefficient(self.edge_selected[&e.key()], -1.0);
				}
				self.ilp.add_constraint(c);
			}
		}
		if cell_cycle {
			for ((u, v), _) in self.graph.edges() {
				// a selected link to a dividing parent makes the source a daughter,
				let mut c = LinearConstraint::new(Relation::LessEqual, 1.0);
				c.set_coefficient(self.node_split[&v], 1.0);
				c.set_coefficient(self.edge_selected[&(u, v)], 1.0);
				c.set_coefficient(self.node_child[&u], -1.0);
				self.ilp.add_constraint(c);
				// and nothing but a dividing parent does
				let mut c = LinearConstraint::new(Relation::LessEqual, 1.0);
				c.set_coefficient(self.node_child[&u], 1.0);
				c.set_coefficient(self.edge_selected[&(u, v)], 1.0);
				c.set_coefficient(self.node_split[&v], -1.0);
				self.ilp.add_constraint(c);
			}
		}
	}

	/// Swap the objective for another parameter set, reusing all variables and
	/// structural constraints.
	///
	/// Also re-derives the pin constraints: edges already labelled under
	/// `selected_key` (by an adjacent, previously solved block) keep their label.
	pub fn update_objective(&mut self, parameters: &TrackingParameters, selected_key: &str) -> Result<(), Error> {
		let cost_model = parameters.cost_model(self.cell_cycle_key.as_deref())?;
		log::debug!("updating objective for key {:?}", selected_key);
		for (n, node) in self.graph.nodes() {
			self.ilp.set_coefficient(self.node_selected[&n], node.score * parameters.weight_node_score + parameters.selection_constant);
			// tracks may start for free in the first frame and near the spatial boundary
			let exempt = self.graph.frame(n) == Some(self.start_frame)
				|| Self::close_to_roi_edge(self.graph, n, parameters.max_cell_move);
			self.ilp.set_coefficient(self.node_appear[&n], if exempt { 0.0 } else { parameters.track_cost });
		}
		match cost_model {
			CostModel::Basic => {
				for (n, _) in self.graph.nodes() {
					self.ilp.set_coefficient(self.node_split[&n], 1.0);
				}
			}
			CostModel::CellCycle { weight_division, weight_child, weight_continuation, division_constant } => {
				let key = self.cell_cycle_key.clone()
					.ok_or_else(|| Error::ParameterError("cell cycle weights without a cell cycle key".to_string()))?;
				for (n, node) in self.graph.nodes() {
					let probs = node.cell_cycle_probs(&key)?;
					self.ilp.set_coefficient(self.node_split[&n], probs[0] * weight_division + division_constant);
					self.ilp.set_coefficient(self.node_child[&n], probs[1] * weight_child);
					self.ilp.set_coefficient(self.node_continuation[&n], probs[2] * weight_continuation);
				}
			}
		}
		for ((u, v), edge) in self.graph.edges() {
			self.ilp.set_coefficient(self.edge_selected[&(u, v)], edge.prediction_distance * parameters.weight_edge_score);
		}
		self.pins.clear();
		for ((u, v), edge) in self.graph.edges() {
			if let Some(value) = edge.selected(selected_key) {
				let mut pin = LinearConstraint::new(Relation::Equal, if value { 1.0 } else { 0.0 });
				pin.set_coefficient(self.edge_selected[&(u, v)], 1.0);
				self.pins.push(pin);
			}
		}
		if !self.pins.is_empty() {
			log::debug!("pinned {} edges already labelled under {:?}", self.pins.len(), selected_key);
		}
		self.selected_key = selected_key.to_string();
		self.solution = None;
		Ok(())
	}

	/// Solve the ILP and write the optimal assignment as `selected_key → bool`
	/// onto every node and edge of the graph.
	///
	/// On any failure (including an expired `timeout`) no label is written.
	pub fn solve(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
		let deadline = timeout.map(|t| Instant::now() + t);
		log::debug!("solving {} variables under {}+{} constraints", self.ilp.num_variables(), self.ilp.constraints().len(), self.pins.len());
		let solution = self.backend.optimize(&self.ilp, &self.pins, deadline)?;
		log::debug!("optimal objective value {:.5}", self.ilp.evaluate(&solution));
		for (n, var) in &self.node_selected {
			self.graph.set_node_selected(*n, &self.selected_key, solution[*var] > 0.5);
		}
		for (e, var) in &self.edge_selected {
			self.graph.set_edge_selected(*e, &self.selected_key, solution[*var] > 0.5);
		}
		self.solution = Some(solution);
		Ok(())
	}

	/// Cell state of a node in the last solution, if the node was selected
	pub fn cell_state(&self, n: NodeId) -> Option<CellState> {
		let solution = self.solution.as_ref()?;
		if solution[*self.node_selected.get(&n)?] < 0.5 {
			return None;
		}
		if solution[*self.node_split.get(&n)?] > 0.5 {
			return Some(CellState::Division);
		}
		if let Some(var) = self.node_child.get(&n) {
			if solution[*var] > 0.5 {
				return Some(CellState::Daughter);
			}
		}
		Some(CellState::Continuation)
	}

	/// Whether a node lies within `max_cell_move` of a spatial face of the
	/// graph's bounding region (it could have moved out of view)
	pub fn check_node_close_to_roi_edge(&self, n: NodeId, max_cell_move: f64) -> bool {
		Self::close_to_roi_edge(self.graph, n, max_cell_move)
	}

	fn close_to_roi_edge(graph: &TrackGraph, n: NodeId, max_cell_move: f64) -> bool {
		let (roi, node) = match (graph.roi(), graph.node(n)) {
			(Some(roi), Some(node)) => (roi, node),
			_ => return false,
		};
		node.spatial().iter().zip(roi.spatial_bounds().iter())
			.any(|(p, (begin, end))| p - max_cell_move < *begin || p + max_cell_move >= *end)
	}
}

/// Select lineages in `graph` once per parameter set, writing the matching
/// selection key onto every node and edge.
///
/// Arguments:
/// - `parameters` and `selected_keys`: parallel lists, one solve per entry
/// - `frames`: start (inclusive) and end (exclusive) frames, if the graph does not span them
/// - `cell_cycle_key`: node attribute with state probabilities; switches cell cycle mode on
/// - `timeout`: per-solve deadline
pub fn solve(graph: &mut TrackGraph, parameters: &[TrackingParameters], selected_keys: &[&str], frames: Option<(i64, i64)>, cell_cycle_key: Option<&str>, timeout: Option<Duration>) -> Result<(), Error> {
	if graph.is_empty() {
		log::debug!("no candidates, nothing to track");
		return Ok(());
	}
	if parameters.len() != selected_keys.len() {
		return Err(Error::ParameterError(format!("{} parameter sets and {} selected keys", parameters.len(), selected_keys.len())));
	}
	if parameters.is_empty() {
		return Err(Error::ParameterError("no parameter sets to solve for".to_string()));
	}
	log::debug!("creating solver...");
	let mut solver = Solver::new(graph, &parameters[0], selected_keys[0], frames, cell_cycle_key)?;
	let mut total = Duration::new(0, 0);
	for (i, (ps, key)) in parameters.iter().zip(selected_keys.iter()).enumerate() {
		if i > 0 {
			solver.update_objective(ps, key)?;
		}
		log::debug!("solving for key {:?}", key);
		let start = Instant::now();
		solver.solve(timeout)?;
		let elapsed = start.elapsed();
		total += elapsed;
		log::info!("solving ILP for {:?} took {:.3}s", key, elapsed.as_secs_f64());
	}
	log::info!("solving ILP for all parameter sets took {:.3}s", total.as_secs_f64());
	Ok(())
}
