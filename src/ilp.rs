//! Thin integer linear programming layer.
//!
//! The tracking core only ever needs binary variables, linear constraints and
//! a linear objective, so that is all this module models. The actual solve is
//! delegated to a [`Backend`], keeping the rest of the crate agnostic to the
//! specific MILP library.

use crate::*;
use data::*;

use std::time::Instant;

pub type Var = usize;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Relation {
	LessEqual,
	GreaterEqual,
	Equal,
}

/// A single linear constraint `Σ coefficientᵢ·varᵢ  <relation>  value`
#[derive(Clone, PartialEq, Debug)]
pub struct LinearConstraint {
	pub coefficients: Vec<(Var, f64)>,
	pub relation: Relation,
	pub value: f64,
}

impl LinearConstraint {
	pub fn new(relation: Relation, value: f64) -> Self {
		Self {
			coefficients: Vec::new(),
			relation,
			value,
		}
	}
	pub fn set_coefficient(&mut self, var: Var, coefficient: f64) -> &mut Self {
		self.coefficients.push((var, coefficient));
		self
	}
}

/// A 0-1 integer program: variables, a minimization objective, and the
/// constraints that never change between solves.
#[derive(Clone, Default, Debug)]
pub struct Ilp {
	num_variables: usize,
	objective: Vec<f64>,
	constraints: Vec<LinearConstraint>,
}

impl Ilp {
	pub fn new() -> Self {
		Default::default()
	}
	pub fn add_binary(&mut self) -> Var {
		let var = self.num_variables;
		self.num_variables += 1;
		self.objective.push(0.0);
		var
	}
	pub fn num_variables(&self) -> usize {
		self.num_variables
	}
	pub fn add_constraint(&mut self, constraint: LinearConstraint) {
		self.constraints.push(constraint);
	}
	pub fn constraints(&self) -> &[LinearConstraint] {
		&self.constraints
	}
	/// (Over)write the objective coefficient of a variable
	pub fn set_coefficient(&mut self, var: Var, coefficient: f64) {
		self.objective[var] = coefficient;
	}
	pub fn coefficient(&self, var: Var) -> f64 {
		self.objective[var]
	}
	/// Objective value of a given assignment
	pub fn evaluate(&self, assignment: &[f64]) -> f64 {
		self.objective.iter().zip(assignment).map(|(c, v)| c * v).sum()
	}
}

/// Capability interface to a MILP solver.
///
/// `extra_constraints` are transient (per-solve) constraints on top of the
/// program's own; the solver uses them to pin variables between blocks.
pub trait Backend {
	fn optimize(&mut self, ilp: &Ilp, extra_constraints: &[LinearConstraint], deadline: Option<Instant>) -> Result<Vec<f64>, Error>;
}

/// Backend on top of the pure-Rust `microlp` solver
#[derive(Clone, Copy, Default, Debug)]
pub struct Microlp;

impl Backend for Microlp {
	fn optimize(&mut self, ilp: &Ilp, extra_constraints: &[LinearConstraint], deadline: Option<Instant>) -> Result<Vec<f64>, Error> {
		if deadline.map_or(false, |d| Instant::now() >= d) {
			return Err(Error::Timeout);
		}
		let mut problem = microlp::Problem::new(microlp::OptimizationDirection::Minimize);
		let vars: Vec<microlp::Variable> = (0..ilp.num_variables()).map(|var| problem.add_integer_var(ilp.coefficient(var), (0, 1))).collect();
		for constraint in ilp.constraints().iter().chain(extra_constraints) {
			let terms: Vec<(microlp::Variable, f64)> = constraint.coefficients.iter().map(|(var, coefficient)| (vars[*var], *coefficient)).collect();
			let op = match constraint.relation {
				Relation::LessEqual => microlp::ComparisonOp::Le,
				Relation::GreaterEqual => microlp::ComparisonOp::Ge,
				Relation::Equal => microlp::ComparisonOp::Eq,
			};
			problem.add_constraint(terms.as_slice(), op, constraint.value);
		}
		let solution = match problem.solve() {
			Ok(solution) => solution,
			Err(microlp::Error::Infeasible) => return Err(Error::InfeasibleModel),
			Err(e) => return Err(Error::BackendError(e.to_string())),
		};
		// microlp has no in-flight cancellation; an overrun solve is discarded whole
		if deadline.map_or(false, |d| Instant::now() > d) {
			return Err(Error::Timeout);
		}
		Ok(vars.into_iter().map(|var| solution[var]).collect())
	}
}
