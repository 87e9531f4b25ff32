//! Evaluation of reconstructed lineages against ground truth.
//!
//! Nodes are matched frame by frame by spatial distance; edge, track,
//! division and segment statistics are then counted over the matching.

use crate::*;
use data::*;
use graph::*;
use ilp::*;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::*;

/// Counts comparing a reconstruction against its ground truth
#[derive(Serialize, Clone, PartialEq, Debug, Default)]
pub struct Scores {
	pub num_gt_edges: usize,
	pub num_rec_edges: usize,
	pub num_matched_edges: usize,
	pub num_fp_edges: usize,
	pub num_fn_edges: usize,
	pub num_gt_tracks: usize,
	pub num_rec_tracks: usize,
	pub num_gt_matched_tracks: usize,
	pub num_rec_matched_tracks: usize,
	pub num_edge_fps_in_matched_tracks: usize,
	pub num_gt_divisions: usize,
	pub num_matched_divisions: usize,
	pub num_fp_divisions: usize,
	pub num_fn_divisions: usize,
	pub num_rec_divisions_in_matched_tracks: usize,
	/// mean number of matched edges per reconstructed segment, over matched tracks
	pub avg_segment_length: f64,
}

/// Match ground truth nodes to reconstruction nodes, frame by frame.
///
/// Within one frame this is a maximum matching of minimal total spatial
/// distance over the admissible pairs (Euclidean distance ≤ threshold),
/// solved as a small assignment ILP; pairs are enumerated cheapest first,
/// ties broken by node ids.
fn match_nodes(gt: &TrackGraph, rec: &TrackGraph, matching_threshold: f64) -> Result<IndexMap<NodeId, NodeId>, Error> {
	let mut matches = IndexMap::new();
	for t in gt.begin_frame()..gt.end_frame() {
		let mut pairs = Vec::new();
		for u in gt.nodes_at(t).iter().sorted() {
			for v in rec.nodes_at(t).iter().sorted() {
				let d = gt.node(*u).unwrap().spatial().distance(&rec.node(*v).unwrap().spatial()).sqrt();
				if d <= matching_threshold {
					pairs.push((n64(d), *u, *v));
				}
			}
		}
		if pairs.is_empty() {
			continue;
		}
		pairs.sort();
		// matching one more pair always outweighs any sum of distances
		let reward = pairs.iter().map(|(d, ..)| d.raw()).sum::<f64>() + 1.0;
		let mut ilp = Ilp::new();
		let mut vars = Vec::new();
		for (d, ..) in &pairs {
			let var = ilp.add_binary();
			ilp.set_coefficient(var, d.raw() - reward);
			vars.push(var);
		}
		let mut per_gt: IndexMap<NodeId, LinearConstraint> = IndexMap::new();
		let mut per_rec: IndexMap<NodeId, LinearConstraint> = IndexMap::new();
		for ((_, u, v), var) in pairs.iter().zip(&vars) {
			per_gt.entry(*u).or_insert_with(|| LinearConstraint::new(Relation::LessEqual, 1.0)).set_coefficient(*var, 1.0);
			per_rec.entry(*v).or_insert_with(|| LinearConstraint::new(Relation::LessEqual, 1.0)).set_coefficient(*var, 1.0);
		}
		for (_, c) in per_gt.into_iter().chain(per_rec) {
			ilp.add_constraint(c);
		}
		let solution = Microlp.optimize(&ilp, &[], None)?;
		for ((_, u, v), var) in pairs.iter().zip(vars) {
			if solution[var] > 0.5 {
				matches.insert(*u, *v);
			}
		}
	}
	Ok(matches)
}

/// Compare a reconstructed track graph against a ground truth one.
///
/// Arguments:
/// - `matching_threshold`: maximal spatial distance between a ground truth
///   node and the reconstruction node standing in for it
pub fn evaluate(gt: &TrackGraph, rec: &TrackGraph, matching_threshold: f64) -> Result<Scores, Error> {
	let matches = match_nodes(gt, rec, matching_threshold)?;
	let matched_rec_nodes: IndexSet<NodeId> = matches.values().copied().collect();
	log::debug!("matched {} nodes of {} (gt) and {} (rec)", matches.len(), gt.node_count(), rec.node_count());

	// an edge matches iff both endpoints match and the matched pair is linked too
	let mut matched_gt_edges: IndexSet<(NodeId, NodeId)> = IndexSet::new();
	let mut matched_rec_edges: IndexSet<(NodeId, NodeId)> = IndexSet::new();
	for ((u, v), _) in gt.edges() {
		if let (Some(mu), Some(mv)) = (matches.get(&u), matches.get(&v)) {
			if rec.edge(*mu, *mv).is_some() {
				matched_gt_edges.insert((u, v));
				matched_rec_edges.insert((*mu, *mv));
			}
		}
	}

	let gt_tracks = gt.get_tracks(None);
	let rec_tracks = rec.get_tracks(None);
	let gt_matched_tracks: Vec<&Track> = gt_tracks.iter().filter(|track| track.nodes.iter().any(|n| matches.contains_key(n))).collect();
	let rec_matched_tracks: Vec<&Track> = rec_tracks.iter().filter(|track| track.nodes.iter().any(|n| matched_rec_nodes.contains(n))).collect();

	let num_edge_fps_in_matched_tracks = rec_matched_tracks.iter()
		.map(|track| track.edges.iter().filter(|e| !matched_rec_edges.contains(*e)).count())
		.sum();

	// a division is a node with two (or more) selected children
	let gt_divisions: Vec<NodeId> = gt.nodes().map(|(n, _)| n).filter(|n| gt.prev_edges(*n).count() >= 2).collect();
	let num_matched_divisions = gt_divisions.iter()
		.filter(|d| gt.prev_edges(**d).filter(|e| matched_gt_edges.contains(&e.key())).count() >= 2)
		.count();
	let rec_divisions_in_matched_tracks: Vec<NodeId> = rec_matched_tracks.iter()
		.flat_map(|track| track.nodes.iter())
		.filter(|n| rec.prev_edges(**n).count() >= 2)
		.copied()
		.collect();
	let num_fp_divisions = rec_divisions_in_matched_tracks.iter()
		.filter(|d| rec.prev_edges(**d).filter(|e| matched_rec_edges.contains(&e.key())).count() < 2)
		.count();

	// segments: maximal division-free chains of matched reconstructed tracks,
	// cut below every division, scored by their matched edges
	let mut num_segments = 0usize;
	let mut num_matched_in_segments = 0usize;
	for track in &rec_matched_tracks {
		let is_division = |n: NodeId| rec.prev_edges(n).count() >= 2;
		for head in &track.nodes {
			if !is_division(*head) && rec.next_edges(*head).count() > 0 {
				continue;
			}
			for first in rec.prev_edges(*head) {
				let mut matched = 0usize;
				let mut edge = first;
				loop {
					if matched_rec_edges.contains(&edge.key()) {
						matched += 1;
					}
					let n = edge.source;
					if is_division(n) {
						break;
					}
					let mut following = rec.prev_edges(n);
					match (following.next(), following.next()) {
						(Some(next), None) => edge = next,
						_ => break,
					}
				}
				num_segments += 1;
				num_matched_in_segments += matched;
			}
		}
	}

	let scores = Scores {
		num_gt_edges: gt.edge_count(),
		num_rec_edges: rec.edge_count(),
		num_matched_edges: matched_gt_edges.len(),
		num_fp_edges: rec.edge_count() - matched_rec_edges.len(),
		num_fn_edges: gt.edge_count() - matched_gt_edges.len(),
		num_gt_tracks: gt_tracks.len(),
		num_rec_tracks: rec_tracks.len(),
		num_gt_matched_tracks: gt_matched_tracks.len(),
		num_rec_matched_tracks: rec_matched_tracks.len(),
		num_edge_fps_in_matched_tracks,
		num_gt_divisions: gt_divisions.len(),
		num_matched_divisions,
		num_fp_divisions,
		num_fn_divisions: gt_divisions.len() - num_matched_divisions,
		num_rec_divisions_in_matched_tracks: rec_divisions_in_matched_tracks.len(),
		avg_segment_length: if num_segments > 0 { num_matched_in_segments as f64 / num_segments as f64 } else { 0.0 },
	};
	log::debug!("{:?}", scores);
	Ok(scores)
}
