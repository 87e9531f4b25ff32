//! # _track 'em cells & grow 'em trees_
//!
//! Universal CLI for solving cell lineage tracking problems, as well as evaluating reconstructions against ground truth.

use clap::{App, Arg, SubCommand, crate_version};
mod data;
mod eval;
mod graph;
mod ilp;
mod meta;
mod store;
mod track;
pub use try_all::{TryAll, TryMapAll};
pub use noisy_float::prelude::{N64, n64};

use store::CandidateStore;

pub type NodeId = u64;

fn main() -> std::io::Result<()> {
	env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));
	let matches = App::new("Lineage Tracking Compute")
							.version(crate_version!())
							.about("Make 'em divide!")
							.subcommand(SubCommand::with_name("track")
								.about("Select a forest of cell lineages out of a candidate graph")
								.arg(Arg::with_name("candidates")
										.takes_value(true)
										.required(true)
										.index(1)
										.help("Candidate documents JSON"))
								.arg(Arg::with_name("meta")
										.takes_value(true)
										.required(true)
										.index(2)
										.help("Meta parameters YAML"))
								.arg(Arg::with_name("output")
										.takes_value(true)
										.required(true)
										.index(3)
										.help("Labelled documents output JSON"))
							)
							.subcommand(SubCommand::with_name("evaluate")
								.about("Score a reconstruction against ground truth")
								.arg(Arg::with_name("ground-truth")
										.takes_value(true)
										.required(true)
										.index(1)
										.help("Ground truth documents JSON"))
								.arg(Arg::with_name("reconstruction")
										.takes_value(true)
										.required(true)
										.index(2)
										.help("Reconstruction documents JSON"))
								.arg(Arg::with_name("output")
										.takes_value(true)
										.required(true)
										.index(3)
										.help("Scores output JSON"))
								.arg(Arg::with_name("matching-threshold")
										.short("m")
										.takes_value(true)
										.required(true)
										.validator(|s| s.parse::<f64>().map(|_| ()).map_err(|e| e.to_string()))
										.help("Maximal node matching distance"))
							)
							.subcommand(SubCommand::with_name("tracks")
								.about("Extract lineage tracks from labelled candidate documents")
								.arg(Arg::with_name("candidates")
										.takes_value(true)
										.required(true)
										.index(1)
										.help("Candidate documents JSON"))
								.arg(Arg::with_name("output")
										.takes_value(true)
										.required(true)
										.index(2)
										.help("Tracks output JSON"))
								.arg(Arg::with_name("key")
										.short("k")
										.takes_value(true)
										.help("Selection label to restrict to (the whole graph otherwise)"))
							)
							.get_matches();
	log::info!("Loading...");
	if let Some(matches) = matches.subcommand_matches("track") {
		log::trace!("tracing enabled");
		let mut store: store::JsonStore = store::JsonStore::from_reader(&std::fs::File::open(matches.value_of("candidates").unwrap())?).expect("Candidate documents invalid JSON");
		let config: meta::TrackingConfig = serde_yaml::from_reader(&std::fs::File::open(matches.value_of("meta").unwrap())?).expect("Meta parameters invalid YAML");
		log::info!("Loaded {} candidate nodes and {} candidate edges", store.node_count(), store.edge_count());
		let region = config.region.unwrap_or_else(data::Region::all);
		let mut graph = store.get_subgraph(&region, &config.frame_key).expect("Candidate graph invalid");
		let keys: Vec<&str> = config.selected_keys.iter().map(String::as_str).collect();
		let timeout = config.timeout_seconds.map(std::time::Duration::from_secs);
		track::solve(&mut graph, &config.parameters, &keys, config.frames, config.cell_cycle_key.as_deref(), timeout).expect("Tracking failed");
		log::info!("Selected lineages");
		for (n, node) in graph.nodes() {
			for key in &keys {
				if let Some(value) = node.selected(key) {
					store.write_selection(store::Entity::Node(n), key, value).unwrap();
				}
			}
		}
		for ((u, v), edge) in graph.edges() {
			for key in &keys {
				if let Some(value) = edge.selected(key) {
					store.write_selection(store::Entity::Edge(u, v), key, value).unwrap();
				}
			}
		}
		store.to_writer(&std::fs::File::create(matches.value_of("output").unwrap())?).unwrap();
	} else if let Some(matches) = matches.subcommand_matches("evaluate") {
		let gt = store::JsonStore::from_reader(&std::fs::File::open(matches.value_of("ground-truth").unwrap())?).expect("Ground truth documents invalid JSON");
		let rec = store::JsonStore::from_reader(&std::fs::File::open(matches.value_of("reconstruction").unwrap())?).expect("Reconstruction documents invalid JSON");
		let threshold: f64 = matches.value_of("matching-threshold").unwrap().parse().unwrap();
		log::info!("Loaded configuration");
		let gt_graph = gt.get_subgraph(&data::Region::all(), "t").expect("Ground truth graph invalid");
		let rec_graph = rec.get_subgraph(&data::Region::all(), "t").expect("Reconstruction graph invalid");
		let scores = eval::evaluate(&gt_graph, &rec_graph, threshold).expect("Evaluation failed");
		log::info!("Evaluated reconstruction");
		serde_json::to_writer(&std::fs::File::create(matches.value_of("output").unwrap())?, &scores).unwrap();
	} else if let Some(matches) = matches.subcommand_matches("tracks") {
		let store = store::JsonStore::from_reader(&std::fs::File::open(matches.value_of("candidates").unwrap())?).expect("Candidate documents invalid JSON");
		log::info!("Loaded configuration");
		let graph = store.get_subgraph(&data::Region::all(), "t").expect("Candidate graph invalid");
		let tracks = graph.get_tracks(matches.value_of("key"));
		log::info!("Extracted {} tracks covering {} cells", tracks.len(), tracks.iter().map(graph::Track::num_cells).sum::<usize>());
		serde_json::to_writer(&std::fs::File::create(matches.value_of("output").unwrap())?, &tracks).unwrap();
	}
	Ok(())
}
