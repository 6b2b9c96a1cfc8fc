//! Prints what the planner would consider for each resource of a graph.
//!
//! Run with: cargo run --example dependency_closure [graph.json]

use rootcause::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let graph = match std::env::args().nth(1) {
        Some(path) => DependencyGraph::load(path)?,
        None => DependencyGraph::from_json(include_str!("../demos/online-boutique.json"))?,
    };
    let hops = EngineConfig::default().closure_hops;

    for node in graph.nodes() {
        let closure = graph.closure(&node.id, hops);
        let reach: Vec<String> = closure
            .iter()
            .filter(|(id, _)| *id != &node.id)
            .map(|(id, distance)| format!("{}({})", id, distance))
            .collect();
        println!(
            "{:<24} {:<9} fan-in {:>2}  closure: {}",
            node.id,
            node.kind.as_str(),
            graph.fan_in(&node.id),
            if reach.is_empty() { "-".to_string() } else { reach.join(", ") }
        );
    }

    Ok(())
}
