//! Runs one live investigation against a tool gateway and an OpenAI-compatible model.
//!
//! Run with: cargo run --example investigate [graph.json]
//!
//! Reads `OPENAI_API_KEY`, `ROOTCAUSE_GATEWAY_URL` (default
//! `http://localhost:9000`), `ROOTCAUSE_MODEL` and `ROOTCAUSE_API_BASE`.

use rootcause::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let graph = match std::env::args().nth(1) {
        Some(path) => DependencyGraph::load(path)?,
        None => DependencyGraph::from_json(include_str!("../demos/online-boutique.json"))?,
    };

    let model = ModelConfig {
        id: "default".into(),
        name: "Investigation model".into(),
        model: std::env::var("ROOTCAUSE_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
        api_base: std::env::var("ROOTCAUSE_API_BASE").ok(),
    };
    let gateway_url = std::env::var("ROOTCAUSE_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:9000".into());

    let engine = DiagnosisEngine::new(
        Arc::new(graph),
        Arc::new(LlmOracle::new(model)),
        Arc::new(HttpToolGateway::new(gateway_url, DEFAULT_TIMEOUT)?),
        EngineConfig::default().with_env_overrides()?,
    )?;

    let summary = engine.gather().await;
    let record = engine.run(&summary).await?;

    let report = &record.final_report;
    println!("Root cause: {}", report.root_cause);
    println!("Complete:   {} after {} round(s)", report.complete, report.rounds);
    for unresolved in &report.unresolved {
        println!("Unresolved: {} ({:?})", unresolved.task_id, unresolved.reason);
    }

    Ok(())
}
