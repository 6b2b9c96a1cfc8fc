use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rootcause_config::{DependencyGraph, EngineConfig};
use rootcause_core::ModelConfig;
use rootcause_engine::DiagnosisEngine;
use rootcause_llm::LlmOracle;
use rootcause_monitor::RunStore;
use rootcause_tools::{HttpToolGateway, DEFAULT_TIMEOUT};
use tracing::info;

const DEFAULT_GATEWAY_URL: &str = "http://localhost:9000";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_DB: &str = "rootcause.db";

pub struct ServerState {
    pub engine: DiagnosisEngine,
    pub store: Arc<RunStore>,
    /// Where finished run documents are written, if anywhere.
    pub report_dir: Option<PathBuf>,
}

impl ServerState {
    /// Builds the engine, oracle, gateway and run store from `ROOTCAUSE_*`
    /// environment variables.
    pub fn from_env() -> Result<Self> {
        let config = match env::var("ROOTCAUSE_CONFIG") {
            Ok(path) => EngineConfig::load(Path::new(&path)).with_context(|| format!("loading config {}", path))?,
            Err(_) => EngineConfig::default(),
        }
        .with_env_overrides()?;

        let graph_path = env::var("ROOTCAUSE_GRAPH").context("ROOTCAUSE_GRAPH must name a dependency graph file")?;
        let graph = DependencyGraph::load(&graph_path).with_context(|| format!("loading graph {}", graph_path))?;
        info!("Loaded dependency graph: {} resources", graph.len());

        let model = ModelConfig {
            id: "default".into(),
            name: "Investigation model".into(),
            model: env::var("ROOTCAUSE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            api_base: env::var("ROOTCAUSE_API_BASE").ok(),
        };
        info!("Reasoning model: {}", model.model);

        let gateway_url = env::var("ROOTCAUSE_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.into());
        let gateway = HttpToolGateway::new(gateway_url, DEFAULT_TIMEOUT)?;
        info!("Tool gateway: {}", gateway.base_url());

        let db_path = env::var("ROOTCAUSE_DB").unwrap_or_else(|_| DEFAULT_DB.into());
        let store = RunStore::new(&db_path).with_context(|| format!("opening run store {}", db_path))?;

        let engine = DiagnosisEngine::new(
            Arc::new(graph),
            Arc::new(LlmOracle::new(model)),
            Arc::new(gateway),
            config,
        )?;

        Ok(Self {
            engine,
            store: Arc::new(store),
            report_dir: env::var("ROOTCAUSE_REPORT_DIR").ok().map(PathBuf::from),
        })
    }
}
