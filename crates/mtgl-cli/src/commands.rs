//! `init`, `summary` and `predict`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use candle_core::Device;
use mtgl_common::{ModelConfig, TaskRoute};
use mtgl_graph::{BatchedGraph, FeaturizedMolecule};
use mtgl_model::{count_parameters, is_gpu, select_device, MtglAdmet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Scores of one molecule, keyed by task name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub predictions: BTreeMap<String, f32>,
}

/// Layout and size of a configured model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub layers: Vec<String>,
    pub heads: Vec<String>,
    pub parameters: usize,
}

fn load_config(path: &Path) -> Result<ModelConfig> {
    ModelConfig::from_path(path).with_context(|| format!("loading config {}", path.display()))
}

/// Write freshly initialised weights. Returns the parameter count.
pub fn init(config_path: &Path, out: &Path) -> Result<usize> {
    let config = load_config(config_path)?;
    let (_, varmap) = MtglAdmet::fresh(config, &Device::Cpu)?;
    varmap
        .save(out)
        .with_context(|| format!("writing weights to {}", out.display()))?;
    let parameters = count_parameters(&varmap);
    info!("Wrote {} parameters to {}", parameters, out.display());
    Ok(parameters)
}

/// Describe the model a config builds.
pub fn summary(config_path: &Path) -> Result<ModelSummary> {
    let config = load_config(config_path)?;
    let (model, varmap) = MtglAdmet::fresh(config.clone(), &Device::Cpu)?;
    let gating = model.gating_config();

    let mut layers = vec![
        format!("conv1: ResGcnLayer {} -> {}", config.in_feats, config.hidden_feats),
        format!("conv2: ResGcnLayer {} -> {}", config.hidden_feats, config.gnn_out_feats),
        format!(
            "readout: WeightAndSum over {} tasks (attention: {})",
            config.n_tasks, config.attention
        ),
    ];
    if config.attention && gating.num_gates() > 0 {
        layers.push(format!(
            "gating: {} gates over tasks {:?}, shared input {:?}",
            gating.num_gates(),
            gating.gated_tasks,
            gating.shared
        ));
    }

    let heads = gating
        .routes
        .iter()
        .enumerate()
        .map(|(i, route)| {
            let source = match (config.attention, route) {
                (false, _) => "shared readout".to_string(),
                (true, TaskRoute::Specific(t)) => format!("task {t} readout"),
                (true, TaskRoute::Combined) => "combined gated blend".to_string(),
            };
            format!("{}: {}", config.task_name(i), source)
        })
        .collect();

    Ok(ModelSummary {
        layers,
        heads,
        parameters: count_parameters(&varmap),
    })
}

/// Score every molecule in a JSON file of featurised molecules.
pub fn predict(
    config_path: &Path,
    weights: &Path,
    input: &Path,
    batch_size: usize,
    use_gpu: bool,
) -> Result<Vec<PredictionRecord>> {
    if batch_size == 0 {
        bail!("batch size must be positive");
    }
    let config = load_config(config_path)?;
    let device = select_device(use_gpu)?;
    if use_gpu && !is_gpu(&device) {
        warn!("GPU requested but unavailable, scoring on CPU");
    }
    let model = MtglAdmet::load(config, weights, &device)
        .with_context(|| format!("loading weights {}", weights.display()))?;

    let content = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let molecules: Vec<FeaturizedMolecule> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", input.display()))?;

    let start = Instant::now();
    let task_names: Vec<String> = (0..model.n_tasks()).map(|i| model.config().task_name(i)).collect();
    let mut records = Vec::with_capacity(molecules.len());

    for batch in molecules.chunks(batch_size) {
        let (graph, feats) = BatchedGraph::from_molecules(batch, &device)?;
        let scores = model.predict(&graph, &feats)?;
        debug!("Scored batch of {}", batch.len());

        for (mol, row) in batch.iter().zip(scores) {
            records.push(PredictionRecord {
                id: mol.id.clone(),
                predictions: task_names.iter().cloned().zip(row).collect(),
            });
        }
    }

    info!(
        "Scored {} molecules in {:.2}ms",
        records.len(),
        start.elapsed().as_secs_f32() * 1000.0
    );
    Ok(records)
}
