//! The MTGL-ADMET multi-task model.

use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::{ModuleT, VarBuilder, VarMap};
use mtgl_common::{GatingConfig, ModelConfig, MtglError, Result, TaskRoute};
use mtgl_graph::BatchedGraph;
use tracing::{debug, info};

use crate::conv::{GraphModule, ResGcnLayer};
use crate::gating::TaskGating;
use crate::head::PredictionHead;
use crate::readout::{Readout, WeightAndSum};

/// Everything a forward pass can report.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Raw scores, `(B, n_tasks)`
    pub predictions: Tensor,
    /// Gate distributions, `(B, gates, 2)`, when any gate ran
    pub gate_weights: Option<Tensor>,
    /// Per-task `(N, 1)` atom weights when `return_weight` is set
    pub atom_weights: Option<Vec<Tensor>>,
    /// The `(B, F)` embedding each head consumed, in head order
    pub mol_embeddings: Vec<Tensor>,
}

/// Multi-task graph network: two residual graph convolutions, a per-task
/// attention readout, softmax gating against a shared embedding, and one
/// prediction head per task.
pub struct MtglAdmet {
    config: ModelConfig,
    gating_config: GatingConfig,
    conv1: ResGcnLayer,
    conv2: ResGcnLayer,
    weighted_sum_readout: WeightAndSum,
    gating: TaskGating,
    heads: Vec<PredictionHead>,
}

impl MtglAdmet {
    /// Build the model, taking parameters from `vb`.
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let gating_config = config.gating();

        let conv1 = ResGcnLayer::new(
            config.in_feats,
            config.hidden_feats,
            config.residual,
            config.batchnorm,
            config.allow_zero_in_degree,
            vb.pp("conv1"),
        )?;
        let conv2 = ResGcnLayer::new(
            config.hidden_feats,
            config.gnn_out_feats,
            config.residual,
            config.batchnorm,
            config.allow_zero_in_degree,
            vb.pp("conv2"),
        )?;
        let weighted_sum_readout = WeightAndSum::new(
            config.gnn_out_feats,
            config.n_tasks,
            config.attention,
            config.return_weight,
            vb.pp("weighted_sum_readout"),
        )?;
        let gating = TaskGating::new(config.gnn_out_feats, &gating_config, vb.clone())?;
        let heads = (0..config.n_tasks)
            .map(|i| {
                PredictionHead::new(
                    i,
                    config.dropout,
                    config.gnn_out_feats,
                    config.classifier_hidden_feats,
                    vb.clone(),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        info!(
            "MTGL-ADMET: {} -> {} -> {} atom features, {} tasks, {} gates",
            config.in_feats,
            config.hidden_feats,
            config.gnn_out_feats,
            config.n_tasks,
            gating.num_gates()
        );

        Ok(Self {
            config,
            gating_config,
            conv1,
            conv2,
            weighted_sum_readout,
            gating,
            heads,
        })
    }

    /// Build a randomly initialised model. The returned `VarMap` owns the
    /// parameters and can be handed to an optimiser or saved.
    pub fn fresh(config: ModelConfig, device: &Device) -> Result<(Self, VarMap)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, vb)?;
        Ok((model, varmap))
    }

    /// Load weights from a safetensors file or a PyTorch state dict.
    pub fn load(config: ModelConfig, weights_path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let start = Instant::now();
        let weights_path = weights_path.as_ref();
        if !weights_path.exists() {
            return Err(MtglError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("weights not found: {}", weights_path.display()),
            )));
        }
        info!("Loading weights from {:?}", weights_path);

        let vb = if weights_path.extension().map(|e| e == "safetensors").unwrap_or(false) {
            // SAFETY: the file is not modified while mapped
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? }
        } else {
            VarBuilder::from_pth(weights_path, DType::F32, device)?
        };

        let model = Self::new(config, vb)?;
        info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn gating_config(&self) -> &GatingConfig {
        &self.gating_config
    }

    pub fn n_tasks(&self) -> usize {
        self.heads.len()
    }

    /// Inference: `(N, in_feats)` atom features to `(B, n_tasks)` scores.
    pub fn forward(&self, graph: &BatchedGraph, node_feats: &Tensor) -> Result<Tensor> {
        self.forward_t(graph, node_feats, false)
    }

    /// Forward pass; `train` enables dropout and batch statistics.
    pub fn forward_t(&self, graph: &BatchedGraph, node_feats: &Tensor, train: bool) -> Result<Tensor> {
        Ok(self.forward_detailed(graph, node_feats, train)?.predictions)
    }

    /// Forward pass that also reports gates, atom weights and the
    /// per-head molecule embeddings.
    pub fn forward_detailed(&self, graph: &BatchedGraph, node_feats: &Tensor, train: bool) -> Result<ModelOutput> {
        let width = node_feats.dim(1)?;
        if width != self.config.in_feats {
            return Err(MtglError::shape("atom feature width", self.config.in_feats, width));
        }
        graph.check_node_feats(node_feats)?;

        let h = self.conv1.forward_t(graph, node_feats, train)?;
        let h = self.conv2.forward_t(graph, &h, train)?;

        let (mol_embeddings, gate_weights, atom_weights) = match self.weighted_sum_readout.forward(graph, &h)? {
            // without attention every head reads the shared readout
            Readout::Shared(shared) => (vec![shared; self.n_tasks()], None, None),
            Readout::PerTask {
                task_feats,
                shared,
                node_weights,
            } => {
                let hg = graph.mean_nodes(&h)?;
                let blend = self.gating.forward(&hg, &task_feats, &shared)?;
                let slots = self
                    .gating_config
                    .routes
                    .iter()
                    .map(|route| match *route {
                        TaskRoute::Specific(t) => task_feats
                            .get(t)
                            .cloned()
                            .ok_or_else(|| MtglError::InvalidConfig(format!("task {t} has no readout"))),
                        TaskRoute::Combined => blend
                            .as_ref()
                            .map(|b| b.combined.clone())
                            .ok_or_else(|| MtglError::InvalidConfig("combined route without gates".to_string())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                (slots, blend.map(|b| b.weights), node_weights)
            }
        };

        let predictions = self
            .heads
            .iter()
            .zip(mol_embeddings.iter())
            .map(|(head, emb)| head.forward_t(emb, train))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let predictions = Tensor::cat(&predictions, 1)?;

        debug!(
            "Forward: {} graphs, {} atoms -> {:?}",
            graph.batch_size(),
            graph.num_nodes(),
            predictions.dims()
        );

        Ok(ModelOutput {
            predictions,
            gate_weights,
            atom_weights,
            mol_embeddings,
        })
    }

    /// Predictions as one row per molecule, in batch order.
    pub fn predict(&self, graph: &BatchedGraph, node_feats: &Tensor) -> Result<Vec<Vec<f32>>> {
        Ok(self.forward(graph, node_feats)?.to_vec2::<f32>()?)
    }
}

/// Total number of scalars held in `varmap`, including batch-norm statistics.
pub fn count_parameters(varmap: &VarMap) -> usize {
    varmap.all_vars().iter().map(|v| v.elem_count()).sum()
}
