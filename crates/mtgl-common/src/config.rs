//! Model configuration.
//!
//! Configs can be written by hand in YAML, TOML or JSON. Every field has a
//! default, and the defaults reproduce the published MTGL-ADMET model
//! (74 atom features, five tasks, four gates).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{MtglError, Result};

/// Number of tasks in the published model.
pub const PUBLISHED_TASK_COUNT: usize = 5;

/// Complete model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Width of the per-atom input features
    #[serde(default = "default_in_feats")]
    pub in_feats: usize,

    /// Width after the first graph convolution
    #[serde(default = "default_hidden_feats")]
    pub hidden_feats: usize,

    /// Width after the second graph convolution (node embedding width)
    #[serde(default = "default_gnn_out_feats")]
    pub gnn_out_feats: usize,

    /// Number of prediction heads
    #[serde(default = "default_n_tasks")]
    pub n_tasks: usize,

    /// Dropout rate in the prediction heads
    #[serde(default)]
    pub dropout: f64,

    /// Residual projection in the graph convolution blocks
    #[serde(default = "default_true")]
    pub residual: bool,

    /// Batch normalisation in the graph convolution blocks
    #[serde(default = "default_true")]
    pub batchnorm: bool,

    /// Per-task attention readout (otherwise only the shared readout is used)
    #[serde(default = "default_true")]
    pub attention: bool,

    /// Keep per-task atom weights for interpretation
    #[serde(default)]
    pub return_weight: bool,

    /// Hidden width of the prediction heads
    #[serde(default = "default_classifier_hidden_feats")]
    pub classifier_hidden_feats: usize,

    /// Accept graphs with nodes that receive no messages
    #[serde(default)]
    pub allow_zero_in_degree: bool,

    /// Optional display names, one per task
    #[serde(default)]
    pub task_names: Vec<String>,

    /// Gate and head routing; derived from `n_tasks` when absent
    #[serde(default)]
    pub gating: Option<GatingConfig>,
}

fn default_in_feats() -> usize { 74 }
fn default_hidden_feats() -> usize { 128 }
fn default_gnn_out_feats() -> usize { 64 }
fn default_n_tasks() -> usize { PUBLISHED_TASK_COUNT }
fn default_classifier_hidden_feats() -> usize { 128 }
fn default_true() -> bool { true }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            in_feats: default_in_feats(),
            hidden_feats: default_hidden_feats(),
            gnn_out_feats: default_gnn_out_feats(),
            n_tasks: default_n_tasks(),
            dropout: 0.0,
            residual: true,
            batchnorm: true,
            attention: true,
            return_weight: false,
            classifier_hidden_feats: default_classifier_hidden_feats(),
            allow_zero_in_degree: false,
            task_names: Vec::new(),
            gating: None,
        }
    }
}

// ── Gating ────────────────────────────────────────────────────────────────────

/// Which embedding a prediction head consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRoute {
    /// The task-specific readout of task `i`
    Specific(usize),
    /// The sum of all gated blends
    Combined,
}

/// Second input of every gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharedEmbedding {
    /// The readout produced by the shared atom-weighting gate
    #[default]
    Readout,
    /// The task-specific readout of task `i`
    Task(usize),
}

/// Mapping from tasks to gates and from prediction heads to embeddings.
///
/// Routes are written as `combined` or `{specific: 0}` in every format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatingConfig {
    /// Tasks whose readout is blended with the shared embedding, one gate each
    #[serde(default)]
    pub gated_tasks: Vec<usize>,

    /// What every gate blends against
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub shared: SharedEmbedding,

    /// One entry per prediction head
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub routes: Vec<TaskRoute>,
}

impl GatingConfig {
    /// The published five-task layout: tasks 0-3 are gated against the
    /// task-4 readout, the combined blend feeds head 1 and heads 0, 2, 3, 4
    /// read tasks 0, 1, 2, 3.
    pub fn published() -> Self {
        Self {
            gated_tasks: vec![0, 1, 2, 3],
            shared: SharedEmbedding::Task(4),
            routes: vec![
                TaskRoute::Specific(0),
                TaskRoute::Combined,
                TaskRoute::Specific(1),
                TaskRoute::Specific(2),
                TaskRoute::Specific(3),
            ],
        }
    }

    /// Every head reads its own task readout; no gates.
    pub fn passthrough(n_tasks: usize) -> Self {
        Self {
            gated_tasks: Vec::new(),
            shared: SharedEmbedding::Readout,
            routes: (0..n_tasks).map(TaskRoute::Specific).collect(),
        }
    }

    /// Check the layout against the number of tasks.
    pub fn validate(&self, n_tasks: usize) -> Result<()> {
        if self.routes.len() != n_tasks {
            return Err(MtglError::InvalidConfig(format!(
                "gating has {} routes but the model has {} tasks",
                self.routes.len(),
                n_tasks
            )));
        }

        let mut seen = HashSet::new();
        for &t in &self.gated_tasks {
            if t >= n_tasks {
                return Err(MtglError::InvalidConfig(format!(
                    "gated task {t} is out of range for {n_tasks} tasks"
                )));
            }
            if !seen.insert(t) {
                return Err(MtglError::InvalidConfig(format!("task {t} is gated twice")));
            }
        }

        if let SharedEmbedding::Task(t) = self.shared {
            if t >= n_tasks {
                return Err(MtglError::InvalidConfig(format!(
                    "shared embedding task {t} is out of range for {n_tasks} tasks"
                )));
            }
        }

        for (head, route) in self.routes.iter().enumerate() {
            match *route {
                TaskRoute::Specific(t) if t >= n_tasks => {
                    return Err(MtglError::InvalidConfig(format!(
                        "head {head} reads task {t}, out of range for {n_tasks} tasks"
                    )));
                }
                TaskRoute::Combined if self.gated_tasks.is_empty() => {
                    return Err(MtglError::InvalidConfig(format!(
                        "head {head} reads the combined blend but no task is gated"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Number of gates.
    pub fn num_gates(&self) -> usize {
        self.gated_tasks.len()
    }

    /// True when any head reads the combined blend.
    pub fn uses_combined(&self) -> bool {
        self.routes.contains(&TaskRoute::Combined)
    }
}

// ── Helper Methods ─────────────────────────────────────────────────────────────

impl ModelConfig {
    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load from a TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from a JSON file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from a file, picking the format from its extension, then validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let config = match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(path)?,
            Some("toml") => Self::from_toml(path)?,
            Some("json") => Self::from_json(path)?,
            _ => {
                return Err(MtglError::InvalidConfig(format!(
                    "unsupported config format: {}",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save to a YAML file
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The gating layout in effect. Without an explicit layout the
    /// published one is used for five tasks and a passthrough otherwise.
    pub fn gating(&self) -> GatingConfig {
        match &self.gating {
            Some(g) => g.clone(),
            None if self.n_tasks == PUBLISHED_TASK_COUNT => GatingConfig::published(),
            None => GatingConfig::passthrough(self.n_tasks),
        }
    }

    /// Display name of task `i`.
    pub fn task_name(&self, i: usize) -> String {
        self.task_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("task_{i}"))
    }

    pub fn validate(&self) -> Result<()> {
        let widths = [
            ("in_feats", self.in_feats),
            ("hidden_feats", self.hidden_feats),
            ("gnn_out_feats", self.gnn_out_feats),
            ("n_tasks", self.n_tasks),
            ("classifier_hidden_feats", self.classifier_hidden_feats),
        ];
        for (name, value) in widths {
            if value == 0 {
                return Err(MtglError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(MtglError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        if !self.task_names.is_empty() && self.task_names.len() != self.n_tasks {
            return Err(MtglError::InvalidConfig(format!(
                "{} task names for {} tasks",
                self.task_names.len(),
                self.n_tasks
            )));
        }

        let gating = self.gating();
        gating.validate(self.n_tasks)?;

        if !self.attention && gating.num_gates() > 0 {
            warn!("attention is disabled; {} gate(s) will be ignored", gating.num_gates());
        }
        if gating.num_gates() > 0 && !gating.uses_combined() {
            warn!("{} gate(s) configured but no head reads the combined blend", gating.num_gates());
        }
        if let SharedEmbedding::Task(t) = gating.shared {
            if gating.gated_tasks.contains(&t) {
                warn!("task {t} is gated against its own readout");
            }
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
