//! Attention readout: node features to one graph vector per task.

use candle_core::{Module, Tensor};
use candle_nn::{linear, ops::sigmoid, Linear, VarBuilder};
use mtgl_common::{MtglError, Result};
use mtgl_graph::BatchedGraph;

/// Output of [`WeightAndSum`].
#[derive(Debug, Clone)]
pub enum Readout {
    /// Attention mode: one `(B, F)` embedding per task plus the shared one.
    PerTask {
        task_feats: Vec<Tensor>,
        shared: Tensor,
        /// Per-task `(N, 1)` atom weights, kept only when requested
        node_weights: Option<Vec<Tensor>>,
    },
    /// Attention disabled: the shared `(B, F)` embedding only.
    Shared(Tensor),
}

impl Readout {
    /// The embedding produced by the shared atom-weighting gate.
    pub fn shared(&self) -> &Tensor {
        match self {
            Readout::PerTask { shared, .. } => shared,
            Readout::Shared(shared) => shared,
        }
    }
}

/// Weighted sum of node features, with a learned `sigmoid(Linear(h))` weight
/// per node. One weighting per task plus one shared weighting.
pub struct WeightAndSum {
    atom_weighting_specific: Vec<Linear>,
    shared_weighting: Linear,
    attention: bool,
    return_weight: bool,
    in_feats: usize,
}

impl WeightAndSum {
    pub fn new(in_feats: usize, task_num: usize, attention: bool, return_weight: bool, vb: VarBuilder) -> Result<Self> {
        let atom_weighting_specific = (0..task_num)
            .map(|i| atom_weight(in_feats, vb.pp(format!("atom_weighting_specific.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let shared_weighting = atom_weight(in_feats, vb.pp("shared_weighting"))?;
        Ok(Self {
            atom_weighting_specific,
            shared_weighting,
            attention,
            return_weight,
            in_feats,
        })
    }

    pub fn task_num(&self) -> usize {
        self.atom_weighting_specific.len()
    }

    /// Weighted per-graph sum of `feats` under one weighting.
    /// Returns the `(B, F)` readout and the `(N, 1)` weights.
    fn weighted_sum(&self, graph: &BatchedGraph, feats: &Tensor, weighting: &Linear) -> Result<(Tensor, Tensor)> {
        let w = sigmoid(&weighting.forward(feats)?)?;
        let summed = graph.sum_nodes(feats, Some(&w))?;
        Ok((summed, w))
    }

    pub fn forward(&self, graph: &BatchedGraph, feats: &Tensor) -> Result<Readout> {
        let width = feats.dim(1)?;
        if width != self.in_feats {
            return Err(MtglError::shape("readout input width", self.in_feats, width));
        }

        let (shared, _) = self.weighted_sum(graph, feats, &self.shared_weighting)?;
        if !self.attention {
            return Ok(Readout::Shared(shared));
        }

        let mut task_feats = Vec::with_capacity(self.task_num());
        let mut atom_weights = Vec::with_capacity(self.task_num());
        for weighting in &self.atom_weighting_specific {
            let (summed, w) = self.weighted_sum(graph, feats, weighting)?;
            task_feats.push(summed);
            atom_weights.push(w);
        }

        Ok(Readout::PerTask {
            task_feats,
            shared,
            node_weights: self.return_weight.then_some(atom_weights),
        })
    }
}

// The `.0` suffix keeps the parameter paths of a one-layer sequential gate.
fn atom_weight(in_feats: usize, vb: VarBuilder) -> candle_core::Result<Linear> {
    linear(in_feats, 1, vb.pp("0"))
}
