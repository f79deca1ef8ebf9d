//! Softmax gates blending task-specific and shared graph embeddings.

use candle_core::{Module, Tensor, D};
use candle_nn::{linear, ops::softmax, Linear, VarBuilder};
use mtgl_common::{GatingConfig, MtglError, Result, SharedEmbedding};

/// Result of running all gates.
#[derive(Debug, Clone)]
pub struct GatedBlend {
    /// Sum of the gated blends, `(B, F)`
    pub combined: Tensor,
    /// Gate distributions stacked as `(B, gates, 2)`:
    /// `[.., 0]` weighs the task embedding, `[.., 1]` the shared one
    pub weights: Tensor,
}

/// One `Linear(F, 2)` + softmax gate per gated task, conditioned on the
/// mean-pooled graph representation.
pub struct TaskGating {
    gates: Vec<Linear>,
    gated_tasks: Vec<usize>,
    shared: SharedEmbedding,
}

impl TaskGating {
    pub fn new(in_feats: usize, config: &GatingConfig, vb: VarBuilder) -> Result<Self> {
        let gates = (0..config.num_gates())
            .map(|i| linear(in_feats, 2, vb.pp(format!("gates.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            gates,
            gated_tasks: config.gated_tasks.clone(),
            shared: config.shared,
        })
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    /// Pick the second gate input: the shared readout or a task readout.
    pub fn shared_input<'a>(&self, task_feats: &'a [Tensor], shared_readout: &'a Tensor) -> Result<&'a Tensor> {
        match self.shared {
            SharedEmbedding::Readout => Ok(shared_readout),
            SharedEmbedding::Task(t) => task_feats.get(t).ok_or_else(|| {
                MtglError::InvalidConfig(format!("shared embedding task {t} has no readout"))
            }),
        }
    }

    /// Gate distribution of every gate, `(B, gates, 2)`.
    pub fn gate_weights(&self, hg: &Tensor) -> Result<Tensor> {
        let per_gate = self
            .gates
            .iter()
            .map(|gate| softmax(&gate.forward(hg)?, D::Minus1))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Tensor::stack(&per_gate, 1)?)
    }

    /// Blend every gated task embedding with the shared embedding and sum
    /// the blends. Returns `None` when no task is gated.
    ///
    /// `m_t = g_t[0] * task_feats[t] + g_t[1] * shared`, `g_t = softmax(gate_t(hg))`
    pub fn forward(&self, hg: &Tensor, task_feats: &[Tensor], shared_readout: &Tensor) -> Result<Option<GatedBlend>> {
        if self.gates.is_empty() {
            return Ok(None);
        }
        let shared = self.shared_input(task_feats, shared_readout)?;
        let weights = self.gate_weights(hg)?;

        let mut combined: Option<Tensor> = None;
        for (g, &task) in self.gated_tasks.iter().enumerate() {
            let x = task_feats.get(task).ok_or_else(|| {
                MtglError::InvalidConfig(format!("gated task {task} has no readout"))
            })?;
            let gate = weights.narrow(1, g, 1)?.squeeze(1)?;
            let m = (x.broadcast_mul(&gate.narrow(1, 0, 1)?)?
                + shared.broadcast_mul(&gate.narrow(1, 1, 1)?)?)?;
            combined = Some(match combined {
                Some(acc) => (acc + m)?,
                None => m,
            });
        }

        Ok(combined.map(|combined| GatedBlend { combined, weights }))
    }
}
