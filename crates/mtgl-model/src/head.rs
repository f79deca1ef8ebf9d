//! Per-task fully-connected prediction heads.

use candle_core::{Module, Result, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Dropout, Linear, ModuleT, VarBuilder};

/// Dropout → Linear → ReLU → BatchNorm.
///
/// Sub-module paths `1` and `3` mirror the positions in a sequential stack
/// so checkpoints exported from it load unchanged.
pub struct FcBlock {
    dropout: Dropout,
    linear: Linear,
    bn: BatchNorm,
}

impl FcBlock {
    pub fn new(dropout: f64, in_feats: usize, hidden_feats: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            dropout: Dropout::new(dropout as f32),
            linear: linear(in_feats, hidden_feats, vb.pp("1"))?,
            bn: batch_norm(hidden_feats, BatchNormConfig::default(), vb.pp("3"))?,
        })
    }
}

impl ModuleT for FcBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.dropout.forward_t(xs, train)?;
        let xs = self.linear.forward(&xs)?.relu()?;
        self.bn.forward_t(&xs, train)
    }
}

/// Two [`FcBlock`]s followed by a linear output to one score.
pub struct PredictionHead {
    fc1: FcBlock,
    fc2: FcBlock,
    output: Linear,
}

impl PredictionHead {
    /// Build head `index`; `vb` is the model root.
    pub fn new(
        index: usize,
        dropout: f64,
        in_feats: usize,
        hidden_feats: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            fc1: FcBlock::new(dropout, in_feats, hidden_feats, vb.pp(format!("fc_layers1.{index}")))?,
            fc2: FcBlock::new(dropout, hidden_feats, hidden_feats, vb.pp(format!("fc_layers2.{index}")))?,
            output: linear(hidden_feats, 1, vb.pp(format!("output_layer1.{index}.0")))?,
        })
    }
}

impl ModuleT for PredictionHead {
    /// `(B, F) -> (B, 1)`
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let h1 = self.fc1.forward_t(xs, train)?;
        let h2 = self.fc2.forward_t(&h1, train)?;
        self.output.forward(&h2)
    }
}
