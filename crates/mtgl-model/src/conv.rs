//! Graph convolution layers.

use candle_core::{Module, Tensor};
use candle_nn::init::Init;
use candle_nn::{batch_norm, linear, Activation, BatchNorm, BatchNormConfig, Linear, ModuleT, VarBuilder};
use mtgl_common::{MtglError, Result};
use mtgl_graph::BatchedGraph;
use tracing::debug;

/// A layer that maps node features over a batched graph.
pub trait GraphModule {
    fn forward_t(&self, graph: &BatchedGraph, feats: &Tensor, train: bool) -> Result<Tensor>;

    fn forward(&self, graph: &BatchedGraph, feats: &Tensor) -> Result<Tensor> {
        self.forward_t(graph, feats, false)
    }
}

/// Graph convolution with symmetric degree normalisation:
///
/// `h'_v = act(b + W^T Σ_{u -> v} h_u / sqrt(out_deg(u) in_deg(v)))`
///
/// Parameters: `weight` of shape `(in, out)` and `bias` of shape `(out,)`.
pub struct GraphConv {
    weight: Tensor,
    bias: Option<Tensor>,
    activation: Option<Activation>,
    allow_zero_in_degree: bool,
    in_feats: usize,
    out_feats: usize,
}

impl GraphConv {
    pub fn new(
        in_feats: usize,
        out_feats: usize,
        bias: bool,
        activation: Option<Activation>,
        allow_zero_in_degree: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        // Xavier uniform
        let bound = (6.0 / (in_feats + out_feats) as f64).sqrt();
        let weight = vb.get_with_hints((in_feats, out_feats), "weight", Init::Uniform { lo: -bound, up: bound })?;
        let bias = if bias {
            Some(vb.get_with_hints(out_feats, "bias", Init::Const(0.0))?)
        } else {
            None
        };
        Ok(Self {
            weight,
            bias,
            activation,
            allow_zero_in_degree,
            in_feats,
            out_feats,
        })
    }
}

impl GraphModule for GraphConv {
    fn forward_t(&self, graph: &BatchedGraph, feats: &Tensor, _train: bool) -> Result<Tensor> {
        let width = feats.dim(1)?;
        if width != self.in_feats {
            return Err(MtglError::shape("graph convolution input width", self.in_feats, width));
        }
        if !self.allow_zero_in_degree && graph.zero_in_degree_count() > 0 {
            return Err(MtglError::ZeroInDegree {
                count: graph.zero_in_degree_count(),
            });
        }

        // project first when that shrinks the messages
        let h = if self.in_feats > self.out_feats {
            graph.gcn_aggregate(&feats.matmul(&self.weight)?)?
        } else {
            graph.gcn_aggregate(feats)?.matmul(&self.weight)?
        };
        let h = match &self.bias {
            Some(b) => h.broadcast_add(b)?,
            None => h,
        };
        Ok(match &self.activation {
            Some(act) => act.forward(&h)?,
            None => h,
        })
    }
}

/// Residual graph convolution block:
/// graph convolution, plus `act(Linear(x))` when residual, then batch norm.
pub struct ResGcnLayer {
    graph_conv_layer: GraphConv,
    res_connection: Option<Linear>,
    bn_layer: Option<BatchNorm>,
    activation: Activation,
}

impl ResGcnLayer {
    pub fn new(
        in_feats: usize,
        out_feats: usize,
        residual: bool,
        batchnorm: bool,
        allow_zero_in_degree: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let activation = Activation::Relu;
        let graph_conv_layer = GraphConv::new(
            in_feats,
            out_feats,
            true,
            Some(activation),
            allow_zero_in_degree,
            vb.pp("graph_conv_layer"),
        )?;
        let res_connection = if residual {
            Some(linear(in_feats, out_feats, vb.pp("res_connection"))?)
        } else {
            None
        };
        let bn_layer = if batchnorm {
            Some(batch_norm(out_feats, BatchNormConfig::default(), vb.pp("bn_layer"))?)
        } else {
            None
        };
        debug!(
            "ResGcnLayer {} -> {} (residual: {}, batchnorm: {})",
            in_feats, out_feats, residual, batchnorm
        );
        Ok(Self {
            graph_conv_layer,
            res_connection,
            bn_layer,
            activation,
        })
    }
}

impl GraphModule for ResGcnLayer {
    fn forward_t(&self, graph: &BatchedGraph, feats: &Tensor, train: bool) -> Result<Tensor> {
        let mut new_feats = self.graph_conv_layer.forward_t(graph, feats, train)?;
        if let Some(res) = &self.res_connection {
            let res_feats = self.activation.forward(&res.forward(feats)?)?;
            new_feats = (new_feats + res_feats)?;
        }
        if let Some(bn) = &self.bn_layer {
            new_feats = bn.forward_t(&new_feats, train)?;
        }
        Ok(new_feats)
    }
}
