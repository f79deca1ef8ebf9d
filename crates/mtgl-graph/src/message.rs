//! Neighbour aggregation over a batched graph.

use candle_core::Tensor;
use mtgl_common::Result;

use crate::batch::BatchedGraph;

impl BatchedGraph {
    /// Sum the features of every node's in-neighbours.
    ///
    /// `out[v] = Σ_{u -> v} feats[u]`. Nodes without incoming edges get zeros.
    pub fn aggregate_sum(&self, feats: &Tensor) -> Result<Tensor> {
        self.check_node_feats(feats)?;
        let (n, f) = feats.dims2()?;
        let out = Tensor::zeros((n, f), feats.dtype(), feats.device())?;
        if self.num_edges() == 0 {
            return Ok(out);
        }
        // gather along edges, then scatter-add onto destinations
        let messages = feats.contiguous()?.index_select(&self.src, 0)?.contiguous()?;
        Ok(out.index_add(&self.dst, &messages, 0)?)
    }

    /// Symmetrically normalised aggregation:
    /// `out[v] = Σ_{u -> v} feats[u] / sqrt(out_deg(u) * in_deg(v))`,
    /// degrees clamped to at least 1.
    pub fn gcn_aggregate(&self, feats: &Tensor) -> Result<Tensor> {
        let dtype = feats.dtype();
        let scaled = feats.broadcast_mul(&self.norm_src.to_dtype(dtype)?)?;
        let summed = self.aggregate_sum(&scaled)?;
        Ok(summed.broadcast_mul(&self.norm_dst.to_dtype(dtype)?)?)
    }
}
