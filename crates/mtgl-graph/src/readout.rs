//! Per-graph readouts, segmented by graph membership.

use candle_core::Tensor;
use mtgl_common::{MtglError, Result};

use crate::batch::BatchedGraph;

impl BatchedGraph {
    /// Sum node features per graph: `(N, F) -> (B, F)`.
    ///
    /// With `weights` of shape `(N, 1)` every row is scaled by its weight
    /// before summation. Graphs without nodes read out as zeros.
    pub fn sum_nodes(&self, feats: &Tensor, weights: Option<&Tensor>) -> Result<Tensor> {
        self.check_node_feats(feats)?;
        let feats = match weights {
            Some(w) => {
                let rows = w.dim(0)?;
                if rows != self.num_nodes() {
                    return Err(MtglError::shape("node weight rows", self.num_nodes(), rows));
                }
                feats.broadcast_mul(w)?
            }
            None => feats.clone(),
        };
        // index_add reads its source as a contiguous buffer
        let feats = feats.contiguous()?;
        let f = feats.dim(1)?;
        let out = Tensor::zeros((self.batch_size(), f), feats.dtype(), feats.device())?;
        if self.num_nodes() == 0 {
            return Ok(out);
        }
        Ok(out.index_add(&self.node_graph, &feats, 0)?)
    }

    /// Average node features per graph: `(N, F) -> (B, F)`.
    pub fn mean_nodes(&self, feats: &Tensor) -> Result<Tensor> {
        let summed = self.sum_nodes(feats, None)?;
        Ok(summed.broadcast_div(&self.node_counts.to_dtype(summed.dtype())?)?)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Tensor};
    use pretty_assertions::assert_eq;

    use crate::graph::MolGraph;
    use crate::BatchedGraph;

    fn two_graphs() -> BatchedGraph {
        let a = MolGraph::from_bonds(2, &[(0, 1)], true).unwrap();
        let b = MolGraph::from_bonds(3, &[(0, 1), (1, 2)], true).unwrap();
        BatchedGraph::new(&[a, b], &Device::Cpu).unwrap()
    }

    fn feats() -> Tensor {
        Tensor::new(
            &[[1f32, 0.0], [3.0, 1.0], [2.0, 2.0], [4.0, 2.0], [6.0, 5.0]],
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn test_sum_nodes() {
        let out = two_graphs().sum_nodes(&feats(), None).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out, vec![vec![4.0, 1.0], vec![12.0, 9.0]]);
    }

    #[test]
    fn test_weighted_sum_nodes() {
        let w = Tensor::new(&[[1f32], [0.0], [0.5], [0.5], [0.0]], &Device::Cpu).unwrap();
        let out = two_graphs().sum_nodes(&feats(), Some(&w)).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![3.0, 2.0]]);
    }

    #[test]
    fn test_mean_nodes() {
        let out = two_graphs().mean_nodes(&feats()).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out, vec![vec![2.0, 0.5], vec![4.0, 3.0]]);
    }

    #[test]
    fn test_empty_graph_reads_out_zero() {
        let a = MolGraph::from_bonds(0, &[], true).unwrap();
        let b = MolGraph::from_bonds(1, &[], true).unwrap();
        let bg = BatchedGraph::new(&[a, b], &Device::Cpu).unwrap();
        let x = Tensor::new(&[[2f32, 4.0]], &Device::Cpu).unwrap();
        let out = bg.mean_nodes(&x).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out, vec![vec![0.0, 0.0], vec![2.0, 4.0]]);
    }

    #[test]
    fn test_weight_rows_checked() {
        let w = Tensor::ones((4, 1), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(two_graphs().sum_nodes(&feats(), Some(&w)).is_err());
    }

    #[test]
    fn test_sum_nodes_strided_input() {
        // (F, N) transposed into a non-contiguous (N, F) view
        let x = Tensor::new(&[[1f32, 3.0, 2.0, 4.0, 6.0], [0.0, 1.0, 2.0, 2.0, 5.0]], &Device::Cpu)
            .unwrap()
            .t()
            .unwrap();
        assert!(!x.is_contiguous());
        let g = two_graphs();
        assert_eq!(g.sum_nodes(&x, None).unwrap().to_vec2::<f32>().unwrap(), vec![vec![4.0, 1.0], vec![12.0, 9.0]]);
        assert_eq!(g.mean_nodes(&x).unwrap().to_vec2::<f32>().unwrap(), vec![vec![2.0, 0.5], vec![4.0, 3.0]]);
    }
}
