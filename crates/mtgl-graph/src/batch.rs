//! Batching of molecular graphs.

use candle_core::{Device, Tensor};
use mtgl_common::{MtglError, Result};
use tracing::debug;

use crate::graph::{FeaturizedMolecule, MolGraph};

/// Disjoint union of several molecular graphs, materialised on a device.
///
/// Holds topology only. Node features are passed alongside as an `(N, F)`
/// tensor whose rows follow the batch order of the graphs.
#[derive(Debug, Clone)]
pub struct BatchedGraph {
    batch_num_nodes: Vec<usize>,
    num_edges: usize,
    /// Edge sources, `(E,)` u32
    pub(crate) src: Tensor,
    /// Edge destinations, `(E,)` u32
    pub(crate) dst: Tensor,
    /// Graph id of every node, `(N,)` u32
    pub(crate) node_graph: Tensor,
    /// `out_deg^-1/2` per node, `(N, 1)` f32
    pub(crate) norm_src: Tensor,
    /// `in_deg^-1/2` per node, `(N, 1)` f32
    pub(crate) norm_dst: Tensor,
    /// Node count per graph clamped to 1, `(B, 1)` f32
    pub(crate) node_counts: Tensor,
    zero_in_degree: usize,
    device: Device,
}

impl BatchedGraph {
    /// Batch graphs into one disjoint graph.
    pub fn new(graphs: &[MolGraph], device: &Device) -> Result<Self> {
        if graphs.is_empty() {
            return Err(MtglError::InvalidGraph("cannot batch zero graphs".to_string()));
        }

        let num_nodes: usize = graphs.iter().map(|g| g.num_nodes()).sum();
        let num_edges: usize = graphs.iter().map(|g| g.num_edges()).sum();
        if num_nodes > u32::MAX as usize {
            return Err(MtglError::InvalidGraph(format!("{num_nodes} nodes exceed the u32 index range")));
        }

        let mut src = Vec::with_capacity(num_edges);
        let mut dst = Vec::with_capacity(num_edges);
        let mut node_graph = Vec::with_capacity(num_nodes);
        let mut in_deg = Vec::with_capacity(num_nodes);
        let mut out_deg = Vec::with_capacity(num_nodes);
        let mut batch_num_nodes = Vec::with_capacity(graphs.len());

        let mut offset = 0u32;
        for (gid, g) in graphs.iter().enumerate() {
            for &(u, v) in g.edges() {
                src.push(u + offset);
                dst.push(v + offset);
            }
            node_graph.extend(std::iter::repeat_n(gid as u32, g.num_nodes()));
            in_deg.extend(g.in_degrees());
            out_deg.extend(g.out_degrees());
            batch_num_nodes.push(g.num_nodes());
            offset += g.num_nodes() as u32;
        }

        let zero_in_degree = in_deg.iter().filter(|&&d| d == 0).count();
        let inv_sqrt = |d: &u32| 1.0 / ((*d).max(1) as f32).sqrt();
        let norm_src: Vec<f32> = out_deg.iter().map(inv_sqrt).collect();
        let norm_dst: Vec<f32> = in_deg.iter().map(inv_sqrt).collect();
        let counts: Vec<f32> = batch_num_nodes.iter().map(|&n| n.max(1) as f32).collect();

        let batch_size = graphs.len();
        debug!(
            "Batched {} graphs: {} nodes, {} edges",
            batch_size, num_nodes, num_edges
        );

        Ok(Self {
            batch_num_nodes,
            num_edges,
            src: Tensor::from_vec(src, num_edges, device)?,
            dst: Tensor::from_vec(dst, num_edges, device)?,
            node_graph: Tensor::from_vec(node_graph, num_nodes, device)?,
            norm_src: Tensor::from_vec(norm_src, (num_nodes, 1), device)?,
            norm_dst: Tensor::from_vec(norm_dst, (num_nodes, 1), device)?,
            node_counts: Tensor::from_vec(counts, (batch_size, 1), device)?,
            zero_in_degree,
            device: device.clone(),
        })
    }

    /// Batch featurised molecules, returning the graph and the stacked
    /// `(N, F)` node feature tensor.
    pub fn from_molecules(molecules: &[FeaturizedMolecule], device: &Device) -> Result<(Self, Tensor)> {
        let width = molecules
            .iter()
            .find_map(|m| m.feature_width())
            .ok_or_else(|| MtglError::InvalidGraph("batch contains no atoms".to_string()))?;

        let mut graphs = Vec::with_capacity(molecules.len());
        let mut data = Vec::new();
        for mol in molecules {
            if mol.node_feats.len() != mol.num_atoms {
                return Err(MtglError::shape(
                    format!("feature rows of molecule {}", mol.id),
                    mol.num_atoms,
                    mol.node_feats.len(),
                ));
            }
            for row in &mol.node_feats {
                if row.len() != width {
                    return Err(MtglError::shape(
                        format!("atom feature width of molecule {}", mol.id),
                        width,
                        row.len(),
                    ));
                }
                data.extend_from_slice(row);
            }
            graphs.push(mol.graph()?);
        }

        let bg = Self::new(&graphs, device)?;
        let feats = Tensor::from_vec(data, (bg.num_nodes(), width), device)?;
        Ok((bg, feats))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_num_nodes.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.batch_num_nodes.iter().sum()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn batch_num_nodes(&self) -> &[usize] {
        &self.batch_num_nodes
    }

    /// Number of nodes without incoming edges.
    pub fn zero_in_degree_count(&self) -> usize {
        self.zero_in_degree
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Check that `feats` has one row per node.
    pub fn check_node_feats(&self, feats: &Tensor) -> Result<()> {
        let rows = feats.dim(0)?;
        if rows != self.num_nodes() {
            return Err(MtglError::shape("node feature rows", self.num_nodes(), rows));
        }
        Ok(())
    }
}
