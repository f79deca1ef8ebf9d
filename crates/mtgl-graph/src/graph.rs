//! Single-molecule graphs.

use mtgl_common::{MtglError, Result};
use serde::{Deserialize, Serialize};

/// Directed graph over the atoms of one molecule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolGraph {
    num_nodes: usize,
    edges: Vec<(u32, u32)>,
}

impl MolGraph {
    /// Create a graph from directed `(src, dst)` edges.
    pub fn new(num_nodes: usize, edges: Vec<(u32, u32)>) -> Result<Self> {
        if let Some(&(u, v)) = edges
            .iter()
            .find(|&&(u, v)| u as usize >= num_nodes || v as usize >= num_nodes)
        {
            return Err(MtglError::InvalidGraph(format!(
                "edge ({u}, {v}) out of range for {num_nodes} nodes"
            )));
        }
        Ok(Self { num_nodes, edges })
    }

    /// Build a bidirected graph from undirected bonds.
    ///
    /// Each bond `(u, v)` becomes the edges `u -> v` and `v -> u`. With
    /// `add_self_loops` every atom also gets an edge to itself, so that it
    /// keeps its own features during aggregation.
    pub fn from_bonds(num_atoms: usize, bonds: &[(usize, usize)], add_self_loops: bool) -> Result<Self> {
        let mut edges = Vec::with_capacity(bonds.len() * 2 + if add_self_loops { num_atoms } else { 0 });
        for &(u, v) in bonds {
            if u >= num_atoms || v >= num_atoms {
                return Err(MtglError::InvalidGraph(format!(
                    "bond ({u}, {v}) out of range for {num_atoms} atoms"
                )));
            }
            edges.push((u as u32, v as u32));
            if u != v {
                edges.push((v as u32, u as u32));
            }
        }
        if add_self_loops {
            edges.extend((0..num_atoms as u32).map(|i| (i, i)));
        }
        Ok(Self { num_nodes: num_atoms, edges })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[(u32, u32)] {
        &self.edges
    }

    /// Number of incoming edges per node.
    pub fn in_degrees(&self) -> Vec<u32> {
        let mut deg = vec![0u32; self.num_nodes];
        for &(_, v) in &self.edges {
            deg[v as usize] += 1;
        }
        deg
    }

    /// Number of outgoing edges per node.
    pub fn out_degrees(&self) -> Vec<u32> {
        let mut deg = vec![0u32; self.num_nodes];
        for &(u, _) in &self.edges {
            deg[u as usize] += 1;
        }
        deg
    }
}

/// A molecule as handed over by a featuriser: bond list plus one feature
/// row per atom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturizedMolecule {
    pub id: String,
    pub num_atoms: usize,
    #[serde(default)]
    pub bonds: Vec<(usize, usize)>,
    #[serde(default = "default_self_loops")]
    pub self_loops: bool,
    pub node_feats: Vec<Vec<f32>>,
}

fn default_self_loops() -> bool { true }

impl FeaturizedMolecule {
    pub fn graph(&self) -> Result<MolGraph> {
        MolGraph::from_bonds(self.num_atoms, &self.bonds, self.self_loops)
    }

    /// Width of the atom features, if the molecule has any atoms.
    pub fn feature_width(&self) -> Option<usize> {
        self.node_feats.first().map(|row| row.len())
    }
}
