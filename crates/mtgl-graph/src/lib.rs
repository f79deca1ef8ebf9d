//! MTGL Graph
//!
//! Molecular graphs and the batched-graph primitives the model is built on:
//! neighbour aggregation with symmetric degree normalisation, and per-graph
//! sum/mean readouts segmented by graph membership.
//!
//! A batch is the disjoint union of its molecules. Node ids are offset per
//! molecule, so one `(N, F)` feature tensor covers the whole batch.
//!
//! # Example
//! ```rust
//! use candle_core::{Device, Tensor};
//! use mtgl_graph::{BatchedGraph, MolGraph};
//!
//! # fn main() -> mtgl_common::Result<()> {
//! let water = MolGraph::from_bonds(3, &[(0, 1), (0, 2)], true)?;
//! let ethanol = MolGraph::from_bonds(3, &[(0, 1), (1, 2)], true)?;
//! let bg = BatchedGraph::new(&[water, ethanol], &Device::Cpu)?;
//!
//! let feats = Tensor::ones((6, 4), candle_core::DType::F32, &Device::Cpu)?;
//! let pooled = bg.mean_nodes(&feats)?;
//! assert_eq!(pooled.dims(), &[2, 4]);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod graph;
pub mod message;
pub mod readout;

pub use batch::BatchedGraph;
pub use graph::{FeaturizedMolecule, MolGraph};
