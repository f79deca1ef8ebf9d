//! MTGL-ADMET
//!
//! Multi-task graph neural network for ADMET property prediction, built on
//! Candle (Hugging Face). No Python dependency.
//!
//! # Architecture
//! - Two residual graph convolutions over the atom graph
//! - Per-task attention readout plus a shared readout
//! - Softmax gates blending task readouts with the shared one
//! - One fully-connected head per task, one raw score each
//!
//! # Example
//! ```rust
//! use candle_core::Device;
//! use mtgl_common::ModelConfig;
//! use mtgl_graph::{BatchedGraph, FeaturizedMolecule};
//! use mtgl_model::MtglAdmet;
//!
//! # fn main() -> mtgl_common::Result<()> {
//! let config = ModelConfig { in_feats: 4, ..Default::default() };
//! let (model, _varmap) = MtglAdmet::fresh(config, &Device::Cpu)?;
//!
//! let mol = FeaturizedMolecule {
//!     id: "ethanol".to_string(),
//!     num_atoms: 3,
//!     bonds: vec![(0, 1), (1, 2)],
//!     self_loops: true,
//!     node_feats: vec![vec![1.0, 0.0, 0.0, 1.0]; 3],
//! };
//! let (graph, feats) = BatchedGraph::from_molecules(&[mol], &Device::Cpu)?;
//! let scores = model.forward(&graph, &feats)?;
//! assert_eq!(scores.dims(), &[1, 5]);
//! # Ok(())
//! # }
//! ```

pub mod conv;
pub mod device;
pub mod gating;
pub mod head;
pub mod model;
pub mod readout;

pub use conv::{GraphConv, GraphModule, ResGcnLayer};
pub use device::{is_gpu, select_device};
pub use gating::{GatedBlend, TaskGating};
pub use head::PredictionHead;
pub use model::{count_parameters, ModelOutput, MtglAdmet};
pub use readout::{Readout, WeightAndSum};
