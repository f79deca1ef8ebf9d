//! Fixtures for MTGL tests: random molecules and batches.

use std::path::Path;

use candle_core::{Device, Tensor};
use mtgl_common::Result;
use mtgl_graph::{BatchedGraph, FeaturizedMolecule};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod pth;

pub use pth::write_state_dict_pth;

/// Width of the canonical atom featuriser output.
pub const ATOM_FEATURE_WIDTH: usize = 74;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A connected molecule: a chain of atoms, one ring closure when there are
/// at least five atoms, sparse binary atom features.
pub fn random_molecule(id: &str, num_atoms: usize, width: usize, rng: &mut impl Rng) -> FeaturizedMolecule {
    let mut bonds: Vec<(usize, usize)> = (1..num_atoms).map(|i| (i - 1, i)).collect();
    if num_atoms >= 5 {
        let start = rng.gen_range(0..num_atoms - 4);
        bonds.push((start, start + 4));
    }
    let node_feats = (0..num_atoms)
        .map(|_| {
            (0..width)
                .map(|_| if rng.gen_bool(0.15) { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();
    FeaturizedMolecule {
        id: id.to_string(),
        num_atoms,
        bonds,
        self_loops: true,
        node_feats,
    }
}

/// One random molecule per entry of `atom_counts`.
pub fn random_molecules(atom_counts: &[usize], width: usize, seed: u64) -> Vec<FeaturizedMolecule> {
    let mut rng = seeded_rng(seed);
    atom_counts
        .iter()
        .enumerate()
        .map(|(i, &n)| random_molecule(&format!("mol_{i}"), n, width, &mut rng))
        .collect()
}

/// Batched graph and `(N, width)` features on the CPU.
pub fn random_batch(atom_counts: &[usize], width: usize, seed: u64) -> Result<(BatchedGraph, Tensor)> {
    BatchedGraph::from_molecules(&random_molecules(atom_counts, width, seed), &Device::Cpu)
}

pub fn write_molecules_json(path: &Path, molecules: &[FeaturizedMolecule]) -> std::io::Result<()> {
    let json = serde_json::to_string(molecules)?;
    std::fs::write(path, json)
}

/// Panic unless every element of `t` is finite.
pub fn assert_all_finite(t: &Tensor) {
    let values = t
        .flatten_all()
        .and_then(|t| t.to_dtype(candle_core::DType::F32))
        .and_then(|t| t.to_vec1::<f32>())
        .expect("tensor readable as f32");
    assert!(
        values.iter().all(|v| v.is_finite()),
        "tensor contains NaN or Inf: {values:?}"
    );
}
