//! End-to-end tests of the MTGL-ADMET model on random molecules.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use mtgl_common::{GatingConfig, ModelConfig, MtglError, SharedEmbedding, TaskRoute};
use mtgl_graph::BatchedGraph;
use mtgl_model::{count_parameters, MtglAdmet};
use mtgl_test_utils::{assert_all_finite, random_batch, random_molecules, write_state_dict_pth, ATOM_FEATURE_WIDTH};
use pretty_assertions::assert_eq;

fn published_config() -> ModelConfig {
    ModelConfig {
        in_feats: ATOM_FEATURE_WIDTH,
        hidden_feats: 128,
        gnn_out_feats: 64,
        n_tasks: 5,
        ..Default::default()
    }
}

fn small_config() -> ModelConfig {
    ModelConfig {
        in_feats: 12,
        hidden_feats: 16,
        gnn_out_feats: 8,
        classifier_hidden_feats: 8,
        ..Default::default()
    }
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    (a - b)
        .unwrap()
        .abs()
        .unwrap()
        .flatten_all()
        .unwrap()
        .max(0)
        .unwrap()
        .to_scalar::<f32>()
        .unwrap()
}

#[test]
fn test_two_molecules_five_tasks() {
    let (model, _varmap) = MtglAdmet::fresh(published_config(), &Device::Cpu).unwrap();
    let (graph, feats) = random_batch(&[3, 5], ATOM_FEATURE_WIDTH, 7).unwrap();

    let scores = model.forward(&graph, &feats).unwrap();
    assert_eq!(scores.dims(), &[2, 5]);
    assert_all_finite(&scores);

    let scores = model.forward_t(&graph, &feats, true).unwrap();
    assert_eq!(scores.dims(), &[2, 5]);
    assert_all_finite(&scores);
}

#[test]
fn test_output_shape_follows_batch_size() {
    let (model, _varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    for sizes in [vec![4], vec![2, 3, 6], vec![5, 5, 5, 5, 1]] {
        let (graph, feats) = random_batch(&sizes, 12, 1).unwrap();
        let scores = model.forward(&graph, &feats).unwrap();
        assert_eq!(scores.dims(), &[sizes.len(), 5]);
    }
}

#[test]
fn test_gate_distributions_sum_to_one() {
    let (model, _varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    let (graph, feats) = random_batch(&[3, 4, 6], 12, 2).unwrap();

    let out = model.forward_detailed(&graph, &feats, false).unwrap();
    let gates = out.gate_weights.expect("published layout has gates");
    assert_eq!(gates.dims(), &[3, 4, 2]);
    let sums = gates.sum(D::Minus1).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
    for s in sums {
        assert!((s - 1.0).abs() < 1e-5, "gate sums to {s}");
    }
}

#[test]
fn test_atom_weights_cover_every_atom() {
    let config = ModelConfig {
        return_weight: true,
        ..small_config()
    };
    let (model, _varmap) = MtglAdmet::fresh(config, &Device::Cpu).unwrap();
    let (graph, feats) = random_batch(&[3, 5], 12, 3).unwrap();

    let out = model.forward_detailed(&graph, &feats, false).unwrap();
    let weights = out.atom_weights.expect("weights requested");
    assert_eq!(weights.len(), 5);
    for w in weights {
        assert_eq!(w.dims(), &[feats.dim(0).unwrap(), 1]);
    }
    assert_eq!(out.mol_embeddings.len(), 5);
}

#[test]
fn test_batchnorm_toggle_changes_values_not_shape() {
    let (graph, feats) = random_batch(&[3, 5], 12, 4).unwrap();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let with_bn = MtglAdmet::new(small_config(), vb.clone()).unwrap();
    let without_bn = MtglAdmet::new(ModelConfig { batchnorm: false, ..small_config() }, vb).unwrap();

    let a = with_bn.forward_t(&graph, &feats, true).unwrap();
    let b = without_bn.forward_t(&graph, &feats, true).unwrap();
    assert_eq!(a.dims(), b.dims());
    assert!(max_abs_diff(&a, &b) > 1e-4);
}

#[test]
fn test_residual_toggle_changes_values_not_shape() {
    let (graph, feats) = random_batch(&[3, 5], 12, 5).unwrap();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let with_res = MtglAdmet::new(ModelConfig { batchnorm: false, ..small_config() }, vb.clone()).unwrap();
    let without_res = MtglAdmet::new(
        ModelConfig {
            batchnorm: false,
            residual: false,
            ..small_config()
        },
        vb,
    )
    .unwrap();

    let a = with_res.forward(&graph, &feats).unwrap();
    let b = without_res.forward(&graph, &feats).unwrap();
    assert_eq!(a.dims(), b.dims());
    assert!(max_abs_diff(&a, &b) > 0.0);
}

#[test]
fn test_attention_disabled_uses_shared_readout() {
    let config = ModelConfig {
        attention: false,
        ..small_config()
    };
    let (model, _varmap) = MtglAdmet::fresh(config, &Device::Cpu).unwrap();
    let (graph, feats) = random_batch(&[4, 2], 12, 6).unwrap();

    let out = model.forward_detailed(&graph, &feats, false).unwrap();
    assert_eq!(out.predictions.dims(), &[2, 5]);
    assert!(out.gate_weights.is_none());
    assert!(out.atom_weights.is_none());
    for emb in &out.mol_embeddings[1..] {
        assert_eq!(max_abs_diff(emb, &out.mol_embeddings[0]), 0.0);
    }
}

#[test]
fn test_other_task_counts_use_passthrough() {
    let config = ModelConfig {
        n_tasks: 3,
        ..small_config()
    };
    let (model, _varmap) = MtglAdmet::fresh(config, &Device::Cpu).unwrap();
    assert_eq!(model.gating_config(), &GatingConfig::passthrough(3));
    let (graph, feats) = random_batch(&[3, 5], 12, 8).unwrap();

    let out = model.forward_detailed(&graph, &feats, false).unwrap();
    assert_eq!(out.predictions.dims(), &[2, 3]);
    assert!(out.gate_weights.is_none());
}

#[test]
fn test_unsupported_layout_rejected_at_construction() {
    let config = ModelConfig {
        n_tasks: 7,
        gating: Some(GatingConfig::published()),
        ..small_config()
    };
    let err = MtglAdmet::fresh(config, &Device::Cpu).err().expect("layout must be rejected");
    assert!(matches!(err, MtglError::InvalidConfig(_)));
}

#[test]
fn test_shared_readout_changes_only_the_combined_head() {
    let (graph, feats) = random_batch(&[3, 5], 12, 9).unwrap();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let default = MtglAdmet::new(small_config(), vb.clone()).unwrap();
    assert_eq!(default.gating_config().shared, SharedEmbedding::Task(4));

    let mut gating = GatingConfig::published();
    gating.shared = SharedEmbedding::Readout;
    let readout = MtglAdmet::new(ModelConfig { gating: Some(gating), ..small_config() }, vb).unwrap();

    let a = default.forward_detailed(&graph, &feats, false).unwrap();
    let b = readout.forward_detailed(&graph, &feats, false).unwrap();
    assert_all_finite(&a.predictions);
    assert!(max_abs_diff(&a.mol_embeddings[1], &b.mol_embeddings[1]) > 1e-6);
    for head in [0, 2, 3, 4] {
        assert_eq!(max_abs_diff(&a.mol_embeddings[head], &b.mol_embeddings[head]), 0.0);
    }
}

#[test]
fn test_gated_task_routed_directly_reads_raw_readout() {
    let (graph, feats) = random_batch(&[4, 6], 12, 13).unwrap();
    let config = ModelConfig { n_tasks: 3, ..small_config() };
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let plain = MtglAdmet::new(config.clone(), vb.clone()).unwrap();
    let gated = MtglAdmet::new(
        ModelConfig {
            gating: Some(GatingConfig {
                gated_tasks: vec![0],
                shared: SharedEmbedding::Readout,
                routes: vec![TaskRoute::Specific(0), TaskRoute::Combined, TaskRoute::Specific(2)],
            }),
            ..config
        },
        vb,
    )
    .unwrap();

    let a = plain.forward_detailed(&graph, &feats, false).unwrap();
    let b = gated.forward_detailed(&graph, &feats, false).unwrap();
    assert_eq!(b.gate_weights.unwrap().dims(), &[2, 1, 2]);
    assert_eq!(max_abs_diff(&a.mol_embeddings[0], &b.mol_embeddings[0]), 0.0);
    assert_eq!(max_abs_diff(&a.mol_embeddings[2], &b.mol_embeddings[2]), 0.0);
    assert!(max_abs_diff(&a.mol_embeddings[1], &b.mol_embeddings[1]) > 1e-6);
}

#[test]
fn test_wrong_feature_width_rejected() {
    let (model, _varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    let (graph, feats) = random_batch(&[3, 5], 10, 10).unwrap();
    let err = model.forward(&graph, &feats).unwrap_err();
    assert!(matches!(err, MtglError::ShapeMismatch { expected: 12, found: 10, .. }));
}

#[test]
fn test_isolated_atom_without_self_loop_rejected() {
    let (model, _varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    let mut molecules = random_molecules(&[1, 4], 12, 11);
    molecules[0].self_loops = false;
    let (graph, feats) = BatchedGraph::from_molecules(&molecules, &Device::Cpu).unwrap();
    let err = model.forward(&graph, &feats).unwrap_err();
    assert!(matches!(err, MtglError::ZeroInDegree { count: 1 }));
}

#[test]
fn test_checkpoint_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mtgl.safetensors");

    let (model, varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    varmap.save(&path).unwrap();
    let loaded = MtglAdmet::load(small_config(), &path, &Device::Cpu).unwrap();

    let (graph, feats) = random_batch(&[3, 5, 2], 12, 12).unwrap();
    let a = model.forward(&graph, &feats).unwrap();
    let b = loaded.forward(&graph, &feats).unwrap();
    assert!(max_abs_diff(&a, &b) < 1e-6);
}

#[test]
fn test_pytorch_state_dict_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mtgl.pth");

    let (model, varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    let tensors: Vec<(String, Tensor)> = {
        let data = varmap.data().lock().unwrap();
        data.iter().map(|(name, var)| (name.clone(), var.as_tensor().clone())).collect()
    };
    write_state_dict_pth(&path, &tensors).unwrap();
    let loaded = MtglAdmet::load(small_config(), &path, &Device::Cpu).unwrap();

    let (graph, feats) = random_batch(&[2, 6, 4], 12, 14).unwrap();
    let a = model.forward(&graph, &feats).unwrap();
    let b = loaded.forward(&graph, &feats).unwrap();
    assert!(max_abs_diff(&a, &b) < 1e-6);
}

#[test]
fn test_state_dict_missing_a_parameter_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.pth");

    let (_, varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    let tensors: Vec<(String, Tensor)> = {
        let data = varmap.data().lock().unwrap();
        data.iter()
            .filter(|(name, _)| name.as_str() != "gates.0.weight")
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect()
    };
    write_state_dict_pth(&path, &tensors).unwrap();
    assert!(MtglAdmet::load(small_config(), &path, &Device::Cpu).is_err());
}

#[test]
fn test_missing_checkpoint() {
    let err = MtglAdmet::load(small_config(), "/nonexistent/mtgl.safetensors", &Device::Cpu)
        .err()
        .expect("load must fail");
    assert!(matches!(err, MtglError::Io(_)));
}

#[test]
fn test_parameter_names_and_count() {
    let (_, varmap) = MtglAdmet::fresh(small_config(), &Device::Cpu).unwrap();
    {
        let data = varmap.data().lock().unwrap();
        for name in [
            "conv1.graph_conv_layer.weight",
            "conv1.res_connection.weight",
            "conv2.bn_layer.running_var",
            "weighted_sum_readout.atom_weighting_specific.4.0.weight",
            "weighted_sum_readout.shared_weighting.0.bias",
            "gates.3.weight",
            "output_layer1.4.0.bias",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
        assert!(!data.contains_key("gates.4.weight"));
    }
    assert!(count_parameters(&varmap) > 0);
}
