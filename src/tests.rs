use std::collections::{BTreeSet, HashSet};

use crate::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

// every id appears once across the whole network.
fn assert_unique_ids(net: &Network) {
    let mut seen = HashSet::new();

    for layer in net.all_layers() {
        for id in layer.neuron_ids() {
            if !seen.insert(id) {
                panic!("duplicate neuron id {id}");
            }
        }
    }
}

// every dense neuron connects to exactly the ids of the layer before it.
fn assert_full_connections(net: &Network) {
    if let Some(input) = net.layers.input.as_dense() {
        for (id, n) in &input.neurons {
            assert!(n.connections.is_empty(), "input neuron {id} has connections");
        }
    }

    let layers: Vec<_> = net.all_layers().collect();
    for pair in layers.windows(2) {
        let Some(dense) = pair[1].as_dense() else {
            continue;
        };

        let expected: BTreeSet<_> = pair[0].neuron_ids().collect();
        for (id, n) in &dense.neurons {
            let actual: BTreeSet<_> = n.connections.keys().map(String::as_str).collect();
            assert_eq!(actual, expected, "neuron {id} is not fully connected");
        }
    }
}

fn assert_payload_shapes(net: &Network) {
    for layer in net.all_layers() {
        match layer {
            Layer::Dense(_) => {}
            Layer::Convolution(conv) => {
                assert!(conv.stride > 0);
                let dims = conv.filters[0].dims();
                for f in &conv.filters {
                    assert_eq!(f.dims(), dims);
                    assert!(f.weights.iter().all(|row| row.len() == dims.1));
                }
            }
            Layer::Recurrent(r) => {
                for cell in &r.cells {
                    let w = cell.width();
                    assert_eq!(cell.forget_weights.len(), w);
                    assert_eq!(cell.output_weights.len(), w);
                    assert_eq!(cell.cell_weights.len(), w);
                }
            }
        }
    }
}

fn assert_cache_consistency(net: &Network) {
    let units: usize = net.all_layers().map(Layer::unit_count).sum();
    assert_eq!(net.metadata.total_neurons, units as u64);
    assert_eq!(net.metadata.total_layers, net.layers.hidden.len() as u64 + 2);
}

fn assert_network_invariants(net: &Network) {
    assert_unique_ids(net);
    assert_full_connections(net);
    assert_payload_shapes(net);
    assert_cache_consistency(net);
    assert!(net.layers.output.unit_count() > 0, "empty output layer");
}

const TEST_COUNT: u64 = 1000;
fn rng_test(test: impl Fn(&mut StdRng) + Sync) {
    (0..TEST_COUNT).into_par_iter().for_each(|seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        test(&mut rng);
    });
}

fn random_network(rng: &mut StdRng) -> Network {
    let shape = NetworkShape::new(
        rng.gen_range(1..=8),
        rng.gen_range(1..=8),
        rng.gen_range(1..=4),
    );
    Network::new(&shape, rng).unwrap()
}

fn dense_only() -> MutationSettings {
    MutationSettings {
        mutation_kinds: vec!["AppendNewLayer".into(), "AppendMultipleLayers".into()],
        ..Default::default()
    }
}

fn scalars(values: &[(&str, f64)]) -> InputBag {
    values
        .iter()
        .map(|(k, v)| (k.to_string(), InputValue::Scalar(*v)))
        .collect()
}

fn connected(activation: ActivationKind, weights: &[(&str, f64)], bias: f64) -> Neuron {
    Neuron {
        activation,
        connections: weights
            .iter()
            .map(|(id, w)| (id.to_string(), Connection { weight: *w }))
            .collect(),
        bias,
    }
}

#[test]
fn create_network() {
    rng_test(|rng| {
        let net = random_network(rng);
        assert_network_invariants(&net);

        assert_eq!(net.next_id().unwrap(), net.metadata.total_neurons);
    });
}

#[test]
fn append_dense_block_ids() {
    rng_test(|rng| {
        let mut net = random_network(rng);
        let start = net.next_id().unwrap();
        let n = rng.gen_range(1..=10);

        net.append_dense_block(n, rng).unwrap();

        let added: BTreeSet<_> = net
            .last_layer()
            .neuron_ids()
            .filter_map(neuron_index)
            .collect();
        assert_eq!(added, (start..start + n as u64).collect::<BTreeSet<_>>());
        assert!(net.next_id().unwrap() > start);
    });
}

#[test]
fn append_multiple_dense_layers() {
    rng_test(|rng| {
        let mut net = random_network(rng);
        let start = net.next_id().unwrap();
        let hidden = net.layers.hidden.len();
        let (layers, size) = (rng.gen_range(1..=4), rng.gen_range(1..=6));

        net.append_multiple_dense_layers(layers, size, rng).unwrap();

        let mut expected = start;
        for layer in &net.layers.hidden[hidden..] {
            let ids: BTreeSet<_> = layer.neuron_ids().filter_map(neuron_index).collect();
            assert_eq!(ids, (expected..expected + size as u64).collect::<BTreeSet<_>>());
            expected += size as u64;
        }

        // the output layer still points at the old last hidden layer until reattached.
        let outputs = net.output_activation_types();
        net.reattach_output_layer(&outputs, rng).unwrap();
        assert_network_invariants(&net);
    });
}

#[test]
fn reattach_twice() {
    let mut rng = StdRng::seed_from_u64(0xabcdef);
    let mut net = Network::new(&NetworkShape::new(3, 5, 1), &mut rng).unwrap();

    let types = [ActivationKind::Tanh, ActivationKind::Sigmoid, ActivationKind::Relu];
    net.reattach_output_layer(&types, &mut rng).unwrap();
    let first = net.layers.output.clone();

    net.reattach_output_layer(&types, &mut rng).unwrap();
    let second = net.layers.output.clone();
    assert_network_invariants(&net);

    let (first, second) = (first.as_dense().unwrap(), second.as_dense().unwrap());
    let ids: Vec<_> = second.neurons.keys().cloned().collect();
    assert_eq!(ids, ["output0", "output1", "output2"]);
    assert_eq!(
        first.neurons.keys().collect::<Vec<_>>(),
        second.neurons.keys().collect::<Vec<_>>()
    );
    assert_eq!(net.output_activation_types(), types);
    assert_ne!(first, second);
}

#[test]
fn mutate() {
    rng_test(|rng| {
        let mut net = random_network(rng);
        let settings = MutationSettings::default();
        let outputs = net.layers.output.unit_count();

        for _ in 0..10 {
            let kind = net.mutate(&settings, rng).unwrap();
            assert!(kind.is_some());
            assert_network_invariants(&net);
            assert_eq!(net.layers.output.unit_count(), outputs);
        }
    });
}

#[test]
fn unknown_mutation_kind() {
    rng_test(|rng| {
        let mut net = random_network(rng);
        let before = net.clone();

        let kind = net
            .apply_single_mutation(&["AppendAttentionLayer"], 1..=4, 1..=2, rng)
            .unwrap();

        assert_eq!(kind, None);
        assert_eq!(net, before);
    });
}

#[test]
fn mutated_dense_networks_infer() {
    rng_test(|rng| {
        let mut net = random_network(rng);
        let settings = dense_only();
        for _ in 0..5 {
            net.mutate(&settings, rng).unwrap();
        }

        let input: InputBag = net
            .layers
            .input
            .neuron_ids()
            .map(|id| (id.to_string(), InputValue::Scalar(rng.gen_range(-1. ..1.))))
            .collect();

        let out = net.infer(&input).unwrap();
        assert_eq!(out.len(), net.layers.output.unit_count());
        for (id, v) in &out {
            assert!(id.starts_with(OUTPUT_PREFIX));
            // network outputs default to sigmoid
            assert!((0. ..=1.).contains(v), "{id} = {v}");
        }
    });
}

#[test]
fn infer_end_to_end() {
    let input = DenseLayer::inputs(["neuron0", "neuron1"]);

    let mut hidden = DenseLayer::default();
    for id in ["neuron2", "neuron3"] {
        hidden.neurons.insert(
            id.into(),
            connected(ActivationKind::Relu, &[("neuron0", 1.), ("neuron1", 1.)], 0.),
        );
    }

    let mut output = DenseLayer::default();
    output.neurons.insert(
        "neuron4".into(),
        connected(ActivationKind::Sigmoid, &[("neuron2", 1.), ("neuron3", 1.)], 0.),
    );

    let net = Network::from_layers(
        Metadata::default(),
        input.into(),
        vec![hidden.clone().into()],
        output.into(),
    );
    assert_network_invariants(&net);

    let values = Scalars::from([("neuron0".to_string(), 1.), ("neuron1".to_string(), 1.)]);
    let h = hidden.eval(&values).unwrap();
    assert_eq!(h["neuron2"], 2.);
    assert_eq!(h["neuron3"], 2.);

    let out = net.infer(&scalars(&[("neuron0", 1.), ("neuron1", 1.)])).unwrap();
    let expected = 1. / (1. + (-4f64).exp());
    assert!((out["neuron4"] - expected).abs() < 1e-12);
    assert!((out["neuron4"] - 0.98201).abs() < 1e-5);

    assert_eq!(net.infer_scalars(&values).unwrap(), out);
}

#[test]
fn convolution_input() {
    let conv = ConvLayer {
        filters: vec![Filter {
            weights: vec![vec![1.]],
            bias: 0.,
        }],
        stride: 1,
        padding: 0,
    };

    let mut output = DenseLayer::default();
    output.neurons.insert(
        "output0".into(),
        connected(
            ActivationKind::Identity,
            &[
                ("conv_output0", 1.),
                ("conv_output1", 1.),
                ("conv_output2", 1.),
                ("conv_output3", 1.),
            ],
            0.,
        ),
    );

    let net = Network::from_layers(Metadata::default(), conv.into(), vec![], output.into());

    let image = InputBag::from([(
        IMAGE_KEY.to_string(),
        InputValue::Grid(vec![vec![1., 2.], vec![3., -4.]]),
    )]);

    // the input layer is not evaluated, the image goes straight to the output layer.
    let err = net.infer(&image).unwrap_err();
    assert!(matches!(err, Error::RepresentationMismatch { .. }));

    let mut hidden_conv = net.clone();
    hidden_conv.layers.hidden.push(hidden_conv.layers.input.clone());
    let out = hidden_conv.infer(&image).unwrap();
    assert_eq!(out["output0"], 6.);

    let ragged = InputBag::from([(
        IMAGE_KEY.to_string(),
        InputValue::Grid(vec![vec![1., 2.], vec![3.]]),
    )]);
    assert!(matches!(hidden_conv.infer(&ragged), Err(Error::InvalidInput(_))));
    assert!(matches!(
        hidden_conv.infer(&scalars(&[("neuron0", 1.)])),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn recurrent_input() {
    let cell = LstmCell {
        input_weights: vec![0.3, -0.2],
        forget_weights: vec![0.1, 0.4],
        output_weights: vec![-0.5, 0.6],
        cell_weights: vec![0.7, 0.2],
        bias: 0.1,
    };
    let recurrent: Layer = RecurrentLayer { cells: vec![cell] }.into();

    let mut output = DenseLayer::default();
    output.neurons.insert(
        "output0".into(),
        connected(ActivationKind::Identity, &[("lstm0", 2.)], 0.),
    );

    let net = Network::from_layers(
        Metadata::default(),
        recurrent.clone(),
        vec![recurrent],
        output.into(),
    );

    let sequence = InputBag::from([(
        SEQUENCE_KEY.to_string(),
        InputValue::Grid(vec![vec![0.5, 1.5]]),
    )]);
    let from_sequence = net.infer(&sequence).unwrap();

    // promoted in natural id order, so neuron2 comes first
    let promoted = net
        .infer(&scalars(&[("neuron10", 1.5), ("neuron2", 0.5)]))
        .unwrap();
    assert_eq!(from_sequence, promoted);

    let longer = InputBag::from([(
        SEQUENCE_KEY.to_string(),
        InputValue::Grid(vec![vec![0.5, 1.5], vec![0.5, 1.5]]),
    )]);
    assert_ne!(net.infer(&longer).unwrap(), from_sequence);

    assert!(matches!(net.infer(&InputBag::new()), Err(Error::InvalidInput(_))));
}

#[test]
fn dense_input_rejects_grids() {
    let mut rng = StdRng::seed_from_u64(1);
    let net = Network::new(&NetworkShape::new(2, 2, 1), &mut rng).unwrap();

    let mut input = scalars(&[("neuron0", 1.)]);
    input.insert("neuron1".into(), InputValue::Grid(vec![vec![1.]]));
    assert!(matches!(net.infer(&input), Err(Error::InvalidInput(_))));

    // neuron1 is missing entirely
    assert!(matches!(
        net.infer(&scalars(&[("neuron0", 1.)])),
        Err(Error::MissingInput(id)) if id == "neuron1"
    ));
}

#[test]
fn concurrent_inference() {
    let mut rng = StdRng::seed_from_u64(0xdeadbeef);
    let mut net = Network::new(&NetworkShape::new(4, 6, 2), &mut rng).unwrap();
    for _ in 0..10 {
        net.mutate(&dense_only(), &mut rng).unwrap();
    }

    let input = |i: u32| {
        scalars(&[
            ("neuron0", i as f64 * 0.01),
            ("neuron1", 0.5),
            ("neuron2", -0.3),
            ("neuron3", 1.),
        ])
    };

    let sequential: Vec<_> = (0..100).map(|i| net.infer(&input(i)).unwrap()).collect();
    let parallel: Vec<_> = (0..100_u32)
        .into_par_iter()
        .map(|i| net.infer(&input(i)).unwrap())
        .collect();

    assert_eq!(sequential, parallel);
}

#[cfg(feature = "serde")]
mod serde {
    use super::{assert_network_invariants, random_network, rng_test};
    use crate::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn decode(json: &str) -> Network {
        let de = &mut serde_json::Deserializer::from_str(json);
        match serde_path_to_error::deserialize(de) {
            Ok(net) => net,
            Err(e) => panic!("failed at {}: {}", e.path(), e.inner()),
        }
    }

    #[test]
    fn full_serde() {
        rng_test(|rng| {
            let mut net1 = random_network(rng);
            let settings = MutationSettings::default();
            for _ in 0..3 {
                net1.mutate(&settings, rng).unwrap();
            }

            let mut buf = Vec::new();
            let mut serializer = serde_json::Serializer::new(&mut buf);
            serde_path_to_error::serialize(&net1, &mut serializer).unwrap();
            let serialized = net1.to_json().unwrap();
            assert_eq!(buf, serialized.as_bytes());

            let net2 = decode(&serialized);
            assert_eq!(net1, net2);
            assert_network_invariants(&net2);
            assert_eq!(net2.to_json().unwrap(), serialized);
        });
    }

    #[test]
    fn document_layout() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut shape = NetworkShape::new(2, 2, 1);
        shape.model_id = "m-1".into();
        let mut net = Network::new(&shape, &mut rng).unwrap();
        net.metadata.parent_model_ids.push("m-0".into());
        net.append_recurrent_layer(&mut rng).unwrap();
        net.append_convolution_layer(3, 1, 1, 1, &mut rng).unwrap();

        let json = net.to_json().unwrap();
        for field in [
            r#""modelID":"m-1""#,
            r#""parentModelIDs":["m-0"]"#,
            r#""totalLayers":5"#,
            r#""layerType":"dense""#,
            r#""layerType":"lstm""#,
            r#""layerType":"conv""#,
            r#""lstmCells""#,
            r#""inputWeights""#,
            r#""activationType":"relu""#,
            r#""stride":1"#,
        ] {
            assert!(json.contains(field), "missing {field}");
        }

        let pretty = net.to_json_pretty().unwrap();
        assert_eq!(Network::from_json(&pretty).unwrap(), net);
    }

    #[test]
    fn unknown_activation_survives() {
        let doc = r#"{
            "metadata": {"modelID": "x"},
            "layers": {
                "input": {"layerType": "dense", "neurons": {"neuron0": {}}},
                "hidden": [],
                "output": {"layerType": "dense", "neurons": {
                    "output0": {"activationType": "gelu", "connections": {"neuron0": {"weight": 2.0}}, "bias": 1.0}
                }}
            }
        }"#;

        let net = decode(doc);
        let out = net.layers.output.as_dense().unwrap();
        assert_eq!(
            out.neurons["output0"].activation,
            ActivationKind::Other("gelu".into())
        );
        assert!(net.to_json().unwrap().contains(r#""activationType":"gelu""#));

        // unknown activations evaluate as identity
        let value = net
            .infer_scalars(&Scalars::from([("neuron0".to_string(), 3.)]))
            .unwrap();
        assert_eq!(value["output0"], 7.);
    }

    #[test]
    fn null_collections_decode_as_empty() {
        let doc = r#"{
            "metadata": {"modelID": "go", "parentModelIDs": null, "childModelIDs": null},
            "layers": {
                "input": {"layerType": "dense", "neurons": {
                    "neuron0": {"activationType": "", "connections": null, "bias": 0}
                }},
                "hidden": null,
                "output": {"layerType": "dense", "neurons": {
                    "output0": {"activationType": "relu", "connections": {"neuron0": {"weight": 2.0}}, "bias": 1.0}
                }}
            }
        }"#;

        let net = decode(doc);
        assert!(net.metadata.parent_model_ids.is_empty());
        assert!(net.metadata.child_model_ids.is_empty());
        assert!(net.layers.hidden.is_empty());

        let input = net.layers.input.as_dense().unwrap();
        assert!(input.neurons["neuron0"].connections.is_empty());
        assert_eq!(input.neurons["neuron0"].activation, ActivationKind::Other(String::new()));

        let value = net
            .infer_scalars(&Scalars::from([("neuron0".to_string(), 3.)]))
            .unwrap();
        assert_eq!(value["output0"], 7.);

        let layers = r#"{
            "metadata": {},
            "layers": {
                "input": {"layerType": "dense", "neurons": null},
                "hidden": [
                    {"layerType": "conv", "filters": null, "stride": 1, "padding": 0},
                    {"layerType": "lstm", "lstmCells": null}
                ],
                "output": {"layerType": "dense", "neurons": null}
            }
        }"#;

        let net = decode(layers);
        assert!(net.all_layers().all(|l| l.unit_count() == 0));
        assert_eq!(net.layers.hidden[0].kind(), LayerKind::Convolution);
        assert_eq!(net.layers.hidden[1].kind(), LayerKind::Recurrent);
    }

    #[test]
    fn bad_documents() {
        assert!(matches!(
            Network::from_json(r#"{"layers": {"input": {"layerType": "pooling"}}}"#),
            Err(Error::Document(_))
        ));
        assert!(matches!(
            Network::load("/definitely/not/here.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn save_and_load() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut net = Network::new(&NetworkShape::new(3, 3, 2), &mut rng).unwrap();
        net.mutate(&MutationSettings::default(), &mut rng).unwrap();

        let path = std::env::temp_dir().join(format!("blueprint-{}.json", std::process::id()));
        net.save(&path).unwrap();
        let loaded = Network::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, net);
    }
}
