use std::{fmt, ops::RangeInclusive, str::FromStr};

use rand::{seq::SliceRandom, Rng};
use rand_distr::StandardNormal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    network::natural_cmp, ActivationKind, Connection, ConvLayer, DenseLayer, Error, Filter,
    IdAllocator, Layer, LstmCell, Network, Neuron, NeuronScope, RecurrentLayer, Result,
};

/// Width of the time steps a freshly appended recurrent layer expects.
pub const LSTM_INPUT_WIDTH: usize = 10;

/// Prefix of the ids given to output neurons by [`Network::reattach_output_layer`].
pub const OUTPUT_PREFIX: &str = "output";

/// The structural edits [`Network::apply_single_mutation`] can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// One dense hidden layer.
    AppendNewLayer,

    /// Several dense hidden layers of the same size.
    AppendMultipleLayers,

    /// A convolution layer followed by a dense block.
    AppendConvolutionAndDense,

    /// A recurrent layer followed by a dense block.
    AppendRecurrentAndDense,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        Self::AppendNewLayer,
        Self::AppendMultipleLayers,
        Self::AppendConvolutionAndDense,
        Self::AppendRecurrentAndDense,
    ];

    /// The tag used in [`MutationSettings::mutation_kinds`].
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AppendNewLayer => "AppendNewLayer",
            Self::AppendMultipleLayers => "AppendMultipleLayers",
            Self::AppendConvolutionAndDense => "AppendCNNAndDenseLayer",
            Self::AppendRecurrentAndDense => "AppendLSTMLayer",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| Error::InvalidParameters(format!("unknown mutation kind `{s}`")))
    }
}

/// Controls [`Network::mutate`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MutationSettings {
    /// Tags of the mutation kinds to pick from. See [`MutationKind::tag`].
    pub mutation_kinds: Vec<String>,

    /// How many neurons (or filters) a new layer gets.
    pub neuron_range: RangeInclusive<usize>,

    /// How many layers [`MutationKind::AppendMultipleLayers`] adds.
    pub layer_range: RangeInclusive<usize>,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            mutation_kinds: MutationKind::ALL.iter().map(|k| k.tag().to_string()).collect(),
            neuron_range: 1..=10,
            layer_range: 1..=3,
        }
    }
}

fn check_range(name: &str, range: &RangeInclusive<usize>) -> Result<()> {
    if range.is_empty() || *range.start() == 0 {
        return Err(Error::InvalidParameters(format!(
            "{name} must be a non-empty range of positive values, got {range:?}"
        )));
    }

    Ok(())
}

// a dense layer fully connected to `sources`, with standard normal weights and biases.
fn dense_block(
    sources: &[String],
    ids: &mut IdAllocator,
    size: usize,
    rng: &mut impl Rng,
) -> Result<DenseLayer> {
    let mut layer = DenseLayer::default();

    for _ in 0..size {
        let activation = ActivationKind::random_in_scope(NeuronScope::HIDDEN, rng);
        let connections = sources
            .iter()
            .map(|id| {
                let weight = rng.sample(StandardNormal);
                (id.clone(), Connection { weight })
            })
            .collect();

        layer.neurons.insert(
            ids.allocate()?,
            Neuron {
                activation,
                connections,
                bias: rng.sample(StandardNormal),
            },
        );
    }

    Ok(layer)
}

fn uniform_vec(len: usize, rng: &mut impl Rng) -> Vec<f64> {
    (0..len).map(|_| rng.gen()).collect()
}

impl Network {
    fn last_layer_ids(&self) -> Vec<String> {
        self.last_layer().neuron_ids().map(str::to_owned).collect()
    }

    fn grown(&mut self, what: fmt::Arguments) {
        self.refresh_counts();
        log::debug!(
            "{what}; network now has {} layers and {} units",
            self.metadata.total_layers,
            self.metadata.total_neurons
        );
    }

    /// Appends a dense hidden layer of `size` neurons, fully connected to the previous layer.
    /// Activations are drawn from the hidden scope, weights and biases from a standard normal.
    ///
    /// A previous convolution or recurrent layer has no neuron ids, so the new neurons start
    /// with no connections in that case.
    pub fn append_dense_block(&mut self, size: usize, rng: &mut impl Rng) -> Result<()> {
        if size == 0 {
            return Err(Error::InvalidParameters("dense block needs at least one neuron".into()));
        }

        let mut ids = IdAllocator::after(self)?;
        let layer = dense_block(&self.last_layer_ids(), &mut ids, size, rng)?;
        self.layers.hidden.push(layer.into());

        self.grown(format_args!("appended dense block of {size}"));
        Ok(())
    }

    /// Appends `layer_count` dense layers of `neurons_per_layer` neurons each, every layer fully
    /// connected to the one before it. Ids continue from a single [`Network::next_id`] scan.
    pub fn append_multiple_dense_layers(
        &mut self,
        layer_count: usize,
        neurons_per_layer: usize,
        rng: &mut impl Rng,
    ) -> Result<()> {
        if layer_count == 0 || neurons_per_layer == 0 {
            return Err(Error::InvalidParameters(format!(
                "need at least one layer of at least one neuron (got {layer_count} x {neurons_per_layer})"
            )));
        }

        let mut ids = IdAllocator::after(self)?;
        let mut sources = self.last_layer_ids();
        let mut layers = Vec::with_capacity(layer_count);

        for _ in 0..layer_count {
            let layer = dense_block(&sources, &mut ids, neurons_per_layer, rng)?;
            sources = layer.neurons.keys().cloned().collect();
            layers.push(layer.into());
        }

        self.layers.hidden.extend(layers);

        self.grown(format_args!(
            "appended {layer_count} dense layers of {neurons_per_layer}"
        ));
        Ok(())
    }

    /// Appends a convolution layer of `filter_count` square `kernel_size` kernels.
    /// Kernel weights and biases are uniform in `[0, 1)`.
    pub fn append_convolution_layer(
        &mut self,
        kernel_size: usize,
        filter_count: usize,
        stride: usize,
        padding: usize,
        rng: &mut impl Rng,
    ) -> Result<()> {
        if kernel_size == 0 || filter_count == 0 || stride == 0 {
            return Err(Error::InvalidParameters(format!(
                "invalid convolution parameters: kernel {kernel_size}, filters {filter_count}, stride {stride}"
            )));
        }

        let filters = (0..filter_count)
            .map(|_| Filter {
                weights: (0..kernel_size)
                    .map(|_| uniform_vec(kernel_size, rng))
                    .collect(),
                bias: rng.gen(),
            })
            .collect();

        self.layers.hidden.push(
            ConvLayer {
                filters,
                stride,
                padding,
            }
            .into(),
        );

        self.grown(format_args!(
            "appended {filter_count} {kernel_size}x{kernel_size} filters"
        ));
        Ok(())
    }

    /// Appends a recurrent layer with one cell of width [`LSTM_INPUT_WIDTH`].
    pub fn append_recurrent_layer(&mut self, rng: &mut impl Rng) -> Result<()> {
        let cell = LstmCell {
            input_weights: uniform_vec(LSTM_INPUT_WIDTH, rng),
            forget_weights: uniform_vec(LSTM_INPUT_WIDTH, rng),
            output_weights: uniform_vec(LSTM_INPUT_WIDTH, rng),
            cell_weights: uniform_vec(LSTM_INPUT_WIDTH, rng),
            bias: rng.gen(),
        };

        self.layers
            .hidden
            .push(RecurrentLayer { cells: vec![cell] }.into());

        self.grown(format_args!("appended recurrent layer"));
        Ok(())
    }

    /// The output layer's activations, ordered by id (`output2` before `output10`).
    pub fn output_activation_types(&self) -> Vec<ActivationKind> {
        let Some(output) = self.layers.output.as_dense() else {
            return Vec::new();
        };

        let mut neurons: Vec<_> = output.neurons.iter().collect();
        neurons.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
        neurons
            .into_iter()
            .map(|(_, n)| n.activation.clone())
            .collect()
    }

    /// Rebuilds the output layer with one neuron per entry of `activation_types`.
    /// See [`Network::reattach_output_layer_sized`].
    pub fn reattach_output_layer(
        &mut self,
        activation_types: &[ActivationKind],
        rng: &mut impl Rng,
    ) -> Result<()> {
        self.reattach_output_layer_sized(activation_types.len(), activation_types, rng)
    }

    /// Replaces the output layer with `count` neurons named `output0..`, fully connected to the
    /// last hidden layer (or the input layer if there is none).
    ///
    /// Neuron `i` uses `activation_types[i]`, or softmax if the list is too short.
    /// Biases are zero and weights are uniform in `[-0.5, 0.5)`.
    pub fn reattach_output_layer_sized(
        &mut self,
        count: usize,
        activation_types: &[ActivationKind],
        rng: &mut impl Rng,
    ) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidParameters("output layer needs at least one neuron".into()));
        }

        let sources = self.last_layer_ids();

        let neurons = (0..count)
            .map(|i| {
                let activation = activation_types
                    .get(i)
                    .cloned()
                    .unwrap_or(ActivationKind::Softmax);

                let neuron = Neuron::fully_connected(
                    activation,
                    sources.iter().map(String::as_str),
                    0.,
                    || rng.gen::<f64>() - 0.5,
                );

                (format!("{OUTPUT_PREFIX}{i}"), neuron)
            })
            .collect();

        self.layers.output = Layer::Dense(DenseLayer { neurons });

        self.grown(format_args!(
            "reattached {count} outputs to {} sources",
            sources.len()
        ));
        Ok(())
    }

    /// Picks one of `candidate_kinds` at random, applies it with sizes drawn from the given
    /// ranges, then reattaches the output layer with the activations it had before.
    ///
    /// Returns the kind that was applied. An unrecognized tag is logged and leaves the
    /// network untouched, returning `Ok(None)`.
    pub fn apply_single_mutation(
        &mut self,
        candidate_kinds: &[impl AsRef<str>],
        neuron_range: RangeInclusive<usize>,
        layer_range: RangeInclusive<usize>,
        rng: &mut impl Rng,
    ) -> Result<Option<MutationKind>> {
        check_range("neuron range", &neuron_range)?;
        check_range("layer range", &layer_range)?;

        let Some(tag) = candidate_kinds.choose(rng) else {
            return Err(Error::InvalidParameters("no mutation kinds to pick from".into()));
        };
        let tag = tag.as_ref();

        let Ok(kind) = tag.parse::<MutationKind>() else {
            log::warn!("unknown mutation kind `{tag}`, skipping");
            return Ok(None);
        };

        let outputs = self.output_activation_types();
        if outputs.is_empty() {
            return Err(Error::InvalidParameters(
                "cannot mutate a network without dense output neurons".into(),
            ));
        }

        let hidden = self.layers.hidden.len();
        if let Err(e) = self.apply_kind(kind, neuron_range, layer_range, rng) {
            // compound kinds may have appended their first layer already
            self.layers.hidden.truncate(hidden);
            self.refresh_counts();
            return Err(e);
        }

        self.reattach_output_layer(&outputs, rng)?;

        log::debug!("applied {kind}");
        Ok(Some(kind))
    }

    fn apply_kind(
        &mut self,
        kind: MutationKind,
        neuron_range: RangeInclusive<usize>,
        layer_range: RangeInclusive<usize>,
        rng: &mut impl Rng,
    ) -> Result<()> {
        match kind {
            MutationKind::AppendNewLayer => {
                let size = rng.gen_range(neuron_range);
                self.append_dense_block(size, rng)?;
            }
            MutationKind::AppendMultipleLayers => {
                let layers = rng.gen_range(layer_range);
                let size = rng.gen_range(neuron_range);
                self.append_multiple_dense_layers(layers, size, rng)?;
            }
            MutationKind::AppendConvolutionAndDense => {
                let kernel = rng.gen_range(3..=5);
                let filters = rng.gen_range(neuron_range.clone());
                self.append_convolution_layer(kernel, filters, 1, (kernel - 1) / 2, rng)?;

                let size = rng.gen_range(neuron_range);
                self.append_dense_block(size, rng)?;
            }
            MutationKind::AppendRecurrentAndDense => {
                self.append_recurrent_layer(rng)?;

                let size = rng.gen_range(neuron_range);
                self.append_dense_block(size, rng)?;
            }
        }

        Ok(())
    }

    /// Applies one mutation using `settings`.
    pub fn mutate(
        &mut self,
        settings: &MutationSettings,
        rng: &mut impl Rng,
    ) -> Result<Option<MutationKind>> {
        self.apply_single_mutation(
            &settings.mutation_kinds,
            settings.neuron_range.clone(),
            settings.layer_range.clone(),
            rng,
        )
    }
}
