use std::{cmp::Ordering, collections::BTreeMap, fmt};

use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize};

use crate::{activation::*, Error, Result};

/// Prefix of every id handed out by the [`IdAllocator`].
pub const NEURON_PREFIX: &str = "neuron";

// documents written elsewhere encode empty lists and maps as `null`.
#[cfg(feature = "serde")]
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn id_space_exhausted() -> Error {
    Error::InvalidParameters(format!("no `{NEURON_PREFIX}<N>` ids left to allocate"))
}

/// Descriptive bookkeeping carried alongside a [`Network`]. Never read during evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct Metadata {
    #[cfg_attr(feature = "serde", serde(rename = "modelID"))]
    pub model_id: String,
    pub project_name: String,

    pub last_training_accuracy: f64,
    pub last_test_accuracy: f64,
    pub last_test_accuracy_generous: f64,
    pub last_test_accuracy_forgiveness: f64,
    pub forgiveness_threshold: f64,

    /// Where the model was last saved, if anywhere.
    pub path: String,
    pub evaluated: bool,

    #[cfg_attr(
        feature = "serde",
        serde(rename = "parentModelIDs", deserialize_with = "null_as_default")
    )]
    pub parent_model_ids: Vec<String>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "childModelIDs", deserialize_with = "null_as_default")
    )]
    pub child_model_ids: Vec<String>,

    /// Cached count of dense neurons, filters and LSTM cells across all layers.
    pub total_neurons: u64,

    /// Cached count of layers, input and output included.
    pub total_layers: u64,
}

/// A weighted link from a neuron in the previous layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Connection {
    pub weight: f64,
}

/// A dense neuron. Contains info about bias, activation, and incoming connections keyed by source id.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Neuron {
    /// The activation function applied to the weighted sum.
    #[cfg_attr(feature = "serde", serde(rename = "activationType", default))]
    pub activation: ActivationKind,

    /// Incoming connections, keyed by the id of the source neuron.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "null_as_default"))]
    pub connections: BTreeMap<String, Connection>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub bias: f64,
}

impl Neuron {
    /// Creates a neuron connected to every id in `sources`, drawing each weight from `weight`.
    pub fn fully_connected<'a>(
        activation: ActivationKind,
        sources: impl IntoIterator<Item = &'a str>,
        bias: f64,
        mut weight: impl FnMut() -> f64,
    ) -> Self {
        let connections = sources
            .into_iter()
            .map(|id| (id.to_owned(), Connection { weight: weight() }))
            .collect();

        Self {
            activation,
            connections,
            bias,
        }
    }

    /// Runs the [activation function][Neuron::activation] on the given value and returns it.
    pub fn activate(&self, v: f64) -> f64 {
        self.activation.activate(v)
    }

    /// Get the weight of the connection from `source`. Returns `None` if not connected.
    pub fn weight(&self, source: &str) -> Option<f64> {
        self.connections.get(source).map(|c| c.weight)
    }
}

/// A layer of dense neurons keyed by id.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DenseLayer {
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "null_as_default"))]
    pub neurons: BTreeMap<String, Neuron>,
}

impl DenseLayer {
    /// A layer of connectionless identity neurons, as used for inputs.
    pub fn inputs<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            neurons: ids.into_iter().map(|id| (id.into(), Neuron::default())).collect(),
        }
    }
}

/// A square or rectangular convolution kernel.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Filter {
    /// Kernel rows. All rows have the same length.
    pub weights: Vec<Vec<f64>>,
    pub bias: f64,
}

impl Filter {
    /// `(rows, columns)` of the kernel.
    pub fn dims(&self) -> (usize, usize) {
        (self.weights.len(), self.weights.first().map_or(0, Vec::len))
    }
}

/// A convolution layer. Output values are always passed through relu.
///
/// When `(padded_dim - kernel_dim)` is not a multiple of `stride`, the trailing rows
/// and columns that a full stride would overshoot are dropped.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConvLayer {
    #[cfg_attr(feature = "serde", serde(deserialize_with = "null_as_default"))]
    pub filters: Vec<Filter>,
    pub stride: usize,
    pub padding: usize,
}

/// One LSTM cell. All four gates share the single `bias`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct LstmCell {
    pub input_weights: Vec<f64>,
    pub forget_weights: Vec<f64>,
    pub output_weights: Vec<f64>,
    pub cell_weights: Vec<f64>,
    pub bias: f64,
}

impl LstmCell {
    /// Expected length of each time step fed to this cell.
    pub fn width(&self) -> usize {
        self.input_weights.len()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecurrentLayer {
    #[cfg_attr(
        feature = "serde",
        serde(rename = "lstmCells", default, deserialize_with = "null_as_default")
    )]
    pub cells: Vec<LstmCell>,
}

/// The three kinds of layer a [`Network`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Dense,
    Convolution,
    Recurrent,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::Convolution => "conv",
            Self::Recurrent => "lstm",
        })
    }
}

/// A layer with exactly one kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "layerType"))]
pub enum Layer {
    #[cfg_attr(feature = "serde", serde(rename = "dense"))]
    Dense(DenseLayer),

    #[cfg_attr(feature = "serde", serde(rename = "conv"))]
    Convolution(ConvLayer),

    #[cfg_attr(feature = "serde", serde(rename = "lstm"))]
    Recurrent(RecurrentLayer),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Dense(_) => LayerKind::Dense,
            Self::Convolution(_) => LayerKind::Convolution,
            Self::Recurrent(_) => LayerKind::Recurrent,
        }
    }

    pub fn as_dense(&self) -> Option<&DenseLayer> {
        match self {
            Self::Dense(d) => Some(d),
            _ => None,
        }
    }

    /// Ids of the dense neurons in this layer. Convolution and recurrent layers have none.
    pub fn neuron_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.as_dense()
            .into_iter()
            .flat_map(|d| d.neurons.keys().map(String::as_str))
    }

    /// Number of neurons, filters or cells, depending on the kind.
    pub fn unit_count(&self) -> usize {
        match self {
            Self::Dense(d) => d.neurons.len(),
            Self::Convolution(c) => c.filters.len(),
            Self::Recurrent(r) => r.cells.len(),
        }
    }
}

impl From<DenseLayer> for Layer {
    fn from(value: DenseLayer) -> Self {
        Self::Dense(value)
    }
}

impl From<ConvLayer> for Layer {
    fn from(value: ConvLayer) -> Self {
        Self::Convolution(value)
    }
}

impl From<RecurrentLayer> for Layer {
    fn from(value: RecurrentLayer) -> Self {
        Self::Recurrent(value)
    }
}

/// The ordered layer stack of a [`Network`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Layers {
    pub input: Layer,

    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "null_as_default"))]
    pub hidden: Vec<Layer>,

    pub output: Layer,
}

/// Sizes and labels for [`Network::new`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkShape {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,

    /// Activation per output neuron. Missing entries default to sigmoid.
    pub output_activations: Vec<ActivationKind>,

    pub model_id: String,
    pub project_name: String,
}

impl NetworkShape {
    pub fn new(inputs: usize, hidden: usize, outputs: usize) -> Self {
        Self {
            inputs,
            hidden,
            outputs,
            output_activations: Vec::new(),
            model_id: String::new(),
            project_name: String::new(),
        }
    }
}

/// Hands out sequential `neuron<N>` ids.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Starts one past the highest `neuron<N>` id already in `network`.
    pub fn after(network: &Network) -> Result<Self> {
        Ok(Self::starting_at(network.next_id()?))
    }

    /// Returns the next id and advances. Fails once the counter would pass `u64::MAX`,
    /// so an id is never handed out twice.
    pub fn allocate(&mut self) -> Result<String> {
        let id = format!("{NEURON_PREFIX}{}", self.next);
        self.next = self.next.checked_add(1).ok_or_else(id_space_exhausted)?;
        Ok(id)
    }

    /// The numeric suffix the next [`allocate`][IdAllocator::allocate] call will use.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Parses the `N` out of a `neuron<N>` id.
pub fn neuron_index(id: &str) -> Option<u64> {
    id.strip_prefix(NEURON_PREFIX)?.parse().ok()
}

// orders `output2` before `output10`. ids without a numeric suffix fall back to plain comparison.
pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn split(s: &str) -> (&str, Option<u128>) {
        let prefix = s.trim_end_matches(|c: char| c.is_ascii_digit());
        (prefix, s[prefix.len()..].parse().ok())
    }

    let (pa, na) = split(a);
    let (pb, nb) = split(b);

    pa.cmp(pb).then(na.cmp(&nb)).then_with(|| a.cmp(b))
}

/// A layered network that can be evaluated with [`Network::infer`] and grown with the
/// mutation methods (see [`Network::apply_single_mutation`]).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Network {
    #[cfg_attr(feature = "serde", serde(default))]
    pub metadata: Metadata,
    pub layers: Layers,
}

impl Network {
    /// Creates a network with one dense hidden layer of relu neurons.
    /// Every weight and bias is drawn uniformly from `[0, 1)`.
    pub fn new(shape: &NetworkShape, rng: &mut impl Rng) -> Result<Self> {
        if shape.inputs == 0 || shape.hidden == 0 || shape.outputs == 0 {
            return Err(Error::InvalidParameters(format!(
                "network needs at least one input, hidden and output neuron (got {}/{}/{})",
                shape.inputs, shape.hidden, shape.outputs
            )));
        }

        let mut ids = IdAllocator::starting_at(0);

        let input_ids = (0..shape.inputs)
            .map(|_| ids.allocate())
            .collect::<Result<Vec<_>>>()?;
        let input = DenseLayer::inputs(input_ids.iter().cloned());

        let mut hidden = DenseLayer::default();
        for _ in 0..shape.hidden {
            let connections = input_ids
                .iter()
                .map(|id| (id.clone(), Connection { weight: rng.gen() }))
                .collect();

            hidden.neurons.insert(
                ids.allocate()?,
                Neuron {
                    activation: ActivationKind::Relu,
                    connections,
                    bias: rng.gen(),
                },
            );
        }

        let mut output = DenseLayer::default();
        for i in 0..shape.outputs {
            let activation = shape
                .output_activations
                .get(i)
                .cloned()
                .unwrap_or(ActivationKind::Sigmoid);

            let connections = hidden
                .neurons
                .keys()
                .map(|id| (id.clone(), Connection { weight: rng.gen() }))
                .collect();

            output.neurons.insert(
                ids.allocate()?,
                Neuron {
                    activation,
                    connections,
                    bias: rng.gen(),
                },
            );
        }

        let metadata = Metadata {
            model_id: shape.model_id.clone(),
            project_name: shape.project_name.clone(),
            ..Default::default()
        };

        Ok(Self::from_layers(
            metadata,
            input.into(),
            vec![hidden.into()],
            output.into(),
        ))
    }

    /// Assembles a network from explicit layers. The cached counts in `metadata` are recomputed.
    pub fn from_layers(metadata: Metadata, input: Layer, hidden: Vec<Layer>, output: Layer) -> Self {
        let mut net = Self {
            metadata,
            layers: Layers {
                input,
                hidden,
                output,
            },
        };
        net.refresh_counts();
        net
    }

    /// Input, hidden and output layers in evaluation order.
    pub fn all_layers(&self) -> impl Iterator<Item = &Layer> + '_ {
        std::iter::once(&self.layers.input)
            .chain(&self.layers.hidden)
            .chain(std::iter::once(&self.layers.output))
    }

    /// The layer new hidden layers attach to: the last hidden layer, or the input layer if there are none.
    pub fn last_layer(&self) -> &Layer {
        self.layers.hidden.last().unwrap_or(&self.layers.input)
    }

    /// One past the highest `neuron<N>` suffix across every layer, or 0 if there is none.
    /// Ids that don't follow the `neuron<N>` pattern (such as `output3`) are ignored.
    ///
    /// Fails if a decoded document already uses `neuron18446744073709551615`.
    pub fn next_id(&self) -> Result<u64> {
        match self
            .all_layers()
            .flat_map(|layer| layer.neuron_ids())
            .filter_map(neuron_index)
            .max()
        {
            Some(max) => max.checked_add(1).ok_or_else(id_space_exhausted),
            None => Ok(0),
        }
    }

    /// Recomputes [`Metadata::total_neurons`] and [`Metadata::total_layers`].
    pub fn refresh_counts(&mut self) {
        let neurons: usize = self.all_layers().map(Layer::unit_count).sum();
        let layers = self.layers.hidden.len() + 2;

        self.metadata.total_neurons = neurons as u64;
        self.metadata.total_layers = layers as u64;
    }
}
