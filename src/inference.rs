use std::collections::HashMap;

use crate::{
    eval::{scalars_to_step, Grid, Scalars, Signal},
    Error, Layer, Network, Result,
};

/// Key under which a convolution input layer expects its image.
pub const IMAGE_KEY: &str = "image";

/// Key under which a recurrent input layer expects its sequence (one row per time step).
pub const SEQUENCE_KEY: &str = "sequence";

/// A single named value handed to [`Network::infer`].
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Scalar(f64),
    Grid(Grid),
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Grid> for InputValue {
    fn from(value: Grid) -> Self {
        Self::Grid(value)
    }
}

/// The named values handed to [`Network::infer`].
pub type InputBag = HashMap<String, InputValue>;

fn rectangular_grid<'a>(input: &'a InputBag, key: &str) -> Result<&'a Grid> {
    let grid = match input.get(key) {
        Some(InputValue::Grid(grid)) => grid,
        Some(InputValue::Scalar(_)) => {
            return Err(Error::InvalidInput(format!("`{key}` must be a grid, got a scalar")))
        }
        None => return Err(Error::InvalidInput(format!("missing `{key}`"))),
    };

    let width = grid.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(Error::InvalidInput(format!("`{key}` is empty")));
    }

    if grid.iter().any(|row| row.len() != width) {
        return Err(Error::InvalidInput(format!("`{key}` has rows of different lengths")));
    }

    Ok(grid)
}

fn all_scalars(input: &InputBag) -> Option<Scalars> {
    input
        .iter()
        .map(|(k, v)| match v {
            InputValue::Scalar(x) => Some((k.clone(), *x)),
            InputValue::Grid(_) => None,
        })
        .collect()
}

impl Network {
    /// Converts caller input into the representation the input layer declares.
    pub fn adapt_input(&self, input: &InputBag) -> Result<Signal> {
        match &self.layers.input {
            Layer::Dense(_) => all_scalars(input).map(Signal::Scalars).ok_or_else(|| {
                Error::InvalidInput("dense input layer expects only scalar values".into())
            }),
            Layer::Convolution(_) => {
                rectangular_grid(input, IMAGE_KEY).map(|grid| Signal::Images(vec![grid.clone()]))
            }
            Layer::Recurrent(_) => match rectangular_grid(input, SEQUENCE_KEY) {
                Ok(steps) => Ok(Signal::Sequence(steps.clone())),
                Err(e) => match all_scalars(input) {
                    Some(values) if !values.is_empty() => {
                        Ok(Signal::Sequence(vec![scalars_to_step(&values)]))
                    }
                    _ => Err(e),
                },
            },
        }
    }

    /// Runs the input through every hidden layer and the output layer, returning the
    /// output layer's values keyed by neuron id.
    ///
    /// No normalization is done across the output layer, so softmax outputs are raw `e^x` terms.
    pub fn infer(&self, input: &InputBag) -> Result<Scalars> {
        let signal = self.adapt_input(input)?;
        self.propagate(signal)
    }

    /// [`infer`][Network::infer] for networks with a dense input layer.
    pub fn infer_scalars(&self, inputs: &Scalars) -> Result<Scalars> {
        if !matches!(self.layers.input, Layer::Dense(_)) {
            return Err(Error::InvalidInput(format!(
                "{} input layer cannot take named scalars directly",
                self.layers.input.kind()
            )));
        }

        self.propagate(Signal::Scalars(inputs.clone()))
    }

    fn propagate(&self, mut signal: Signal) -> Result<Scalars> {
        let layers = self
            .layers
            .hidden
            .iter()
            .chain(std::iter::once(&self.layers.output));

        for (i, layer) in layers.enumerate() {
            signal = layer.process(&signal)?;
            log::trace!("layer {i} ({}) -> {}", layer.kind(), signal.describe());
        }

        match signal {
            Signal::Scalars(out) => Ok(out),
            other => Err(Error::MalformedOutput(other.describe())),
        }
    }
}
