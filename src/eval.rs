//! Per-kind layer evaluation. Each layer consumes the [`Signal`] produced by its predecessor.

pub mod conv;
pub mod dense;
pub mod lstm;

use std::collections::BTreeMap;

use crate::{network::natural_cmp, Error, Layer, Result};

/// A 2-D grid of values, row-major.
pub type Grid = Vec<Vec<f64>>;

/// Values keyed by the id of the neuron (or output position) that produced them.
pub type Scalars = BTreeMap<String, f64>;

/// The representation passed from one layer to the next.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Named scalars. Produced by every layer kind.
    Scalars(Scalars),

    /// One or more images for a convolution layer.
    Images(Vec<Grid>),

    /// Time steps for a recurrent layer, oldest first.
    Sequence(Vec<Vec<f64>>),
}

impl Signal {
    /// Short description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Scalars(_) => "named scalars",
            Self::Images(_) => "images",
            Self::Sequence(_) => "a sequence",
        }
    }
}

impl Layer {
    /// Evaluates this layer on the output of the previous one.
    ///
    /// A recurrent layer also accepts named scalars, treated as a single time step
    /// with values in natural id order (`neuron2` before `neuron10`).
    pub fn process(&self, signal: &Signal) -> Result<Signal> {
        let out = match (self, signal) {
            (Layer::Dense(layer), Signal::Scalars(inputs)) => layer.eval(inputs)?,
            (Layer::Convolution(layer), Signal::Images(images)) => layer.eval(images)?,
            (Layer::Recurrent(layer), Signal::Sequence(steps)) => layer.eval(steps)?,
            (Layer::Recurrent(layer), Signal::Scalars(values)) => {
                layer.eval(&[scalars_to_step(values)])?
            }
            (layer, signal) => {
                return Err(Error::RepresentationMismatch {
                    layer: layer.kind(),
                    received: signal.describe(),
                })
            }
        };

        Ok(Signal::Scalars(out))
    }
}

/// Flattens named scalars into one feature vector in natural id order.
pub fn scalars_to_step(values: &Scalars) -> Vec<f64> {
    let mut entries: Vec<_> = values.iter().collect();
    entries.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    entries.into_iter().map(|(_, v)| *v).collect()
}
