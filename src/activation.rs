pub mod builtin;

use builtin::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use bitflags::bitflags;
use rand::{seq::SliceRandom, Rng};
use std::{convert::Infallible, fmt, str::FromStr};

bitflags! {
    /// Specifies where an activation function can be randomly chosen.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct NeuronScope: u8 {
        /// Whether the activation can be applied to the input layer.
        const INPUT = 0b001;

        /// Whether the activation can be applied to the hidden layer.
        const HIDDEN = 0b010;

        /// Whether the activation can be applied to the output layer.
        const OUTPUT = 0b100;

        /// If this flag is true, it ignores all the rest and does not make the function naturally occur.
        const NONE = 0b1000;
    }
}

impl Default for NeuronScope {
    fn default() -> Self {
        Self::HIDDEN
    }
}

/// The activation function attached to a dense [`Neuron`][crate::Neuron], stored as its tag.
///
/// Unrecognized tags are kept verbatim in [`ActivationKind::Other`] so that a document
/// round-trips losslessly. They evaluate as the identity function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ActivationKind {
    /// `max(0, x)`
    Relu,

    /// `1 / (1 + e^-x)`
    Sigmoid,

    /// Hyperbolic tangent.
    Tanh,

    /// `e^x`, without normalization across the layer.
    Softmax,

    /// `x` for positive inputs, `0.01x` otherwise.
    LeakyRelu,

    /// `x * sigmoid(x)`
    Swish,

    /// Exponential linear unit.
    Elu,

    /// Scaled exponential linear unit.
    Selu,

    /// `ln(1 + e^x)`
    Softplus,

    /// Passes the value through unchanged.
    #[default]
    Identity,

    /// Any tag not listed above.
    Other(String),
}

impl ActivationKind {
    /// Every recognized activation, in a fixed order.
    pub const BUILTIN: [ActivationKind; 10] = [
        ActivationKind::Relu,
        ActivationKind::Sigmoid,
        ActivationKind::Tanh,
        ActivationKind::Softmax,
        ActivationKind::LeakyRelu,
        ActivationKind::Swish,
        ActivationKind::Elu,
        ActivationKind::Selu,
        ActivationKind::Softplus,
        ActivationKind::Identity,
    ];

    /// The tag used for this activation in documents.
    pub fn name(&self) -> &str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
            Self::LeakyRelu => "leaky_relu",
            Self::Swish => "swish",
            Self::Elu => "elu",
            Self::Selu => "selu",
            Self::Softplus => "softplus",
            Self::Identity => "identity",
            Self::Other(name) => name,
        }
    }

    /// Where this activation may be drawn by [`ActivationKind::random_in_scope`].
    pub fn scope(&self) -> NeuronScope {
        match self {
            Self::Relu | Self::Sigmoid | Self::Tanh | Self::LeakyRelu => {
                NeuronScope::HIDDEN | NeuronScope::OUTPUT
            }
            Self::Softmax | Self::Swish | Self::Elu | Self::Selu | Self::Softplus => {
                NeuronScope::OUTPUT
            }
            Self::Identity => NeuronScope::INPUT | NeuronScope::OUTPUT,
            Self::Other(_) => NeuronScope::NONE,
        }
    }

    /// Applies the activation to a pre-activation sum.
    pub fn activate(&self, n: f64) -> f64 {
        match self {
            Self::Relu => relu(n),
            Self::Sigmoid => sigmoid(n),
            Self::Tanh => n.tanh(),
            Self::Softmax => softmax_term(n),
            Self::LeakyRelu => leaky_relu(n),
            Self::Swish => swish(n),
            Self::Elu => elu(n),
            Self::Selu => selu(n),
            Self::Softplus => softplus(n),
            Self::Identity | Self::Other(_) => linear_activation(n),
        }
    }

    /// Gets all activation functions that are valid for a scope, in [`BUILTIN`][ActivationKind::BUILTIN] order.
    pub fn in_scope(scope: NeuronScope) -> Vec<ActivationKind> {
        Self::BUILTIN
            .into_iter()
            .filter(|a| !a.scope().contains(NeuronScope::NONE) && a.scope().contains(scope))
            .collect()
    }

    /// Picks a uniformly random activation from those valid for `scope`.
    /// Falls back to [`ActivationKind::Identity`] if none are.
    pub fn random_in_scope(scope: NeuronScope, rng: &mut impl Rng) -> ActivationKind {
        Self::in_scope(scope)
            .choose(rng)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::BUILTIN
            .into_iter()
            .find(|a| a.name() == s)
            .unwrap_or_else(|| Self::Other(s.to_owned())))
    }
}

impl From<&str> for ActivationKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(a) => a,
            Err(never) => match never {},
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for ActivationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(feature = "serde")]
impl<'a> Deserialize<'a> for ActivationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'a>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(ActivationKind::from(name.as_str()))
    }
}
