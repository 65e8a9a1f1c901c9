use thiserror::Error;

use crate::LayerKind;

/// Errors produced while building, growing, evaluating or persisting a [`Network`][crate::Network].
#[derive(Error, Debug)]
pub enum Error {
    /// The caller-supplied input does not have the shape the input layer expects.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A layer received a representation it cannot consume.
    /// Indicates that the topology was assembled without respecting layer adjacency rules.
    #[error("{layer} layer cannot consume {received}")]
    RepresentationMismatch {
        layer: LayerKind,
        received: &'static str,
    },

    /// A dense connection references a source id that the previous layer did not produce.
    #[error("connection references missing input `{0}`")]
    MissingInput(String),

    /// Vector or kernel lengths do not line up.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A construction or mutation operation was called with unusable sizes.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The output layer did not produce named scalars.
    #[error("output layer produced {0} instead of named scalars")]
    MalformedOutput(&'static str),

    /// The network document could not be encoded or decoded.
    #[cfg(feature = "serde")]
    #[error("network document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
