//! Layered networks built from dense, convolution and LSTM layers that can be evaluated
//! and grown one structural mutation at a time.
//!
//! ```
//! use blueprint::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let mut net = Network::new(&NetworkShape::new(2, 3, 1), &mut rng)?;
//!
//! let outputs = net.output_activation_types();
//! net.append_dense_block(4, &mut rng)?;
//! net.reattach_output_layer(&outputs, &mut rng)?;
//!
//! let input = InputBag::from([
//!     ("neuron0".to_string(), InputValue::Scalar(0.5)),
//!     ("neuron1".to_string(), InputValue::Scalar(-1.)),
//! ]);
//! let out = net.infer(&input)?;
//! assert!(out.contains_key("output0"));
//! # Ok::<(), blueprint::Error>(())
//! ```

pub mod activation;
pub mod bench;
pub mod error;
pub mod eval;
pub mod inference;
pub mod mutation;
pub mod network;

#[cfg(feature = "serde")]
pub mod persist;

pub use activation::*;
pub use bench::*;
pub use error::*;
pub use eval::*;
pub use inference::*;
pub use mutation::*;
pub use network::*;

#[cfg(test)]
mod tests;
