use rayon::prelude::*;

use super::Scalars;
use crate::{DenseLayer, Error, Neuron, Result};

impl DenseLayer {
    /// Evaluates every neuron against `inputs`, keyed by neuron id.
    /// Neurons are independent, so they are evaluated in parallel.
    ///
    /// If several inputs are missing, which [`Error::MissingInput`] comes back is unspecified.
    pub fn eval(&self, inputs: &Scalars) -> Result<Scalars> {
        self.neurons
            .par_iter()
            .map(|(id, n)| n.eval(inputs).map(|v| (id.clone(), v)))
            .collect()
    }
}

impl Neuron {
    /// The weighted sum of the connected inputs plus bias, before activation.
    pub fn pre_activation(&self, inputs: &Scalars) -> Result<f64> {
        let sum = self
            .connections
            .iter()
            .try_fold(0., |acc, (source, c)| {
                let v = inputs
                    .get(source)
                    .ok_or_else(|| Error::MissingInput(source.clone()))?;
                Ok::<_, Error>(acc + v * c.weight)
            })?;

        Ok(sum + self.bias)
    }

    /// [`pre_activation`][Neuron::pre_activation] passed through the neuron's activation.
    ///
    /// Fails with [`Error::MissingInput`] naming the first connection, in id order,
    /// whose source is absent from `inputs`.
    pub fn eval(&self, inputs: &Scalars) -> Result<f64> {
        Ok(self.activate(self.pre_activation(inputs)?))
    }
}
