use super::Scalars;
use crate::{activation::builtin::sigmoid, Error, LstmCell, RecurrentLayer, Result};

/// Prefix of the keys emitted by a recurrent layer, one per cell.
pub const LSTM_OUTPUT_PREFIX: &str = "lstm";

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

impl LstmCell {
    /// Advances the cell by one time step from its previous cell state.
    /// Returns `(hidden, cell)`.
    pub fn step(&self, input: &[f64], cell_state: f64) -> Result<(f64, f64)> {
        let input_gate = sigmoid(dot(&self.input_weights, input)? + self.bias);
        let forget_gate = sigmoid(dot(&self.forget_weights, input)? + self.bias);
        let output_gate = sigmoid(dot(&self.output_weights, input)? + self.bias);
        let candidate = (dot(&self.cell_weights, input)? + self.bias).tanh();

        let cell = forget_gate * cell_state + input_gate * candidate;
        let hidden = output_gate * cell.tanh();

        Ok((hidden, cell))
    }
}

impl RecurrentLayer {
    /// Runs the whole sequence through every cell, starting from zero state,
    /// and emits the final hidden state of cell `i` under `lstm<i>`.
    pub fn eval(&self, sequence: &[Vec<f64>]) -> Result<Scalars> {
        let mut hidden = vec![0.; self.cells.len()];
        let mut cell_state = vec![0.; self.cells.len()];

        for step in sequence {
            // every cell reads the previous step's state, so build the next one separately.
            let (next_hidden, next_cell): (Vec<_>, Vec<_>) = self
                .cells
                .iter()
                .zip(&cell_state)
                .map(|(cell, &c)| cell.step(step, c))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .unzip();

            hidden = next_hidden;
            cell_state = next_cell;
        }

        Ok(hidden
            .into_iter()
            .enumerate()
            .map(|(i, h)| (format!("{LSTM_OUTPUT_PREFIX}{i}"), h))
            .collect())
    }
}
