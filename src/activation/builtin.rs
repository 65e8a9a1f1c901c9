/// The sigmoid activation function. Scales all values nonlinearly to the range (0, 1).
pub fn sigmoid(n: f64) -> f64 {
    1. / (1. + (-n).exp())
}

/// The ReLU activation function. Equal to `n.max(0)`
pub fn relu(n: f64) -> f64 {
    n.max(0.)
}

/// ReLU with a small slope of `0.01` for negative values.
pub fn leaky_relu(n: f64) -> f64 {
    if n > 0. {
        n
    } else {
        0.01 * n
    }
}

/// Exponential linear unit with `alpha = 1`.
pub fn elu(n: f64) -> f64 {
    if n >= 0. {
        n
    } else {
        n.exp() - 1.
    }
}

/// Scaled exponential linear unit.
pub fn selu(n: f64) -> f64 {
    const LAMBDA: f64 = 1.0507;
    const ALPHA: f64 = 1.6733;

    if n >= 0. {
        LAMBDA * n
    } else {
        LAMBDA * (ALPHA * (n.exp() - 1.))
    }
}

/// Smooth approximation of ReLU, `ln(1 + e^n)`.
pub fn softplus(n: f64) -> f64 {
    (1. + n.exp()).ln()
}

/// `n * sigmoid(n)`, with beta fixed at 1.
pub fn swish(n: f64) -> f64 {
    n * sigmoid(n)
}

/// A single softmax term, `e^n`. Not normalized: dividing by the sum over the
/// whole output vector is left to the caller.
pub fn softmax_term(n: f64) -> f64 {
    n.exp()
}

/// Activation function that does nothing.
pub fn linear_activation(n: f64) -> f64 {
    n
}
