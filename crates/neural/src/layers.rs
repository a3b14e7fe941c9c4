//! Trainable building blocks: fully connected layers and embedding tables,
//! each with an explicit backward pass.

use ndarray::{s, Array1, Array2, ArrayD, ArrayViewMutD, Axis};
use rand::distributions::Uniform;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Linear transformation layer: `y = x Wᵀ + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

/// Gradients of a [`Linear`] layer's parameters.
#[derive(Debug, Clone)]
pub struct LinearGrad {
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
}

impl LinearGrad {
    pub fn into_params(self) -> Vec<ArrayD<f64>> {
        vec![self.weight.into_dyn(), self.bias.into_dyn()]
    }
}

impl Linear {
    /// Weights and bias drawn from `U(-1/√in, 1/√in)`.
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (input_dim.max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);

        let weight = Array2::from_shape_fn((output_dim, input_dim), |_| dist.sample(rng));
        let bias = Array1::from_shape_fn(output_dim, |_| dist.sample(rng));

        Self { weight, bias }
    }

    /// Like [`Linear::new`] but with weights drawn from `U(0, 1)`.
    pub fn with_unit_uniform_weights<R: Rng + ?Sized>(
        input_dim: usize,
        output_dim: usize,
        rng: &mut R,
    ) -> Self {
        let mut layer = Self::new(input_dim, output_dim, rng);
        layer.weight = Array2::from_shape_fn((output_dim, input_dim), |_| rng.gen::<f64>());
        layer
    }

    pub fn from_parts(weight: Array2<f64>, bias: Array1<f64>) -> Self {
        Self { weight, bias }
    }

    /// Forward pass over a batch (`batch × input_dim`).
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weight.t()) + &self.bias
    }

    /// Returns parameter gradients and the gradient w.r.t. the input.
    pub fn backward(
        &self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> (LinearGrad, Array2<f64>) {
        let grad = LinearGrad {
            weight: grad_output.t().dot(input),
            bias: grad_output.sum_axis(Axis(0)),
        };
        let grad_input = grad_output.dot(&self.weight);
        (grad, grad_input)
    }

    pub fn zero_grad(&self) -> LinearGrad {
        LinearGrad {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    /// Mutable parameter views in gradient order (weight, bias).
    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.weight.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }

    pub fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }
}

/// Lookup table mapping an index to a dense vector, initialised `N(0, 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    weight: Array2<f64>,
}

impl Embedding {
    pub fn new<R: Rng + ?Sized>(num_embeddings: usize, embedding_dim: usize, rng: &mut R) -> Self {
        let weight = Array2::from_shape_fn((num_embeddings, embedding_dim), |_| {
            StandardNormal.sample(rng)
        });
        Self { weight }
    }

    /// Gather one row per index. Indices must be below `num_embeddings`.
    pub fn forward(&self, indices: &[usize]) -> Array2<f64> {
        let mut out = Array2::zeros((indices.len(), self.embedding_dim()));
        for (row, &idx) in indices.iter().enumerate() {
            out.row_mut(row).assign(&self.weight.row(idx));
        }
        out
    }

    /// Scatter-add row gradients back onto the table.
    pub fn backward(&self, indices: &[usize], grad_output: &Array2<f64>) -> Array2<f64> {
        let mut grad = Array2::zeros(self.weight.raw_dim());
        for (row, &idx) in indices.iter().enumerate() {
            let mut target = grad.slice_mut(s![idx, ..]);
            target += &grad_output.row(row);
        }
        grad
    }

    pub fn zero_grad(&self) -> Array2<f64> {
        Array2::zeros(self.weight.raw_dim())
    }

    pub fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![self.weight.view_mut().into_dyn()]
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.weight.ncols()
    }
}

pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

/// Column-wise concatenation of two batches with equal row counts.
pub fn hstack(left: &Array2<f64>, right: &Array2<f64>) -> Array2<f64> {
    let split = left.ncols();
    let mut out = Array2::zeros((left.nrows(), split + right.ncols()));
    out.slice_mut(s![.., ..split]).assign(left);
    out.slice_mut(s![.., split..]).assign(right);
    out
}

/// Inverse of [`hstack`]: split columns at `at`.
pub fn hsplit(matrix: &Array2<f64>, at: usize) -> (Array2<f64>, Array2<f64>) {
    (
        matrix.slice(s![.., ..at]).to_owned(),
        matrix.slice(s![.., at..]).to_owned(),
    )
}
