#![allow(clippy::module_name_repetitions)]
//! Representation of affine transformations
use crate::PcFloat;
use ndarray::{Array1, Array2, ArrayView2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Affine map `f(x) = Ax + b`, with `A` of shape (output, input).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Affine2 {
    basis: Array2<PcFloat>,
    shift: Array1<PcFloat>,
}

impl Affine2 {
    /// # Panics
    /// If improper shapes are passed in
    pub fn new(basis: Array2<PcFloat>, shift: Array1<PcFloat>) -> Self {
        debug_assert_eq!(basis.shape()[0], shift.len());
        Self { basis, shift }
    }

    /// He-scaled gaussian basis with a zero shift.
    pub fn random<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let scale = (2. / input_dim.max(1) as PcFloat).sqrt();
        let basis = Array2::<PcFloat>::random_using((output_dim, input_dim), StandardNormal, rng);
        Self {
            basis: basis * scale,
            shift: Array1::zeros(output_dim),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.basis.shape()[1]
    }

    pub fn output_dim(&self) -> usize {
        self.shift.len()
    }

    /// Applies the map to every row of `x` (shape (n, input)).
    pub fn apply_rows(&self, x: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
        x.dot(&self.basis.t()) + &self.shift
    }

    /// Pulls a row-wise output gradient (n, output) back to the input (n, input).
    pub fn pullback_rows(&self, grad: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
        grad.dot(&self.basis)
    }
}
