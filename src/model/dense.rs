use crate::affine::Affine2;
use crate::PcFloat;
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully connected layer, applied row-wise.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dense {
    aff: Affine2,
}

impl Dense {
    pub fn from_parts(mul: Array2<PcFloat>, add: Array1<PcFloat>) -> Self {
        Self {
            aff: Affine2::new(mul, add),
        }
    }

    pub fn random<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        Self {
            aff: Affine2::random(input_dim, output_dim, rng),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.aff.input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.aff.output_dim()
    }

    pub fn forward(&self, input: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
        debug_assert_eq!(input.ncols(), self.input_dim());
        self.aff.apply_rows(input)
    }

    pub fn backward(&self, grad: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
        debug_assert_eq!(grad.ncols(), self.output_dim());
        self.aff.pullback_rows(grad)
    }
}

impl fmt::Display for Dense {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dense {}", self.aff.output_dim())
    }
}
