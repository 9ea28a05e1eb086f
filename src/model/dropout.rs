use crate::error::ModelError;
use crate::model::Mode;
use crate::PcFloat;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Inverted dropout. Active only in [`Mode::Train`]; the mask is drawn from a fixed seed so that
/// a forward pass and its backward pass agree, and repeated evaluations inside one attack see
/// the same function.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Dropout {
    prob: PcFloat,
    seed: u64,
}

impl Dropout {
    /// # Errors
    /// If `prob` is outside `[0, 1)`.
    pub fn new(prob: PcFloat, seed: u64) -> Result<Self, ModelError> {
        if (0. ..1.).contains(&prob) {
            Ok(Self { prob, seed })
        } else {
            Err(ModelError::Custom(format!(
                "dropout probability must be in [0, 1), got {prob}"
            )))
        }
    }

    pub const fn prob(&self) -> PcFloat {
        self.prob
    }

    /// Multiplicative mask for an activation of the given shape, `None` when the layer is the
    /// identity.
    pub fn mask(&self, shape: (usize, usize), mode: Mode) -> Option<Array2<PcFloat>> {
        if mode == Mode::Eval || self.prob == 0. {
            return None;
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let keep = 1. / (1. - self.prob);
        Some(Array2::from_shape_simple_fn(shape, || {
            if rng.gen::<PcFloat>() < self.prob {
                0.
            } else {
                keep
            }
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dropout_is_identity_in_eval() {
        let dropout = Dropout::new(0.5, 3).unwrap();
        assert!(dropout.mask((4, 8), Mode::Eval).is_none());
    }

    #[test]
    fn test_dropout_mask_is_deterministic() {
        let dropout = Dropout::new(0.5, 3).unwrap();
        let a = dropout.mask((4, 8), Mode::Train).unwrap();
        let b = dropout.mask((4, 8), Mode::Train).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|&m| m == 0. || (m - 2.).abs() < 1e-12));
    }

    #[test]
    fn test_dropout_rejects_bad_probability() {
        assert!(Dropout::new(1.0, 0).is_err());
        assert!(Dropout::new(-0.1, 0).is_err());
    }
}
