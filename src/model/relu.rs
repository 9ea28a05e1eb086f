use crate::PcFloat;
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReLU;

impl ReLU {
    pub fn forward(input: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
        input.mapv(|x| if x.lt(&0.) { 0. } else { x })
    }

    /// Gradient through the activation, given the pre-activation that produced the output.
    pub fn backward(
        pre_activation: &ArrayView2<PcFloat>,
        grad: &ArrayView2<PcFloat>,
    ) -> Array2<PcFloat> {
        Zip::from(pre_activation)
            .and(grad)
            .map_collect(|&z, &g| if z > 0. { g } else { 0. })
    }
}

impl Display for ReLU {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "ReLU")
    }
}
