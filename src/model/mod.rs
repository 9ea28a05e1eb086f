//! The classifier capability consumed by the attack engine, plus a small reference classifier.
pub mod dense;
pub mod dropout;
pub mod loss;
pub mod pointnet;
pub mod relu;

pub use dense::Dense;
pub use dropout::Dropout;
pub use pointnet::PointNetClassifier;
pub use relu::ReLU;

use crate::batch::{Labels, Tracked};
use crate::error::ModelError;
use crate::PcFloat;
use ndarray::{Array2, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Computation mode of a model. Passed explicitly on every call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    #[default]
    Eval,
}

/// Scalar loss together with its gradient with respect to the tracked input.
#[derive(Clone, Debug)]
pub struct Loss {
    pub value: PcFloat,
    pub input_grad: Array3<PcFloat>,
}

/// Output of one model evaluation: per-class scores of shape (B, C) and, when targets were
/// supplied, the loss.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub predictions: Array2<PcFloat>,
    pub loss: Option<Loss>,
}

/// A differentiable model evaluation `(x, t) -> (predictions, loss)`.
///
/// `loss` must be `None` exactly when `targets` is `None`. Implementations must not mutate
/// shared parameters; the attack calls `evaluate` many times within a single perturbation.
pub trait ModelLossFn {
    /// # Errors
    /// Any failure of the underlying model.
    fn evaluate(&self, x: &Tracked, targets: Option<&Labels>) -> Result<Evaluation, ModelError>;
}

impl<F> ModelLossFn for F
where
    F: Fn(&Tracked, Option<&Labels>) -> Result<Evaluation, ModelError>,
{
    fn evaluate(&self, x: &Tracked, targets: Option<&Labels>) -> Result<Evaluation, ModelError> {
        self(x, targets)
    }
}

/// A point-cloud classifier with a cross-entropy loss that can be differentiated with respect
/// to its input.
pub trait Classifier: Debug {
    fn point_dim(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Per-class scores, shape (B, C).
    ///
    /// # Errors
    fn forward(&self, x: ArrayView3<PcFloat>, mode: Mode) -> Result<Array2<PcFloat>, ModelError>;

    /// Global feature vector of each cloud, shape (B, F).
    ///
    /// # Errors
    fn features(&self, x: ArrayView3<PcFloat>, mode: Mode)
        -> Result<Array2<PcFloat>, ModelError>;

    /// # Errors
    fn loss_and_input_grad(
        &self,
        x: ArrayView3<PcFloat>,
        labels: &Labels,
        mode: Mode,
    ) -> Result<(Array2<PcFloat>, Loss), ModelError>;

    /// # Errors
    fn loss(&self, x: ArrayView3<PcFloat>, labels: &Labels, mode: Mode) -> Result<PcFloat, ModelError> {
        let logits = self.forward(x, mode)?;
        loss::softmax_cross_entropy(&logits.view(), labels).map(|(value, _)| value)
    }

    fn loss_fn(&self, mode: Mode) -> ClassifierLoss<'_, Self>
    where
        Self: Sized,
    {
        ClassifierLoss {
            classifier: self,
            mode,
        }
    }
}

/// Binds a classifier and a mode into a [`ModelLossFn`]. Parameters stay borrowed, so every
/// evaluation reuses the same weights.
#[derive(Debug)]
pub struct ClassifierLoss<'a, C: ?Sized> {
    classifier: &'a C,
    mode: Mode,
}

impl<'a, C: Classifier + ?Sized> ModelLossFn for ClassifierLoss<'a, C> {
    fn evaluate(&self, x: &Tracked, targets: Option<&Labels>) -> Result<Evaluation, ModelError> {
        match targets {
            None => Ok(Evaluation {
                predictions: self.classifier.forward(x.value(), self.mode)?,
                loss: None,
            }),
            Some(t) => {
                let (predictions, loss) =
                    self.classifier.loss_and_input_grad(x.value(), t, self.mode)?;
                Ok(Evaluation {
                    predictions,
                    loss: Some(loss),
                })
            }
        }
    }
}
