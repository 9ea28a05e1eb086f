//! Iterative gradient attacks on point-cloud classifiers.
//!
//! Each iteration evaluates the model on a tracked copy of the current batch, normalizes the
//! input gradient under the configured norm and takes a step of size `step_eps`: ascent on the
//! loss for untargeted attacks, descent toward the targets for targeted ones. A single
//! iteration is the fast gradient attack.
use crate::batch::{Batch, Labels};
use crate::error::PerturbError;
use crate::model::ModelLossFn;
use crate::util::{all_finite, argmax_rows};
use crate::PcFloat;
use log::{debug, trace};
use ndarray::{Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound on a gradient norm before dividing by it.
pub const GRAD_EPSILON: PcFloat = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Norm {
    #[serde(rename = "2")]
    L2,
    #[serde(rename = "inf")]
    LInf,
}

impl FromStr for Norm {
    type Err = PerturbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "2" | "l2" => Ok(Self::L2),
            "inf" | "linf" => Ok(Self::LInf),
            other => Err(PerturbError::invalid(
                "norm",
                format!("expected \"2\" or \"inf\", got {other:?}"),
            )),
        }
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2 => write!(f, "2"),
            Self::LInf => write!(f, "inf"),
        }
    }
}

/// Which slice of the gradient is normalized as one vector under [`Norm::L2`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Each point's D coordinates.
    #[default]
    PerPoint,
    /// All N x D coordinates of a cloud.
    PerExample,
}

/// Total displacement allowed from the original batch, enforced after every step.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Budget {
    pub eps: PcFloat,
    pub norm: Norm,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AttackConfig {
    pub iterations: usize,
    pub step_eps: PcFloat,
    pub norm: Norm,
    pub granularity: Granularity,
    pub targeted: bool,
    /// `None` lets the steps accumulate without projection.
    pub budget: Option<Budget>,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            step_eps: 1.,
            norm: Norm::L2,
            granularity: Granularity::PerPoint,
            targeted: false,
            budget: None,
        }
    }
}

impl AttackConfig {
    pub fn fast_gradient(step_eps: PcFloat, norm: Norm) -> Self {
        Self::iterative(1, step_eps, norm)
    }

    pub fn iterative(iterations: usize, step_eps: PcFloat, norm: Norm) -> Self {
        Self {
            iterations,
            step_eps,
            norm,
            ..Self::default()
        }
    }

    /// The single L2 step of size 1 used to build adversarial batches during training.
    pub fn adversarial_training() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    #[must_use]
    pub const fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = Some(budget);
        self
    }

    #[must_use]
    pub const fn targeted(mut self) -> Self {
        self.targeted = true;
        self
    }

    /// # Errors
    pub fn validate(&self) -> Result<(), PerturbError> {
        if self.iterations == 0 {
            return Err(PerturbError::invalid("iterations", "must be at least 1"));
        }
        if !self.step_eps.is_finite() || self.step_eps < 0. {
            return Err(PerturbError::invalid(
                "step_eps",
                format!("must be finite and non-negative, got {}", self.step_eps),
            ));
        }
        if let Some(budget) = &self.budget {
            if !budget.eps.is_finite() || budget.eps < 0. {
                return Err(PerturbError::invalid(
                    "budget.eps",
                    format!("must be finite and non-negative, got {}", budget.eps),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for AttackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attack: {} x eps {} (norm {}, {:?})",
            if self.targeted { "targeted" } else { "untargeted" },
            self.iterations,
            self.step_eps,
            self.norm,
            self.granularity
        )?;
        if let Some(budget) = &self.budget {
            write!(f, ", budget {} (norm {})", budget.eps, budget.norm)?;
        }
        Ok(())
    }
}

/// Multiplies every group of `x` by `scale(l2 norm of the group)`.
fn scale_groups(
    x: &mut Array3<PcFloat>,
    granularity: Granularity,
    mut scale: impl FnMut(PcFloat) -> PcFloat,
) {
    match granularity {
        Granularity::PerPoint => {
            for mut lane in x.lanes_mut(Axis(2)) {
                let s = scale(lane.dot(&lane).sqrt());
                lane.mapv_inplace(|v| v * s);
            }
        }
        Granularity::PerExample => {
            for mut slab in x.outer_iter_mut() {
                let s = scale(slab.iter().map(|v| v * v).sum::<PcFloat>().sqrt());
                slab.mapv_inplace(|v| v * s);
            }
        }
    }
}

/// Direction of one attack step: unit L2 groups, or the element-wise sign for L∞. Zero
/// gradients stay zero.
pub fn normalize_gradient(
    grad: &ArrayView3<PcFloat>,
    norm: Norm,
    granularity: Granularity,
) -> Array3<PcFloat> {
    match norm {
        Norm::L2 => {
            let mut out = grad.to_owned();
            scale_groups(&mut out, granularity, |n| 1. / n.max(GRAD_EPSILON));
            out
        }
        Norm::LInf => grad.mapv(|g| if g == 0. { 0. } else { g.signum() }),
    }
}

/// Pulls `x` back into the budget ball around `original`.
pub fn project(
    x: &mut Array3<PcFloat>,
    original: &ArrayView3<PcFloat>,
    budget: &Budget,
    granularity: Granularity,
) {
    let mut delta = &*x - original;
    match budget.norm {
        Norm::L2 => scale_groups(&mut delta, granularity, |n| {
            if n > budget.eps {
                budget.eps / n
            } else {
                1.
            }
        }),
        Norm::LInf => delta.mapv_inplace(|d| d.clamp(-budget.eps, budget.eps)),
    }
    Zip::from(x)
        .and(original)
        .and(&delta)
        .for_each(|x, &o, &d| *x = o + d);
}

/// Perturbs `batch` to change the model's predictions.
///
/// With `targets == None` the attack first asks the model for its top-1 predictions and pushes
/// away from those. The returned batch is plain data; no tracked state survives the call.
///
/// # Errors
/// * invalid configuration or label count,
/// * non-finite input coordinates or gradients,
/// * a gradient whose shape differs from the batch,
/// * any model failure, unchanged.
pub fn perturb<M: ModelLossFn + ?Sized>(
    batch: &Batch,
    model: &M,
    targets: Option<&Labels>,
    config: &AttackConfig,
) -> Result<Batch, PerturbError> {
    config.validate()?;
    if !batch.is_all_finite() {
        return Err(PerturbError::NumericDegeneracy {
            context: "attack input",
        });
    }
    let targets = match targets {
        Some(t) => {
            batch.check_labels(t)?;
            t.clone()
        }
        None if config.targeted => {
            return Err(PerturbError::invalid(
                "targets",
                "a targeted attack needs target labels",
            ))
        }
        None => {
            let evaluation = model.evaluate(&batch.track(), None)?;
            let predicted = argmax_rows(&evaluation.predictions.view());
            debug!("Attacking predicted classes {}", predicted);
            predicted
        }
    };
    debug!("Running {} on {}", config, batch);

    let direction = if config.targeted { -1. } else { 1. };
    let original = batch.view();
    let mut x = batch.clone();
    for iteration in 0..config.iterations {
        let tracked = x.into_tracked();
        let evaluation = model.evaluate(&tracked, Some(&targets))?;
        let loss = evaluation.loss.ok_or(PerturbError::MissingLoss)?;
        if loss.input_grad.shape() != tracked.shape() {
            return Err(PerturbError::shape(
                "attack gradient",
                tracked.shape(),
                loss.input_grad.shape(),
            ));
        }
        if !all_finite(&loss.input_grad) {
            return Err(PerturbError::NumericDegeneracy {
                context: "attack gradient",
            });
        }
        trace!("Attack iteration {} loss {}", iteration, loss.value);

        let step = normalize_gradient(&loss.input_grad.view(), config.norm, config.granularity)
            * (direction * config.step_eps);
        let mut next = tracked.detach().into_inner() + &step;
        if let Some(budget) = &config.budget {
            project(&mut next, &original, budget, config.granularity);
        }
        x = Batch::new(next);
    }
    Ok(x)
}
