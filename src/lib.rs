#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]
//! Gradient-based adversarial attacks on point-cloud classifiers and a statistical outlier
//! removal defense.
extern crate ndarray;
extern crate ndarray_stats;
extern crate num;
extern crate rand;

pub mod affine;
pub mod attack;
pub mod batch;
pub mod config;
pub mod defense;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod training;
pub mod util;

#[cfg(test)]
mod test_util;

pub type PcFloat = f64;

pub use attack::{perturb, AttackConfig, Budget, Granularity, Norm};
pub use batch::{Batch, Labels, Tracked};
pub use config::PipelineConfig;
pub use defense::{remove_outliers, remove_outliers_with, DefenseConfig};
pub use error::{ModelError, PerturbError};
pub use model::{Classifier, Evaluation, Loss, Mode, ModelLossFn, PointNetClassifier};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use record::AttackRecord;
pub use training::{blended_loss, BlendedLoss};
