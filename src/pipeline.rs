//! Clean evaluation, attack, optional defense and re-evaluation of one labelled batch.
use crate::attack::perturb;
use crate::batch::{Batch, Labels};
use crate::config::PipelineConfig;
use crate::defense::remove_outliers_with;
use crate::error::PerturbError;
use crate::model::Classifier;
use crate::record::AttackRecord;
use crate::report::{accuracy, predicted_classes, ClassPairDistances, FeatureShiftReport};
use crate::PcFloat;
use log::info;
use ndarray::Array2;

#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub labels: Labels,
    pub clean_predictions: Labels,
    pub adversarial_predictions: Labels,
    pub defended_predictions: Option<Labels>,
    pub clean_accuracy: PcFloat,
    pub adversarial_accuracy: PcFloat,
    pub defended_accuracy: Option<PcFloat>,
    pub original_features: Array2<PcFloat>,
    pub adversarial_features: Array2<PcFloat>,
    /// Possibly truncated to `record_limit` objects.
    pub record: AttackRecord,
}

impl PipelineOutcome {
    /// # Errors
    pub fn feature_shift(&self, num_classes: usize) -> Result<FeatureShiftReport, PerturbError> {
        FeatureShiftReport::new(
            &self.original_features.view(),
            &self.adversarial_features.view(),
            &self.labels,
            num_classes,
        )
    }

    /// # Errors
    pub fn class_pair_distances(
        &self,
        num_classes: usize,
    ) -> Result<ClassPairDistances, PerturbError> {
        ClassPairDistances::new(
            &self.original_features.view(),
            &self.adversarial_features.view(),
            &self.labels,
            &self.adversarial_predictions,
            num_classes,
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Attacks `batch` away from its true `labels` and reports how the classifier fares on the
    /// clean, adversarial and (if configured) defended clouds.
    ///
    /// # Errors
    /// A targeted attack configuration, mismatched labels, or any attack, defense or model
    /// failure.
    pub fn run<C: Classifier>(
        &self,
        classifier: &C,
        batch: &Batch,
        labels: &Labels,
    ) -> Result<PipelineOutcome, PerturbError> {
        if self.config.attack.targeted {
            return Err(PerturbError::invalid(
                "attack.targeted",
                "the pipeline attacks away from the true labels",
            ));
        }
        batch.check_labels(labels)?;
        let mode = self.config.mode;

        let clean_predictions = predicted_classes(&classifier.forward(batch.view(), mode)?.view());
        let clean_accuracy = accuracy(&clean_predictions, labels)?;

        let adversarial = perturb(
            batch,
            &classifier.loss_fn(mode),
            Some(labels),
            &self.config.attack,
        )?;
        let adversarial_predictions =
            predicted_classes(&classifier.forward(adversarial.view(), mode)?.view());
        let adversarial_accuracy = accuracy(&adversarial_predictions, labels)?;

        let (defended_predictions, defended_accuracy) = match &self.config.defense {
            Some(defense) => {
                let defended = remove_outliers_with(&adversarial, defense)?;
                let predictions =
                    predicted_classes(&classifier.forward(defended.view(), mode)?.view());
                let acc = accuracy(&predictions, labels)?;
                (Some(predictions), Some(acc))
            }
            None => (None, None),
        };

        info!(
            "Accuracy clean {:.3}, adversarial {:.3}, defended {}",
            clean_accuracy,
            adversarial_accuracy,
            defended_accuracy.map_or_else(|| "n/a".to_string(), |a| format!("{a:.3}"))
        );

        let original_features = classifier.features(batch.view(), mode)?;
        let adversarial_features = classifier.features(adversarial.view(), mode)?;
        let mut record =
            AttackRecord::from_batches(batch, &adversarial, labels, &adversarial_predictions)?;
        if let Some(limit) = self.config.record_limit {
            record = record.truncate(limit);
        }

        Ok(PipelineOutcome {
            labels: labels.clone(),
            clean_predictions,
            adversarial_predictions,
            defended_predictions,
            clean_accuracy,
            adversarial_accuracy,
            defended_accuracy,
            original_features,
            adversarial_features,
            record,
        })
    }
}
