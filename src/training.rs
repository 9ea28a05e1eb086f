//! Loss used for adversarial training: the mean of the clean loss and the loss on a perturbed
//! copy of the batch.
use crate::attack::{perturb, AttackConfig};
use crate::batch::{Batch, Labels};
use crate::error::PerturbError;
use crate::model::{Classifier, Mode};
use crate::PcFloat;
use log::debug;

#[derive(Clone, Debug)]
pub struct BlendedLoss {
    pub clean: PcFloat,
    pub adversarial: PcFloat,
    pub total: PcFloat,
    pub adversarial_batch: Batch,
}

/// Attacks `batch` away from the classifier's own predictions in `mode` and blends the clean
/// and adversarial losses on the true `labels` equally.
///
/// # Errors
/// Any attack or model failure.
pub fn blended_loss<C: Classifier>(
    classifier: &C,
    batch: &Batch,
    labels: &Labels,
    attack: &AttackConfig,
    mode: Mode,
) -> Result<BlendedLoss, PerturbError> {
    batch.check_labels(labels)?;
    let clean = classifier.loss(batch.view(), labels, mode)?;
    let adversarial_batch = perturb(batch, &classifier.loss_fn(mode), None, attack)?;
    let adversarial = classifier.loss(adversarial_batch.view(), labels, mode)?;
    let total = 0.5 * (clean + adversarial);
    debug!(
        "Blended loss {:.4} (clean {:.4}, adversarial {:.4})",
        total, clean, adversarial
    );
    Ok(BlendedLoss {
        clean,
        adversarial,
        total,
        adversarial_batch,
    })
}
