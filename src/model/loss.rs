use crate::batch::Labels;
use crate::error::ModelError;
use crate::PcFloat;
use ndarray::{Array2, ArrayView2, Axis};

/// Row-wise softmax, shifted by the row maximum for stability.
pub fn softmax(logits: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
    let mut out = logits.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(PcFloat::NEG_INFINITY, |m, &x| m.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }
    out
}

/// Mean softmax cross-entropy over the batch and its gradient with respect to the logits.
///
/// # Errors
/// If the label count does not match the number of rows or a label is out of range.
pub fn softmax_cross_entropy(
    logits: &ArrayView2<PcFloat>,
    labels: &Labels,
) -> Result<(PcFloat, Array2<PcFloat>), ModelError> {
    let (batch_size, num_classes) = logits.dim();
    if labels.len() != batch_size {
        return Err(ModelError::LabelCount {
            expected: batch_size,
            actual: labels.len(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
        return Err(ModelError::LabelOutOfRange { label, num_classes });
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = 1. / batch_size.max(1) as PcFloat;
    let mut grad = softmax(logits);
    let mut total = 0.;
    for (mut row, &label) in grad.axis_iter_mut(Axis(0)).zip(labels.iter()) {
        total -= row[label].max(PcFloat::MIN_POSITIVE).ln();
        row[label] -= 1.;
        row.mapv_inplace(|g| g * scale);
    }
    Ok((total * scale, grad))
}
