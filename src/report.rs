//! Statistics comparing predictions and feature vectors before and after an attack.
use crate::batch::Labels;
use crate::error::PerturbError;
use crate::util::{argmax_rows, l2_norm};
use crate::PcFloat;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use ndarray_stats::QuantileExt;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

pub fn predicted_classes(predictions: &ArrayView2<PcFloat>) -> Labels {
    argmax_rows(predictions)
}

fn check_labels(labels: &Labels, rows: usize, num_classes: usize) -> Result<(), PerturbError> {
    if labels.len() != rows {
        return Err(PerturbError::shape("report labels", &[rows], &[labels.len()]));
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
        return Err(PerturbError::invalid(
            "labels",
            format!("label {label} out of range for {num_classes} classes"),
        ));
    }
    Ok(())
}

/// Fraction of `predicted` equal to `labels`; zero for an empty batch.
///
/// # Errors
/// If the two label arrays differ in length.
pub fn accuracy(predicted: &Labels, labels: &Labels) -> Result<PcFloat, PerturbError> {
    if predicted.len() != labels.len() {
        return Err(PerturbError::shape(
            "accuracy",
            &[labels.len()],
            &[predicted.len()],
        ));
    }
    if labels.is_empty() {
        return Ok(0.);
    }
    let correct = Zip::from(predicted)
        .and(labels)
        .fold(0usize, |acc, p, l| acc + usize::from(p == l));
    #[allow(clippy::cast_precision_loss)]
    Ok(correct as PcFloat / labels.len() as PcFloat)
}

/// Accuracy restricted to each true class. Classes without examples report zero.
///
/// # Errors
/// On mismatched lengths or out-of-range labels.
pub fn per_class_accuracy(
    predicted: &Labels,
    labels: &Labels,
    num_classes: usize,
) -> Result<Array1<PcFloat>, PerturbError> {
    check_labels(labels, predicted.len(), num_classes)?;
    let hits = Zip::from(predicted)
        .and(labels)
        .map_collect(|p, l| if p == l { 1. } else { 0. });
    per_class_mean(&hits.view(), labels, num_classes)
}

/// Mean of `values` grouped by label. Classes without examples report zero.
///
/// # Errors
/// On mismatched lengths or out-of-range labels.
pub fn per_class_mean(
    values: &ArrayView1<PcFloat>,
    labels: &Labels,
    num_classes: usize,
) -> Result<Array1<PcFloat>, PerturbError> {
    check_labels(labels, values.len(), num_classes)?;
    let mut sums = Array1::<PcFloat>::zeros(num_classes);
    let mut counts = Array1::<PcFloat>::zeros(num_classes);
    for (&v, &l) in values.iter().zip(labels.iter()) {
        sums[l] += v;
        counts[l] += 1.;
    }
    Ok(Zip::from(&sums)
        .and(&counts)
        .map_collect(|&s, &c| if c == 0. { 0. } else { s / c }))
}

/// For each row, the index of the entry with the `kth` largest magnitude (0 = largest), counted
/// over rows. Ties resolve to the lower index.
pub fn kth_max_frequency(diff: &ArrayView2<PcFloat>, kth: usize) -> BTreeMap<usize, usize> {
    let mut freq = BTreeMap::new();
    for row in diff.axis_iter(Axis(0)) {
        let ranked = row
            .iter()
            .enumerate()
            .sorted_by_key(|&(_, v)| Reverse(OrderedFloat(v.abs())))
            .nth(kth);
        if let Some((idx, _)) = ranked {
            *freq.entry(idx).or_insert(0) += 1;
        }
    }
    freq
}

/// Largest distance of any point of `cloud` from the origin.
pub fn max_point_norm(cloud: &ArrayView2<PcFloat>) -> PcFloat {
    cloud
        .axis_iter(Axis(0))
        .map(l2_norm)
        .fold(0., PcFloat::max)
}

/// How feature vectors move when clean clouds are replaced by adversarial ones.
#[derive(Clone, Debug)]
pub struct FeatureShiftReport {
    pub mean_l2_change: PcFloat,
    pub per_class_l2_change: Array1<PcFloat>,
    pub mean_fraction_positive: PcFloat,
    pub mean_fraction_negative: PcFloat,
    pub per_class_fraction_positive: Array1<PcFloat>,
    pub per_class_fraction_negative: Array1<PcFloat>,
    pub mean_dimension_change: PcFloat,
    pub per_class_dimension_change: Array1<PcFloat>,
    /// Min and max over dimensions of the change averaged across examples.
    pub per_dimension_change_range: (PcFloat, PcFloat),
    /// `top_changed_dimensions[k]` is [`kth_max_frequency`] for k = 0, 1, 2.
    pub top_changed_dimensions: Vec<BTreeMap<usize, usize>>,
}

impl FeatureShiftReport {
    /// # Errors
    /// If the feature matrices differ in shape, are empty, or labels do not match.
    pub fn new(
        original: &ArrayView2<PcFloat>,
        adversarial: &ArrayView2<PcFloat>,
        labels: &Labels,
        num_classes: usize,
    ) -> Result<Self, PerturbError> {
        if original.shape() != adversarial.shape() {
            return Err(PerturbError::shape(
                "feature shift",
                original.shape(),
                adversarial.shape(),
            ));
        }
        if original.is_empty() {
            return Err(PerturbError::invalid("features", "no feature vectors given"));
        }
        check_labels(labels, original.nrows(), num_classes)?;

        let diff = adversarial - original;
        #[allow(clippy::cast_precision_loss)]
        let dims = diff.ncols() as PcFloat;
        let norms = diff.map_axis(Axis(1), l2_norm);
        let frac_pos = diff.map_axis(Axis(1), |row| {
            row.iter().filter(|&&d| d > 0.).count() as PcFloat / dims
        });
        let frac_neg = diff.map_axis(Axis(1), |row| {
            row.iter().filter(|&&d| d < 0.).count() as PcFloat / dims
        });
        let row_means = diff.map_axis(Axis(1), |row| row.sum() / dims);
        let per_dimension = diff
            .mean_axis(Axis(0))
            .ok_or_else(|| PerturbError::invalid("features", "no feature vectors given"))?;
        let degenerate = |_| PerturbError::NumericDegeneracy {
            context: "per-dimension feature change",
        };

        Ok(Self {
            mean_l2_change: norms.mean().unwrap_or(0.),
            per_class_l2_change: per_class_mean(&norms.view(), labels, num_classes)?,
            mean_fraction_positive: frac_pos.mean().unwrap_or(0.),
            mean_fraction_negative: frac_neg.mean().unwrap_or(0.),
            per_class_fraction_positive: per_class_mean(&frac_pos.view(), labels, num_classes)?,
            per_class_fraction_negative: per_class_mean(&frac_neg.view(), labels, num_classes)?,
            mean_dimension_change: diff.mean().unwrap_or(0.),
            per_class_dimension_change: per_class_mean(&row_means.view(), labels, num_classes)?,
            per_dimension_change_range: (
                *per_dimension.min().map_err(degenerate)?,
                *per_dimension.max().map_err(degenerate)?,
            ),
            top_changed_dimensions: (0..3).map(|k| kth_max_frequency(&diff.view(), k)).collect(),
        })
    }

    /// Text rendering; classes are labelled with `class_names` where given.
    pub fn render(&self, class_names: Option<&[String]>) -> String {
        self.with_class_names(class_names).to_string()
    }

    pub const fn with_class_names<'a>(
        &'a self,
        class_names: Option<&'a [String]>,
    ) -> NamedFeatureShift<'a> {
        NamedFeatureShift {
            report: self,
            class_names,
        }
    }
}

impl fmt::Display for FeatureShiftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.with_class_names(None), f)
    }
}

/// A [`FeatureShiftReport`] displayed with class names.
#[derive(Clone, Copy, Debug)]
pub struct NamedFeatureShift<'a> {
    report: &'a FeatureShiftReport,
    class_names: Option<&'a [String]>,
}

impl NamedFeatureShift<'_> {
    fn per_class(&self, f: &mut fmt::Formatter<'_>, values: &Array1<PcFloat>) -> fmt::Result {
        for (i, v) in values.iter().enumerate() {
            let name = self
                .class_names
                .and_then(|names| names.get(i))
                .map_or("", String::as_str);
            writeln!(f, "{i}, {name}: {v:.3}")?;
        }
        Ok(())
    }
}

impl fmt::Display for NamedFeatureShift<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.report;
        writeln!(
            f,
            "Average L2 norms of feature vector changes: {:.3}",
            r.mean_l2_change
        )?;
        writeln!(f, "Average L2 norms of feature vector changes per class:")?;
        self.per_class(f, &r.per_class_l2_change)?;
        writeln!(f, "Average % positive change: {:.3}", r.mean_fraction_positive)?;
        writeln!(f, "Average % negative change: {:.3}", r.mean_fraction_negative)?;
        writeln!(f, "Average % positive change per class:")?;
        self.per_class(f, &r.per_class_fraction_positive)?;
        writeln!(f, "Average % negative change per class:")?;
        self.per_class(f, &r.per_class_fraction_negative)?;
        writeln!(f, "Average dimension change {:.3}", r.mean_dimension_change)?;
        writeln!(f, "Average dimension per class:")?;
        self.per_class(f, &r.per_class_dimension_change)?;
        writeln!(
            f,
            "Average change per dimension, min {:.3}, max {:.3}",
            r.per_dimension_change_range.0, r.per_dimension_change_range.1
        )?;
        for (k, freq) in r.top_changed_dimensions.iter().enumerate() {
            writeln!(f, "Number of times a dimension is change rank {k}: {freq:?}")?;
        }
        Ok(())
    }
}

/// Mean feature distances between groups of examples, as (row class, column class) matrices.
///
/// Rows of `original`/`adversarial` are grouped by true label; rows of the `pred_adv_*`
/// matrices by the class predicted on the adversarial example. Columns always group the clean
/// features by true label.
#[derive(Clone, Debug)]
pub struct ClassPairDistances {
    pub original: Array2<PcFloat>,
    pub adversarial: Array2<PcFloat>,
    pub pred_adv_original: Array2<PcFloat>,
    pub pred_adv: Array2<PcFloat>,
    /// 1 at `(label, pred_adv)` for every example, 0 elsewhere.
    pub relevance_mask: Array2<PcFloat>,
}

impl ClassPairDistances {
    /// # Errors
    /// On mismatched shapes or out-of-range labels.
    pub fn new(
        features_original: &ArrayView2<PcFloat>,
        features_adv: &ArrayView2<PcFloat>,
        labels: &Labels,
        pred_adv: &Labels,
        num_classes: usize,
    ) -> Result<Self, PerturbError> {
        if features_original.shape() != features_adv.shape() {
            return Err(PerturbError::shape(
                "class pair distances",
                features_original.shape(),
                features_adv.shape(),
            ));
        }
        let rows = features_original.nrows();
        check_labels(labels, rows, num_classes)?;
        check_labels(pred_adv, rows, num_classes)?;

        let shape = (num_classes, num_classes);
        let mut original = Array2::<PcFloat>::zeros(shape);
        let mut adversarial = Array2::<PcFloat>::zeros(shape);
        let mut pred_adv_original = Array2::<PcFloat>::zeros(shape);
        let mut pred_adv_dist = Array2::<PcFloat>::zeros(shape);
        let mut counts = Array2::<PcFloat>::zeros(shape);
        let mut counts_pred = Array2::<PcFloat>::zeros(shape);
        let mut relevance_mask = Array2::<PcFloat>::zeros(shape);

        for i in 0..rows {
            let (li, pi) = (labels[i], pred_adv[i]);
            relevance_mask[[li, pi]] = 1.;
            for j in 0..rows {
                let lj = labels[j];
                let fo_j = features_original.row(j);
                let d_orig = l2_norm((&features_original.row(i) - &fo_j).view());
                let d_adv = l2_norm((&features_adv.row(i) - &fo_j).view());
                original[[li, lj]] += d_orig;
                adversarial[[li, lj]] += d_adv;
                pred_adv_original[[pi, lj]] += d_orig;
                pred_adv_dist[[pi, lj]] += d_adv;
                counts[[li, lj]] += 1.;
                counts_pred[[pi, lj]] += 1.;
            }
        }

        let average = |sums: Array2<PcFloat>, counts: &Array2<PcFloat>| {
            Zip::from(&sums)
                .and(counts)
                .map_collect(|&s, &c| if c == 0. { 0. } else { s / c })
        };
        Ok(Self {
            original: average(original, &counts),
            adversarial: average(adversarial, &counts),
            pred_adv_original: average(pred_adv_original, &counts_pred),
            pred_adv: average(pred_adv_dist, &counts_pred),
            relevance_mask,
        })
    }

    pub fn change(&self) -> Array2<PcFloat> {
        &self.adversarial - &self.original
    }

    /// Change restricted to the (label, adversarial prediction) pairs that occurred.
    pub fn relevant_change(&self) -> Array2<PcFloat> {
        self.change() * &self.relevance_mask
    }

    pub fn pred_adv_change(&self) -> Array2<PcFloat> {
        &self.pred_adv - &self.pred_adv_original
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use more_asserts::assert_le;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        assert_abs_diff_eq!(
            accuracy(&array![0, 1, 2, 2], &array![0, 1, 1, 2]).unwrap(),
            0.75
        );
        assert!(accuracy(&array![0], &array![0, 1]).is_err());
        let per_class = per_class_accuracy(&array![0, 1, 2, 2], &array![0, 1, 1, 2], 4).unwrap();
        assert_eq!(per_class, array![1., 0.5, 1., 0.]);
    }

    #[test]
    fn test_kth_max_frequency() {
        let diff = array![[0.1, -3., 2.], [5., 0., -1.], [1., 1., 0.]];
        let first = kth_max_frequency(&diff.view(), 0);
        assert_eq!(first, BTreeMap::from([(0, 2), (1, 1)]));
        let second = kth_max_frequency(&diff.view(), 1);
        assert_eq!(second, BTreeMap::from([(1, 1), (2, 2)]));
        assert!(kth_max_frequency(&diff.view(), 3).is_empty());
    }

    #[test]
    fn test_feature_shift_report() {
        let original = array![[0., 0.], [1., 1.], [2., 2.]];
        let adversarial = array![[3., 4.], [1., 0.], [2., 2.]];
        let labels = array![0, 1, 1];
        let report =
            FeatureShiftReport::new(&original.view(), &adversarial.view(), &labels, 3).unwrap();
        assert_abs_diff_eq!(report.mean_l2_change, 2.);
        assert_eq!(report.per_class_l2_change, array![5., 0.5, 0.]);
        assert_abs_diff_eq!(report.mean_fraction_positive, 1. / 3.);
        assert_abs_diff_eq!(report.mean_fraction_negative, 1. / 6.);
        assert_abs_diff_eq!(report.mean_dimension_change, 1.);
        assert_eq!(report.per_class_dimension_change, array![3.5, -0.25, 0.]);
        assert_abs_diff_eq!(report.per_dimension_change_range.0, 1.);
        assert_abs_diff_eq!(report.per_dimension_change_range.1, 1.);
        assert_eq!(report.top_changed_dimensions.len(), 3);
        let text = report.render(Some(&["chair".to_string(), "lamp".to_string()]));
        assert!(text.contains("Average L2 norms of feature vector changes: 2.000"));
        assert!(text.contains("0, chair: 5.000"));
        assert!(text.contains("2, : 0.000"));
        let unnamed = report.to_string();
        assert!(unnamed.contains("0, : 5.000"));
        assert!(unnamed.contains("change rank 1: {0: 2, 1: 1}\n"));
        // Two feature dimensions have no third-ranked entry.
        assert!(unnamed.ends_with("change rank 2: {}\n"));
        assert_eq!(unnamed, report.render(None));
    }

    #[test]
    fn test_class_pair_distances() {
        let original = array![[0., 0.], [3., 4.]];
        let adversarial = array![[3., 4.], [3., 4.]];
        let labels = array![0, 1];
        let pred_adv = array![1, 1];
        let pairs = ClassPairDistances::new(
            &original.view(),
            &adversarial.view(),
            &labels,
            &pred_adv,
            2,
        )
        .unwrap();
        assert_eq!(pairs.original, array![[0., 5.], [5., 0.]]);
        assert_eq!(pairs.adversarial, array![[5., 0.], [5., 0.]]);
        assert_eq!(pairs.relevance_mask, array![[0., 1.], [0., 1.]]);
        assert_eq!(pairs.relevant_change(), array![[0., -5.], [0., 0.]]);
        // Both adversarial examples are predicted as class 1.
        assert_eq!(pairs.pred_adv_original, array![[0., 0.], [2.5, 2.5]]);
        assert_eq!(pairs.pred_adv, array![[0., 0.], [5., 0.]]);
        assert_eq!(pairs.pred_adv_change(), array![[0., 0.], [2.5, -2.5]]);
    }

    #[test]
    fn test_max_point_norm() {
        let cloud = array![[0., 0., 1.], [3., 4., 0.], [-1., 0., 0.]];
        assert_abs_diff_eq!(max_point_norm(&cloud.view()), 5.);
        assert_le!(max_point_norm(&array![[0.1, 0., 0.]].view()), 0.1);
    }
}
