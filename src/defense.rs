//! Statistical outlier removal.
//!
//! Points whose mean distance to their `top_k` nearest neighbours exceeds the cloud's mean score
//! by more than `num_std` standard deviations are overwritten with the coordinates of the least
//! anomalous point. Point count is preserved.
use crate::batch::Batch;
use crate::error::PerturbError;
use crate::util::pairwise_distances;
use crate::PcFloat;
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Floor for the per-cloud standard deviation of neighbour scores.
pub const STD_EPSILON: PcFloat = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DefenseConfig {
    pub top_k: usize,
    pub num_std: PcFloat,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            num_std: 1.,
        }
    }
}

impl DefenseConfig {
    /// # Errors
    pub fn validate(&self, num_points: usize) -> Result<(), PerturbError> {
        if self.top_k == 0 {
            return Err(PerturbError::invalid("top_k", "must be at least 1"));
        }
        if self.top_k >= num_points {
            return Err(PerturbError::shape(
                "remove_outliers: top_k must be below the point count",
                &[self.top_k + 1],
                &[num_points],
            ));
        }
        if !self.num_std.is_finite() {
            return Err(PerturbError::invalid("num_std", "must be finite"));
        }
        Ok(())
    }
}

/// Neighbour distances of every point of one cloud.
#[derive(Clone, Debug)]
pub struct NeighborDistanceProfile {
    /// (N, k) distances to the k nearest other points, unordered within a row.
    pub neighbor_distances: Array2<PcFloat>,
    /// Mean of each row of `neighbor_distances`.
    pub scores: Array1<PcFloat>,
}

impl NeighborDistanceProfile {
    /// # Errors
    /// If `top_k` is not in `1..N`.
    pub fn new(cloud: &ArrayView2<PcFloat>, top_k: usize) -> Result<Self, PerturbError> {
        let n = cloud.nrows();
        DefenseConfig { top_k, num_std: 0. }.validate(n)?;
        let mut dists = pairwise_distances(cloud);
        dists.diag_mut().fill(PcFloat::INFINITY);

        let mut neighbor_distances = Array2::zeros((n, top_k));
        for (row, mut out) in dists
            .axis_iter(Axis(0))
            .zip(neighbor_distances.axis_iter_mut(Axis(0)))
        {
            let mut row = row.to_vec();
            row.select_nth_unstable_by_key(top_k - 1, |&d| OrderedFloat(d));
            out.assign(&ArrayView1::from(&row[..top_k]));
        }
        let scores = neighbor_distances
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(n));
        Ok(Self {
            neighbor_distances,
            scores,
        })
    }

    /// Points scoring more than `num_std` (population) standard deviations above the mean.
    pub fn outlier_mask(&self, num_std: PcFloat) -> Array1<bool> {
        outlier_mask(&self.scores.view(), num_std)
    }
}

pub fn outlier_mask(scores: &ArrayView1<PcFloat>, num_std: PcFloat) -> Array1<bool> {
    let mean = scores.mean().unwrap_or(0.);
    let std = scores.std(0.).max(STD_EPSILON);
    let threshold = mean + num_std * std;
    scores.mapv(|s| s > threshold)
}

/// Index of the first unflagged point; the first point when every point is flagged.
pub fn replacement_index(mask: &ArrayView1<bool>) -> usize {
    mask.iter().position(|&flagged| !flagged).unwrap_or(0)
}

/// Replaces the outliers of a single cloud, returning the sanitized cloud and how many points
/// were replaced.
///
/// # Errors
/// If `config.top_k` is not in `1..N`.
pub fn sanitize_cloud(
    cloud: &ArrayView2<PcFloat>,
    config: &DefenseConfig,
) -> Result<(Array2<PcFloat>, usize), PerturbError> {
    let profile = NeighborDistanceProfile::new(cloud, config.top_k)?;
    let mask = profile.outlier_mask(config.num_std);
    let replacement = cloud.row(replacement_index(&mask.view())).to_owned();
    let mut out = cloud.to_owned();
    let mut replaced = 0;
    for (mut point, _) in out
        .axis_iter_mut(Axis(0))
        .zip(mask.iter())
        .filter(|(_, flagged)| **flagged)
    {
        point.assign(&replacement);
        replaced += 1;
    }
    Ok((out, replaced))
}

/// Sanitizes every cloud of `batch` with the given neighbourhood size and threshold.
///
/// # Errors
/// * `top_k == 0` or a non-finite `num_std`,
/// * `top_k >= N`,
/// * non-finite coordinates.
pub fn remove_outliers(
    batch: &Batch,
    top_k: usize,
    num_std: PcFloat,
) -> Result<Batch, PerturbError> {
    remove_outliers_with(batch, &DefenseConfig { top_k, num_std })
}

/// # Errors
/// See [`remove_outliers`].
pub fn remove_outliers_with(
    batch: &Batch,
    config: &DefenseConfig,
) -> Result<Batch, PerturbError> {
    config.validate(batch.num_points())?;
    if !batch.is_all_finite() {
        return Err(PerturbError::NumericDegeneracy {
            context: "outlier removal input",
        });
    }
    let mut out = batch.view().to_owned();
    let mut total = 0;
    for (i, (cloud, mut target)) in batch
        .clouds()
        .zip(out.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let (sanitized, replaced) = sanitize_cloud(&cloud, config)?;
        trace!("Cloud {}: replaced {} outliers", i, replaced);
        target.assign(&sanitized);
        total += replaced;
    }
    debug!(
        "Outlier removal (top_k {}, num_std {}) replaced {} points in {}",
        config.top_k, config.num_std, total, batch
    );
    Ok(Batch::new(out))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use ndarray::{array, Array3};
    use proptest::prelude::*;

    #[test]
    fn test_profile_excludes_self() {
        let cloud = array![[0., 0., 0.], [1., 0., 0.], [3., 0., 0.]];
        let profile = NeighborDistanceProfile::new(&cloud.view(), 1).unwrap();
        assert_eq!(profile.scores, array![1., 1., 2.]);
        let profile = NeighborDistanceProfile::new(&cloud.view(), 2).unwrap();
        assert_eq!(profile.scores, array![2., 1.5, 2.5]);
    }

    #[test]
    fn test_far_outlier_is_replaced() {
        let cloud = clustered_cloud_with_outlier(10, 0.1, 100., 7);
        let batch = Batch::from_clouds(&[cloud.view()]).unwrap();
        let out = remove_outliers(&batch, 3, 1.0).unwrap();
        let out = out.cloud(0);
        for i in 0..10 {
            assert_eq!(out.row(i), cloud.row(i));
        }
        let replaced = out.row(10);
        assert_ne!(replaced, cloud.row(10));
        assert!((0..10).any(|i| cloud.row(i) == replaced));
    }

    #[test]
    fn test_evenly_spaced_cloud_is_unchanged() {
        let line = Array2::from_shape_fn((6, 3), |(i, j)| if j == 0 { i as PcFloat } else { 0. });
        let batch = Batch::from_clouds(&[line.view(), line.view()]).unwrap();
        let out = remove_outliers(&batch, 1, 0.).unwrap();
        assert_eq!(out, batch);
    }

    #[test]
    fn test_replacement_tie_break_is_first_unflagged() {
        assert_eq!(replacement_index(&array![true, false, false].view()), 1);
        assert_eq!(replacement_index(&array![false, true].view()), 0);
        assert_eq!(replacement_index(&array![true, true].view()), 0);
    }

    #[test]
    fn test_invalid_parameters() {
        let batch = Batch::new(Array3::zeros((1, 4, 3)));
        assert!(matches!(
            remove_outliers(&batch, 4, 1.),
            Err(PerturbError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            remove_outliers(&batch, 0, 1.),
            Err(PerturbError::InvalidParameter { .. })
        ));
        let mut nan = Array3::zeros((1, 4, 3));
        nan[[0, 1, 1]] = PcFloat::NAN;
        assert!(matches!(
            remove_outliers(&Batch::new(nan), 2, 1.),
            Err(PerturbError::NumericDegeneracy { .. })
        ));
    }

    #[test]
    fn test_all_other_points_as_neighbors() {
        let cloud = clustered_cloud_with_outlier(6, 0.1, 50., 3);
        let batch = Batch::from_clouds(&[cloud.view()]).unwrap();
        let out = remove_outliers(&batch, 6, 1.0).unwrap();
        assert_eq!(out.shape(), batch.shape());
    }

    proptest! {
        #[test]
        fn test_shape_and_membership_preserved(x in batch(3, 12, 3), top_k in 1usize..12, num_std in 0.0..2.0) {
            let input = Batch::new(x);
            let out = remove_outliers(&input, top_k, num_std).unwrap();
            prop_assert_eq!(out.shape(), input.shape());
            // Every output point is some input point of the same cloud.
            for (orig, san) in input.clouds().zip(out.clouds()) {
                for point in san.axis_iter(Axis(0)) {
                    prop_assert!(orig.axis_iter(Axis(0)).any(|p| p == point));
                }
            }
        }
    }
}
