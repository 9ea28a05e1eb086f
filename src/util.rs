//! Utility functions
use crate::batch::Labels;
use crate::PcFloat;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Dimension, Zip};
use ndarray_stats::QuantileExt;
use num::Float;

pub fn all_finite<A: Float, S: Data<Elem = A>, D: Dimension>(x: &ArrayBase<S, D>) -> bool {
    x.iter().all(|v| v.is_finite())
}

pub fn l2_norm(x: ArrayView1<PcFloat>) -> PcFloat {
    x.dot(&x).sqrt()
}

/// Euclidean distance between every pair of rows of `points`, shape (N, N).
pub fn pairwise_distances(points: &ArrayView2<PcFloat>) -> Array2<PcFloat> {
    let n = points.nrows();
    let mut dists = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = Zip::from(points.row(i))
                .and(points.row(j))
                .fold(0., |acc, &a, &b| acc + (a - b) * (a - b))
                .sqrt();
            dists[[i, j]] = d;
            dists[[j, i]] = d;
        }
    }
    dists
}

/// Index of the largest score in each row. Rows containing NaN fall back to index 0.
pub fn argmax_rows(scores: &ArrayView2<PcFloat>) -> Labels {
    scores
        .axis_iter(Axis(0))
        .map(|row| row.argmax().unwrap_or(0))
        .collect::<Array1<usize>>()
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pairwise_distances_symmetric() {
        let pts = array![[0., 0., 0.], [3., 4., 0.], [0., 0., 1.]];
        let d = pairwise_distances(&pts.view());
        assert_eq!(d[[0, 1]], 5.);
        assert_eq!(d[[1, 0]], 5.);
        assert_eq!(d[[0, 2]], 1.);
        assert!(d.diag().iter().all(|&x| x == 0.));
    }

    #[test]
    fn test_pairwise_distances_match_row_norms() {
        let pts = array![[1., -2., 0.5], [0., 0., 0.], [-3., 4., 2.], [1., 1., 1.]];
        let d = pairwise_distances(&pts.view());
        for i in 0..4 {
            for j in 0..4 {
                let expected = l2_norm((&pts.row(i) - &pts.row(j)).view());
                assert!((d[[i, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_argmax_rows() {
        let scores = array![[0.1, 0.7, 0.2], [2., -1., 2.]];
        assert_eq!(argmax_rows(&scores.view()), array![1, 0]);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&array![[1., -2.], [0., 3.]]));
        assert!(!all_finite(&array![1., f64::NAN]));
        assert!(!all_finite(&array![f64::NEG_INFINITY]));
    }
}
