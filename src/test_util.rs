#![cfg(test)]
use crate::affine::Affine2;
use crate::PcFloat;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::ArrayView1;
use ndarray::Axis;
use proptest::arbitrary::functor::ArbitraryF1;
use proptest::prelude::*;
use proptest::sample::SizeRange;
use rand::distributions::Uniform;
use rand::prelude::Distribution;
use rand::SeedableRng;
use rand_pcg::Pcg64;

prop_compose! {
    pub fn array1(len: usize)(v in Vec::lift1_with(-10. .. 10., SizeRange::new(len..=len))) -> Array1<PcFloat> {
        Array1::from_vec(v)
    }
}

prop_compose! {
    pub fn array2(rows: usize, cols: usize)(v in Vec::lift1_with(array1(cols), SizeRange::new(rows..=rows))) -> Array2<PcFloat> {
        assert!(rows > 0);
        ndarray::stack(Axis(0), &v.iter().map(|x| x.view()).collect::<Vec<ArrayView1<PcFloat>>>()).unwrap()
    }
}

prop_compose! {
    pub fn affine2(in_dim: usize, out_dim: usize)(basis in array2(out_dim, in_dim), shift in array1(out_dim)) -> Affine2 {
        Affine2::new(basis, shift)
    }
}

prop_compose! {
    /// A (B, N, D) batch with coordinates in [-1, 1).
    pub fn batch(batch_size: usize, num_points: usize, point_dim: usize)(v in Vec::lift1_with(-1. .. 1., SizeRange::new(batch_size * num_points * point_dim..=batch_size * num_points * point_dim))) -> Array3<PcFloat> {
        Array3::from_shape_vec((batch_size, num_points, point_dim), v).unwrap()
    }
}

/// `n_cluster` 3-d points within `radius` of the origin followed by one point at distance
/// `distance` along the first axis.
pub fn clustered_cloud_with_outlier(
    n_cluster: usize,
    radius: PcFloat,
    distance: PcFloat,
    seed: u64,
) -> Array2<PcFloat> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let half_width = radius / 3_f64.sqrt();
    let coord = Uniform::new(-half_width, half_width);
    let mut cloud = Array2::zeros((n_cluster + 1, 3));
    for mut point in cloud.outer_iter_mut().take(n_cluster) {
        point.mapv_inplace(|_| coord.sample(&mut rng));
    }
    cloud[[n_cluster, 0]] = distance;
    cloud
}
