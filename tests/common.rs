use ndarray::{Array, Array1, Array3};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use pcadv_rs::batch::Batch;
use pcadv_rs::model::PointNetClassifier;
use rand::SeedableRng;
use rand_pcg::Pcg64;

pub fn make_classifier(seed: u64, num_classes: usize) -> PointNetClassifier {
    let mut rng = Pcg64::seed_from_u64(seed);
    PointNetClassifier::random(3, &[16, 32], &[16], num_classes, None, &mut rng).unwrap()
}

/// A (B, N, 3) batch with coordinates uniform in [-1, 1).
pub fn random_batch(seed: u64, batch_size: usize, num_points: usize) -> Batch {
    let mut rng = Pcg64::seed_from_u64(seed);
    let data: Array3<f64> = Array::random_using(
        (batch_size, num_points, 3),
        Uniform::new(-1., 1.),
        &mut rng,
    );
    Batch::new(data)
}

pub fn labels(batch_size: usize, num_classes: usize) -> Array1<usize> {
    Array1::from_shape_fn(batch_size, |i| i % num_classes)
}
