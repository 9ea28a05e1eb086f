use ndarray::Array3;
use pcadv_rs::attack::{perturb, AttackConfig, Budget, Granularity, Norm};
use pcadv_rs::batch::Batch;
use pcadv_rs::model::{Classifier, Mode};
use pcadv_rs::util::argmax_rows;

mod common;

#[test]
fn test_untargeted_attack_increases_loss() {
    let classifier = common::make_classifier(3, 5);
    let loss_fn = classifier.loss_fn(Mode::Eval);
    let config = AttackConfig::iterative(5, 1e-3, Norm::L2);
    let labels = common::labels(4, 5);
    let trials = 8;
    let increased = (0..trials)
        .filter(|&seed| {
            let batch = common::random_batch(seed, 4, 32);
            let adv = perturb(&batch, &loss_fn, Some(&labels), &config).unwrap();
            let before = classifier.loss(batch.view(), &labels, Mode::Eval).unwrap();
            let after = classifier.loss(adv.view(), &labels, Mode::Eval).unwrap();
            after > before
        })
        .count();
    assert!(increased >= (trials - 1) as usize, "loss increased in {increased} of {trials} trials");
}

#[test]
fn test_missing_targets_use_model_predictions() {
    let classifier = common::make_classifier(9, 4);
    let loss_fn = classifier.loss_fn(Mode::Eval);
    let batch = common::random_batch(21, 3, 16);
    let predicted = argmax_rows(&classifier.forward(batch.view(), Mode::Eval).unwrap().view());
    for config in [
        AttackConfig::fast_gradient(0.05, Norm::LInf),
        AttackConfig::iterative(3, 0.01, Norm::L2).with_granularity(Granularity::PerExample),
    ] {
        let implicit = perturb(&batch, &loss_fn, None, &config).unwrap();
        let explicit = perturb(&batch, &loss_fn, Some(&predicted), &config).unwrap();
        assert_eq!(implicit, explicit);
    }
}

#[test]
fn test_result_is_detached_from_later_use() {
    let classifier = common::make_classifier(1, 3);
    let loss_fn = classifier.loss_fn(Mode::Eval);
    let batch = common::random_batch(2, 2, 24);
    let labels = common::labels(2, 3);
    let config = AttackConfig::iterative(4, 0.02, Norm::L2).with_budget(Budget {
        eps: 0.05,
        norm: Norm::L2,
    });

    let first = perturb(&batch, &loss_fn, Some(&labels), &config).unwrap();
    let mut scribbled = first.clone().into_inner();
    scribbled.fill(7.);
    let _ = classifier.forward(Batch::new(scribbled).view(), Mode::Eval).unwrap();

    let second = perturb(&batch, &loss_fn, Some(&labels), &config).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.shape(), batch.shape());
    let delta: Array3<f64> = first.into_inner() - batch.view();
    for point in delta.lanes(ndarray::Axis(2)) {
        assert!(point.dot(&point).sqrt() <= 0.05 + 1e-9);
    }
}
