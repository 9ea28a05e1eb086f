use log::LevelFilter;
use ndarray::{concatenate, Array3, Axis};
use pcadv_rs::attack::{AttackConfig, Norm};
use pcadv_rs::batch::Batch;
use pcadv_rs::config::PipelineConfig;
use pcadv_rs::defense::DefenseConfig;
use pcadv_rs::logging::init_console_logger;
use pcadv_rs::model::Mode;
use pcadv_rs::pipeline::Pipeline;
use pcadv_rs::record::AttackRecord;

mod common;

#[test]
fn test_pipeline_end_to_end() {
    init_console_logger(LevelFilter::Info).unwrap();

    let num_classes = 4;
    let classifier = common::make_classifier(17, num_classes);
    let clean = common::random_batch(5, 6, 24);
    // A far-off point in every cloud gives the defense something to remove.
    let spikes = Array3::from_elem((6, 1, 3), 25.);
    let batch = Batch::new(concatenate(Axis(1), &[clean.view(), spikes.view()]).unwrap());
    let labels = common::labels(6, num_classes);

    let config = PipelineConfig {
        attack: AttackConfig::iterative(3, 0.05, Norm::L2),
        defense: Some(DefenseConfig {
            top_k: 4,
            num_std: 1.,
        }),
        mode: Mode::Eval,
        record_limit: None,
    };
    let outcome = Pipeline::new(config).run(&classifier, &batch, &labels).unwrap();

    assert_eq!(outcome.clean_predictions.len(), 6);
    assert_eq!(outcome.defended_predictions.as_ref().map(|p| p.len()), Some(6));
    for acc in [
        outcome.clean_accuracy,
        outcome.adversarial_accuracy,
        outcome.defended_accuracy.unwrap(),
    ] {
        assert!((0. ..=1.).contains(&acc));
    }

    let report = outcome.feature_shift(num_classes).unwrap();
    assert_eq!(report.per_class_l2_change.len(), num_classes);
    assert!(report.mean_l2_change > 0.);
    let pairs = outcome.class_pair_distances(num_classes).unwrap();
    assert_eq!(pairs.change().dim(), (num_classes, num_classes));

    let json = outcome.record.to_json().unwrap();
    let record = AttackRecord::from_json(&json).unwrap();
    assert_eq!(record, outcome.record);
    assert_eq!(record.labels, labels);
}
