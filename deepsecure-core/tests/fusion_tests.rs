use deepsecure_core::{CoreError, DetectionMethod, EnsembleWeights, PredictionRecord, fuse};

#[test]
fn test_fusion_is_order_independent() {
    let weights = EnsembleWeights::default();
    let records = vec![
        PredictionRecord::scored("faceforensics", 0.9),
        PredictionRecord::failed("dfdc", "backend error"),
        PredictionRecord::scored("celebdf", 0.3),
        PredictionRecord::scored("extra", 0.6),
    ];
    let mut reversed = records.clone();
    reversed.reverse();

    let a = fuse(records, &weights).unwrap();
    let b = fuse(reversed, &weights).unwrap();
    // (0.9 * 0.4 + 0.3 * 0.2 + 0.6 * 1.0) / 1.6
    assert!((a.fake_probability - 0.6375).abs() < 1e-12);
    assert!((a.fake_probability - b.fake_probability).abs() < 1e-12);
}

#[test]
fn test_all_failed_predictions_are_rejected() {
    let records = vec![
        PredictionRecord::failed("faceforensics", "oom"),
        PredictionRecord::failed("dfdc", "oom"),
    ];
    assert!(matches!(
        fuse(records, &EnsembleWeights::default()),
        Err(CoreError::NoValidPredictions)
    ));
}

#[test]
fn test_decision_boundary_is_strict() {
    let weights = EnsembleWeights::uniform();
    let at = fuse(vec![PredictionRecord::scored("a", 0.5)], &weights).unwrap();
    let above = fuse(vec![PredictionRecord::scored("a", 0.5000001)], &weights).unwrap();
    assert!(!at.is_fake);
    assert!(above.is_fake);
    assert_eq!(at.detection_method, DetectionMethod::Ensemble);
}

#[test]
fn test_custom_weights_from_string() {
    let weights: EnsembleWeights = "a=3,b=1".parse().unwrap();
    let result = fuse(
        vec![PredictionRecord::scored("a", 1.0), PredictionRecord::scored("b", 0.0)],
        &weights,
    )
    .unwrap();
    assert!((result.fake_probability - 0.75).abs() < 1e-12);
}
