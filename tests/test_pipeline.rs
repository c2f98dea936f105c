//! Integration test: pipelines built from the bundled stages

mod common;

use common::blobs;
use kolosal_tune::cli::{demo_pipeline, synthetic_dataset};
use kolosal_tune::prelude::*;
use ndarray::{array, Array2};

#[test]
fn test_demo_pipeline_fits_and_predicts() {
    let dataset = synthetic_dataset(100, 3).unwrap();
    let mut pipeline = demo_pipeline(3).unwrap();
    pipeline.fit(dataset.x(), dataset.y()).unwrap();

    let predicted = pipeline.predict(dataset.x()).unwrap();
    assert_eq!(predicted.len(), 100);
    assert!(predicted.iter().all(|&p| p == 0.0 || p == 1.0));
    assert_eq!(pipeline.n_features_in(), Some(6));

    let score = pipeline.score(dataset.x(), dataset.y()).unwrap();
    assert!(score > 0.7, "training accuracy too low: {}", score);
}

#[test]
fn test_demo_pipeline_parameter_surface() {
    let pipeline = demo_pipeline(0).unwrap();
    let names = pipeline.param_names();
    for expected in [
        "scaler__with_mean",
        "variance__threshold",
        "sampler__sampling_strategy",
        "pca__n_components",
        "knn__n_neighbors",
        "knn__weights",
    ] {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }

    let params = pipeline.get_params();
    assert_eq!(params["pca__n_components"], ParamValue::Int(2));
    assert_eq!(params["knn__n_neighbors"], ParamValue::Int(5));
}

#[test]
fn test_variance_stage_drops_constant_column() {
    let x = array![[1.0, 7.0, 0.0], [2.0, 7.0, 1.0], [3.0, 7.0, 0.0], [4.0, 7.0, 1.0]];
    let y = array![0.0, 0.0, 1.0, 1.0];
    let mut pipeline = Pipeline::builder()
        .step("variance", Stage::transformer(VarianceThreshold::default()))
        .step("knn", Stage::estimator(KNNClassifier::with_k(1)))
        .build()
        .unwrap();
    pipeline.fit(&x, &y).unwrap();

    let reduced = pipeline.transform(&x).unwrap();
    assert_eq!(reduced.ncols(), 2);
    assert_eq!(pipeline.step("knn").unwrap().n_features_in(), Some(2));
}

#[test]
fn test_smote_and_undersampling_in_chain() {
    let mut x = Array2::zeros((24, 2));
    let mut y = ndarray::Array1::zeros(24);
    for i in 0..24 {
        let minority = i >= 20;
        let base = if minority { 8.0 } else { 0.0 };
        x[[i, 0]] = base + (i % 4) as f64 * 0.2;
        x[[i, 1]] = base + (i % 3) as f64 * 0.2;
        y[i] = if minority { 1.0 } else { 0.0 };
    }

    for sampler in [
        Stage::resampler(SMOTE::new().with_k_neighbors(2).with_seed(5)),
        Stage::resampler(RandomUnderSampler::new().with_seed(5)),
    ] {
        let mut pipeline = Pipeline::builder()
            .step("scaler", Stage::transformer(MinMaxScaler::new()))
            .step("sampler", sampler)
            .step("knn", Stage::estimator(KNNClassifier::with_k(3)))
            .build()
            .unwrap();
        pipeline.fit(&x, &y).unwrap();
        // resamplers never run at inference
        assert_eq!(pipeline.predict(&x).unwrap(), y);
    }
}

#[test]
fn test_pca_reduces_before_estimator() {
    let (x, y) = blobs(10);
    let mut pipeline = Pipeline::builder()
        .step("scaler", Stage::transformer(StandardScaler::new()))
        .step("pca", Stage::transformer(Pca::new(1)))
        .step("knn", Stage::estimator(KNNClassifier::with_k(1)))
        .build()
        .unwrap();
    pipeline.fit(&x, &y).unwrap();
    assert_eq!(pipeline.transform(&x).unwrap().ncols(), 1);
    assert_eq!(pipeline.score(&x, &y).unwrap(), 1.0);

    pipeline.set_param("pca__n_components", &ParamValue::Int(3)).unwrap();
    assert!(pipeline.fit(&x, &y).is_err());
}

#[test]
fn test_clones_do_not_share_fitted_state() {
    let dataset = synthetic_dataset(60, 9).unwrap();
    let template = demo_pipeline(9).unwrap();
    let mut first = template.clone_box();
    let mut second = template.clone_box();

    first.fit(dataset.x(), dataset.y()).unwrap();
    assert_eq!(first.n_features_in(), Some(6));
    assert_eq!(second.n_features_in(), None);
    assert!(matches!(second.predict(dataset.x()), Err(KolosalError::ModelNotFitted)));
    assert!(!template.is_fitted());
    assert_eq!(template.n_features_in(), None);

    // refitting one sibling on a narrower matrix leaves the other intact
    second.fit(dataset.x(), dataset.y()).unwrap();
    let narrow = dataset.x().slice(ndarray::s![.., 0..5]).to_owned();
    first.fit(&narrow, dataset.y()).unwrap();
    assert_eq!(first.n_features_in(), Some(5));
    assert_eq!(second.n_features_in(), Some(6));
    assert_eq!(second.predict(dataset.x()).unwrap().len(), 60);
    assert!(!template.is_fitted());
}

#[test]
fn test_invalid_value_is_configuration_error() {
    let mut pipeline = demo_pipeline(0).unwrap();
    let err = pipeline
        .set_param("knn__weights", &ParamValue::Str("gaussian".to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = pipeline.set_param("knn__n_neighbors", &ParamValue::Int(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
