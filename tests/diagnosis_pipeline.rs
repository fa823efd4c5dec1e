mod support;

use std::path::{Path, PathBuf};

use bearing_diag::ErrorKind;
use bearing_diag::artifact::ModelArtifact;
use bearing_diag::cache::DiagnosticsCache;
use bearing_diag::family::{FitParams, ModelFamily};
use bearing_diag::ml::forest::ForestOptions;
use bearing_diag::pipeline::{self, PipelineContext, StageTracker};
use bearing_diag::signal::SignalLoader;

use support::mat::{write_dataset, write_mat, write_recording};

const CLASSES: [&str; 2] = ["IR007_0", "Normal_0"];

fn context(cache: &Path) -> PipelineContext {
    PipelineContext::new(SignalLoader::new("DE").unwrap(), DiagnosticsCache::new(cache), 2500)
}

fn train_and_save(dir: &Path, family: ModelFamily) -> PathBuf {
    let data = write_dataset(&dir.join("data"), &CLASSES, 30_000);
    let mut params = family.hyperparams();
    match &mut params.fit {
        FitParams::Forest(options) => {
            params.samples_per_class = 50;
            *options = ForestOptions {
                n_trees: 10,
                ..ForestOptions::default()
            };
        }
        FitParams::Network(options) => {
            params.samples_per_class = 10;
            options.epochs = 1;
            options.batch_size = 8;
        }
    }
    let ctx = context(&dir.join("cache"));
    let result = pipeline::train(&ctx, family, &data, &params, &StageTracker::new()).unwrap();
    result.artifact.save_in_dir(&dir.join("models")).unwrap()
}

#[test]
fn forest_diagnosis_is_deterministic_and_labels_the_class() {
    let dir = tempfile::tempdir().unwrap();
    let model = train_and_save(dir.path(), ModelFamily::RandomForest);
    assert_eq!(model.file_name().unwrap(), "random_forest.forest");
    let signal = dir.path().join("incoming").join("unknown.mat");
    write_recording(&signal, 0, 12_000);

    let loader = SignalLoader::new("DE").unwrap();
    let first = pipeline::diagnose(&loader, &model, &signal).unwrap();
    let second = pipeline::diagnose(&loader, &model, &signal).unwrap();
    assert_eq!(first.labels.len(), 500);
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.majority, "IR007_0");
    assert_eq!(first.family, ModelFamily::RandomForest);
    assert_eq!(first.counts.values().sum::<usize>(), 500);
}

#[test]
fn network_diagnosis_uses_stored_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let model = train_and_save(dir.path(), ModelFamily::Cnn1d);
    assert_eq!(model.file_name().unwrap(), "1D_CNN.network");
    let signal = dir.path().join("unknown.mat");
    write_recording(&signal, 1, 2_547);

    let loader = SignalLoader::new("DE").unwrap();
    let first = pipeline::diagnose(&loader, &model, &signal).unwrap();
    let second = pipeline::diagnose(&loader, &model, &signal).unwrap();
    assert_eq!(first.labels.len(), 500);
    assert_eq!(first, second);
    assert!(CLASSES.contains(&first.majority.as_str()));

    write_recording(&signal, 1, 2_546);
    let err = pipeline::diagnose(&loader, &model, &signal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
}

#[test]
fn recurrent_models_train_save_and_diagnose() {
    for family in [ModelFamily::Lstm, ModelFamily::Gru] {
        let dir = tempfile::tempdir().unwrap();
        let model = train_and_save(dir.path(), family);
        assert_eq!(
            model.file_name().unwrap().to_string_lossy(),
            family.default_artifact_file_name()
        );
        let artifact = ModelArtifact::load(&model).unwrap();
        assert_eq!(artifact.family(), family);
        assert_eq!(artifact.window_length(), 2048);
        assert_eq!(artifact.normalization().unwrap().width(), 2048);

        let signal = dir.path().join("unknown.mat");
        write_recording(&signal, 0, 4_000);
        let result = pipeline::diagnose(&SignalLoader::new("DE").unwrap(), &model, &signal).unwrap();
        assert_eq!(result.family, family);
        assert_eq!(result.labels.len(), 500);
        assert_eq!(result.counts.values().sum::<usize>(), 500);
        assert!(CLASSES.contains(&result.majority.as_str()));
    }
}

#[test]
fn suffix_that_contradicts_the_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let model = train_and_save(dir.path(), ModelFamily::RandomForest);
    let renamed = dir.path().join("models").join("random_forest.network");
    std::fs::copy(&model, &renamed).unwrap();
    let signal = dir.path().join("unknown.mat");
    write_recording(&signal, 0, 5_000);

    let err = pipeline::diagnose(&SignalLoader::new("DE").unwrap(), &renamed, &signal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactLoad);
}

#[test]
fn unreadable_inputs_map_to_their_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let model = train_and_save(dir.path(), ModelFamily::RandomForest);
    let loader = SignalLoader::new("DE").unwrap();

    let fan_only = dir.path().join("fan.mat");
    write_mat(&fan_only, &[("X100_FE_time", vec![0.5; 2_000])]);
    let err = pipeline::diagnose(&loader, &model, &fan_only).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let corrupt = dir.path().join("corrupt.forest");
    let mut bytes = std::fs::read(&model).unwrap();
    bytes.truncate(bytes.len() / 2);
    std::fs::write(&corrupt, bytes).unwrap();
    let signal = dir.path().join("unknown.mat");
    write_recording(&signal, 0, 5_000);
    let err = pipeline::diagnose(&loader, &corrupt, &signal).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArtifactLoad);
}
