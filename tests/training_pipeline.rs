mod support;

use std::collections::HashSet;
use std::path::Path;

use bearing_diag::ErrorKind;
use bearing_diag::cache::{DiagnosticView, DiagnosticsCache};
use bearing_diag::dataset::{self, SampleWindow};
use bearing_diag::family::{FitParams, HyperParams, ModelFamily, SplitRatios};
use bearing_diag::ml::forest::ForestOptions;
use bearing_diag::pipeline::{self, PipelineContext, StageTracker, TrainingStage};
use bearing_diag::signal::SignalLoader;

use support::mat::{write_dataset, write_recording};

fn context(cache: &Path) -> PipelineContext {
    PipelineContext::new(SignalLoader::new("DE").unwrap(), DiagnosticsCache::new(cache), 2500)
}

fn small_forest() -> HyperParams {
    let mut params = ModelFamily::RandomForest.hyperparams();
    params.samples_per_class = 60;
    params.fit = FitParams::Forest(ForestOptions {
        n_trees: 12,
        max_depth: 8,
        ..ForestOptions::default()
    });
    params
}

#[test]
fn two_classes_of_two_hundred_split_sixty_twenty_twenty() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(&dir.path().join("data"), &["B007_0", "Normal_0"], 20_000);
    let mut params = ModelFamily::RandomForest.hyperparams();
    params.samples_per_class = 200;
    let prepared = pipeline::prepare(&context(&dir.path().join("cache")), &data, &params).unwrap();

    assert_eq!(prepared.classes, ["B007_0", "Normal_0"]);
    assert_eq!(prepared.train.class_counts(2), [120, 120]);
    assert_eq!(prepared.valid.class_counts(2), [40, 40]);
    assert_eq!(prepared.test.class_counts(2), [40, 40]);
    assert_eq!(
        prepared.train.len() + prepared.valid.len() + prepared.test.len(),
        400
    );
    assert_eq!(prepared.train.x.ncols(), 500);
    assert!(prepared.normalization.is_none());
}

#[test]
fn augmented_windows_never_share_a_partition() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(&dir.path().join("data"), &["B007_0", "Normal_0"], 1_000);
    let windows = dataset::build(&SignalLoader::new("DE").unwrap(), &data, 500, 100, true, 42).unwrap();
    for (label, class_windows) in &windows {
        let starts: HashSet<usize> = class_windows.iter().map(SampleWindow::start).collect();
        assert_eq!(starts.len(), 100, "{label} has repeated offsets");
    }

    let split = dataset::split(windows, &SplitRatios::new(0.6, 0.2, 0.2), 42).unwrap();
    let keys = |part: &[SampleWindow]| -> HashSet<(String, usize)> {
        part.iter()
            .map(|w| (w.label().to_string(), w.start()))
            .collect()
    };
    let (train, valid, test) = (keys(&split.train), keys(&split.valid), keys(&split.test));
    assert_eq!(train.len() + valid.len() + test.len(), 200);
    assert!(train.is_disjoint(&valid));
    assert!(train.is_disjoint(&test));
    assert!(valid.is_disjoint(&test));
}

#[test]
fn sequence_preparation_standardizes_train_only() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(&dir.path().join("data"), &["IR007_0", "Normal_0"], 30_000);
    let mut params = ModelFamily::Lstm.hyperparams();
    params.samples_per_class = 20;
    let prepared = pipeline::prepare(&context(&dir.path().join("cache")), &data, &params).unwrap();

    let state = prepared.normalization.as_ref().unwrap();
    assert_eq!(state.width(), 2048);
    let n = prepared.train.len() as f32;
    for col in [0usize, 777, 2047] {
        let column = prepared.train.x.column(col);
        let mean = column.sum() / n;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-3, "column {col} mean {mean}");
        assert!((var.sqrt() - 1.0).abs() < 1e-2, "column {col} std {}", var.sqrt());
    }
    assert_eq!(prepared.train.len(), 28);
    assert_eq!(prepared.valid.len(), 8);
    assert_eq!(prepared.test.len(), 4);
}

#[test]
fn forest_training_reports_and_renders_three_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(&dir.path().join("data"), &["B007_0", "IR007_0", "Normal_0"], 20_000);
    let ctx = context(&dir.path().join("cache"));
    let tracker = StageTracker::new();

    // Any file in the folder selects the whole folder.
    let result = pipeline::train(
        &ctx,
        ModelFamily::RandomForest,
        &data.join("IR007_0.mat"),
        &small_forest(),
        &tracker,
    )
    .unwrap();

    assert_eq!(tracker.stage(), TrainingStage::Done);
    assert_eq!(
        tracker.trail(),
        [
            TrainingStage::Preparing,
            TrainingStage::Fitting,
            TrainingStage::Evaluating,
            TrainingStage::Reporting,
            TrainingStage::Done,
        ]
    );
    assert!(result.history.is_none());
    assert!((0.0..=1.0).contains(&result.score));
    assert!(result.score > 0.8, "score {}", result.score);
    assert_eq!(result.classification().classes.len(), 3);
    assert_eq!(result.report.confusion.total(), 36);
    assert_eq!(result.diagnostics.len(), 3);
    for view in DiagnosticView::for_family(ModelFamily::RandomForest) {
        let path = ctx.cache.lookup(ModelFamily::RandomForest, view).unwrap();
        assert!(result.diagnostics.contains(&path));
    }
    assert!(ctx.cache.lookup(ModelFamily::RandomForest, DiagnosticView::Loss).is_err());
    assert_eq!(result.artifact.window_length(), 500);
    assert!(result.artifact.normalization().is_none());
}

#[test]
fn cnn_training_adds_learning_curves() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(&dir.path().join("data"), &["IR007_0", "Normal_0"], 30_000);
    let ctx = context(&dir.path().join("cache"));
    let mut params = ModelFamily::Cnn1d.hyperparams();
    params.samples_per_class = 10;
    if let FitParams::Network(options) = &mut params.fit {
        options.epochs = 2;
        options.batch_size = 4;
    }
    let tracker = StageTracker::new();
    let result = pipeline::train(&ctx, ModelFamily::Cnn1d, &data, &params, &tracker).unwrap();

    let history = result.history.as_ref().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(tracker.progress().epochs_done, 2);
    assert!(history.train_loss().iter().all(|loss| loss.is_finite()));
    assert_eq!(result.diagnostics.len(), 5);
    assert!(ctx.cache.lookup(ModelFamily::Cnn1d, DiagnosticView::Accuracy).is_ok());
    assert_eq!(result.artifact.normalization().unwrap().width(), 2048);
    assert_eq!(result.report.confusion.total(), 2);
}

#[test]
fn bad_inputs_fail_with_their_kind() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir.path().join("cache"));
    let tracker = StageTracker::new();

    let mut params = small_forest();
    params.split = SplitRatios::new(0.5, 0.2, 0.2);
    let data = write_dataset(&dir.path().join("data"), &["B007_0", "Normal_0"], 5_000);
    let err = pipeline::train(&ctx, ModelFamily::RandomForest, &data, &params, &tracker).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let short = dir.path().join("short");
    write_recording(&short.join("B007_0.mat"), 1, 5_000);
    write_recording(&short.join("Normal_0.mat"), 0, 540);
    let err = pipeline::train(&ctx, ModelFamily::RandomForest, &short, &small_forest(), &tracker)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);

    let empty = dir.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    let err = pipeline::train(&ctx, ModelFamily::RandomForest, &empty, &small_forest(), &tracker)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let forest_params_for_gru = small_forest();
    let err = pipeline::train(&ctx, ModelFamily::Gru, &data, &forest_params_for_gru, &tracker)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
