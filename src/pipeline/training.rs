//! Preparing, fitting, evaluating and reporting one model family.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use super::{PipelineContext, StageTracker, TrainingStage, resolve_data_folder};
use crate::artifact::ModelArtifact;
use crate::cache::DiagnosticView;
use crate::dataset::{self, NormalizationState, Partition, PreparedData};
use crate::error::Result;
use crate::family::{FitParams, HyperParams, ModelFamily};
use crate::ml::forest::ForestOptions;
use crate::ml::metrics::ClassificationReport;
use crate::ml::nn::{NetworkSpec, TrainedNetwork};
use crate::ml::{
    Classifier, EvaluationReport, ForestClassifier, NetworkClassifier, TrainingHistory,
};
use crate::plots;

/// Everything a finished training run hands back to the interactive layer.
#[derive(Debug)]
pub struct TrainingResult {
    pub artifact: ModelArtifact,
    pub report: EvaluationReport,
    /// Test-set accuracy.
    pub score: f32,
    /// Per-epoch curves, neural families only.
    pub history: Option<TrainingHistory>,
    /// Rendered diagnostic images, in [`DiagnosticView::ALL`] order.
    pub diagnostics: Vec<PathBuf>,
}

impl TrainingResult {
    pub fn family(&self) -> ModelFamily {
        self.artifact.family()
    }

    pub fn classification(&self) -> &ClassificationReport {
        &self.report.classification
    }
}

/// Build, split and (optionally) normalize the windows under `folder`.
///
/// The normalization state is fit on train only and then applied to every
/// partition.
pub fn prepare(ctx: &PipelineContext, folder: &Path, params: &HyperParams) -> Result<PreparedData> {
    let windows = dataset::build(
        &ctx.loader,
        folder,
        params.window_length,
        params.samples_per_class,
        params.augment,
        params.seed,
    )?;
    let split = dataset::split(windows, &params.split, params.seed)?;
    let classes = split.classes.clone();
    let mut train = Partition::from_windows(&split.train, &classes)?;
    let mut valid = Partition::from_windows(&split.valid, &classes)?;
    let mut test = Partition::from_windows(&split.test, &classes)?;

    let normalization = if params.normalize {
        let state = NormalizationState::fit(&train.x)?;
        for partition in [&mut train, &mut valid, &mut test] {
            if !partition.is_empty() {
                state.apply_in_place(&mut partition.x)?;
            }
        }
        Some(state)
    } else {
        None
    };
    info!(
        "Prepared {} classes: train {}, valid {}, test {}",
        classes.len(),
        train.len(),
        valid.len(),
        test.len()
    );
    Ok(PreparedData {
        classes,
        train,
        valid,
        test,
        normalization,
    })
}

fn fit_forest(data: &PreparedData, options: &ForestOptions, seed: u64) -> Result<ForestClassifier> {
    let options = ForestOptions {
        seed,
        ..options.clone()
    };
    ForestClassifier::fit(&data.classes, &data.train, &options)
}

/// Train `family` on the recordings at `data_path` with `params`.
///
/// Stage transitions are published on `tracker`; the returned artifact is not
/// written anywhere, callers decide where to save it.
pub fn train(
    ctx: &PipelineContext,
    family: ModelFamily,
    data_path: &Path,
    params: &HyperParams,
    tracker: &StageTracker,
) -> Result<TrainingResult> {
    params.validate_for(family)?;
    let started = Instant::now();

    tracker.enter(TrainingStage::Preparing);
    let folder = resolve_data_folder(data_path)?;
    info!("Training {family} on {}", folder.display());
    let data = prepare(ctx, &folder, params)?;

    tracker.enter(TrainingStage::Fitting);
    let (artifact, report, history) = match &params.fit {
        FitParams::Forest(options) => {
            let forest = fit_forest(&data, options, params.seed)?;
            tracker.enter(TrainingStage::Evaluating);
            let report = forest.evaluate(&data.test)?;
            let artifact = ModelArtifact::from_forest(forest, Some(report.score));
            (artifact, report, None)
        }
        FitParams::Network(options) => {
            let spec = NetworkSpec {
                family,
                window_length: params.window_length,
                n_classes: data.classes.len(),
            };
            let (network, history) = TrainedNetwork::train(
                &spec,
                &data.train,
                &data.valid,
                options,
                params.seed,
                |stats| tracker.epoch_finished(stats.epoch),
            )?;
            tracker.enter(TrainingStage::Evaluating);
            let classifier = NetworkClassifier::new(spec, data.classes.clone(), network);
            let report = classifier.evaluate(&data.test)?;
            let artifact =
                ModelArtifact::from_network(classifier, data.normalization.clone(), Some(report.score));
            (artifact, report, Some(history))
        }
    };
    debug!("{family} test accuracy {:.4}", report.score);

    tracker.enter(TrainingStage::Reporting);
    let diagnostics = write_diagnostics(ctx, family, &report, history.as_ref())?;

    tracker.enter(TrainingStage::Done);
    info!(
        "Trained {family} in {:.1}s, test accuracy {:.4}",
        started.elapsed().as_secs_f32(),
        report.score
    );
    Ok(TrainingResult {
        artifact,
        score: report.score,
        report,
        history,
        diagnostics,
    })
}

/// Render every diagnostic that applies to `family` into the cache.
fn write_diagnostics(
    ctx: &PipelineContext,
    family: ModelFamily,
    report: &EvaluationReport,
    history: Option<&TrainingHistory>,
) -> Result<Vec<PathBuf>> {
    ctx.cache.ensure()?;
    let mut written = Vec::new();
    for view in DiagnosticView::for_family(family) {
        let path = ctx.cache.diagnostic_path(family, view);
        match (view, history) {
            (DiagnosticView::ConfusionMatrix, _) => {
                plots::render_confusion_matrix(&report.confusion, &path)?
            }
            (DiagnosticView::RocCurves, _) => plots::render_roc_curves(&report.curves, &path)?,
            (DiagnosticView::PrecisionRecallCurves, _) => {
                plots::render_precision_recall_curves(&report.curves, &path)?
            }
            (DiagnosticView::Loss, Some(history)) => plots::render_loss_curves(history, &path)?,
            (DiagnosticView::Accuracy, Some(history)) => {
                plots::render_accuracy_curves(history, &path)?
            }
            (DiagnosticView::Loss | DiagnosticView::Accuracy, None) => continue,
        }
        written.push(path);
    }
    Ok(written)
}
