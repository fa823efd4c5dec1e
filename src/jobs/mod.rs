//! Background execution of training and diagnosis.
//!
//! Each submission spawns one worker and one `sync_channel(1)`; the worker
//! sends exactly one [`JobMessage`] and exits. The interactive thread calls
//! [`JobScheduler::dispatch`] from its event loop to hand finished messages
//! to a [`JobListener`]. One job per kind may run at a time.

mod executor;
mod slot;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::sync_channel;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

pub use executor::{Job, JobExecutor, ThreadExecutor};
use slot::JobSlot;

use crate::error::{ErrorKind, PipelineError, Result};
use crate::family::{HyperParams, ModelFamily};
use crate::pipeline::{
    self, DiagnosisResult, PipelineContext, StageTracker, TrainingProgress, TrainingResult,
    require_file, resolve_data_folder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Training,
    Diagnosis,
}

impl JobKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Diagnosis => "diagnosis",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single message a job sends back.
#[derive(Debug)]
pub enum JobMessage<T> {
    Success(T),
    Failure { kind: ErrorKind, message: String },
}

impl<T> JobMessage<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Receives completed jobs on the interactive thread.
pub trait JobListener {
    fn on_training_complete(&mut self, message: JobMessage<TrainingResult>);
    fn on_diagnosis_complete(&mut self, message: JobMessage<DiagnosisResult>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running {
        id: Uuid,
        elapsed: Duration,
        /// Training runs only.
        progress: Option<TrainingProgress>,
    },
}

/// Owns one slot per job kind and spawns workers through an executor.
pub struct JobScheduler {
    ctx: PipelineContext,
    seed: u64,
    executor: Arc<dyn JobExecutor>,
    training: JobSlot<TrainingResult>,
    training_tracker: StageTracker,
    diagnosis: JobSlot<DiagnosisResult>,
}

impl JobScheduler {
    pub fn new(ctx: PipelineContext, seed: u64) -> Self {
        Self::with_executor(ctx, seed, Arc::new(ThreadExecutor))
    }

    pub fn with_executor(ctx: PipelineContext, seed: u64, executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            ctx,
            seed,
            executor,
            training: JobSlot::default(),
            training_tracker: StageTracker::new(),
            diagnosis: JobSlot::default(),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Train `family` with its fixed policy on the folder at (or containing) `data_path`.
    pub fn submit_training(&mut self, family: ModelFamily, data_path: &Path) -> Result<Uuid> {
        let mut params = family.hyperparams();
        params.seed = self.seed;
        self.submit_training_with(family, data_path, params)
    }

    /// Like [`JobScheduler::submit_training`] with explicit hyperparameters.
    pub fn submit_training_with(
        &mut self,
        family: ModelFamily,
        data_path: &Path,
        params: HyperParams,
    ) -> Result<Uuid> {
        if self.training.is_busy() {
            return Err(PipelineError::Busy(JobKind::Training.as_str()));
        }
        params.validate_for(family)?;
        let folder = resolve_data_folder(data_path)?;

        let id = Uuid::new_v4();
        let (tx, rx) = sync_channel(1);
        let ctx = self.ctx.clone();
        let tracker = StageTracker::new();
        let worker_tracker = tracker.clone();
        let job: Job = Box::new(move || {
            let result = pipeline::train(&ctx, family, &folder, &params, &worker_tracker);
            let _ = tx.send(JobMessage::from_result(result));
        });
        self.executor.spawn(format!("train-{}", family.model_name()), job)?;
        self.training.occupy(id, rx);
        self.training_tracker = tracker;
        info!("Submitted {family} training job {id}");
        Ok(id)
    }

    /// Diagnose `signal_path` with the saved model at `model_path`.
    pub fn submit_diagnosis(&mut self, model_path: &Path, signal_path: &Path) -> Result<Uuid> {
        if self.diagnosis.is_busy() {
            return Err(PipelineError::Busy(JobKind::Diagnosis.as_str()));
        }
        require_file(model_path, "model file")?;
        require_file(signal_path, "signal file")?;

        let id = Uuid::new_v4();
        let (tx, rx) = sync_channel(1);
        let loader = self.ctx.loader.clone();
        let model_path: PathBuf = model_path.to_path_buf();
        let signal_path: PathBuf = signal_path.to_path_buf();
        let job: Job = Box::new(move || {
            let result = pipeline::diagnose(&loader, &model_path, &signal_path);
            let _ = tx.send(JobMessage::from_result(result));
        });
        self.executor.spawn("diagnose".to_string(), job)?;
        self.diagnosis.occupy(id, rx);
        info!("Submitted diagnosis job {id}");
        Ok(id)
    }

    pub fn status(&self, kind: JobKind) -> JobStatus {
        let (running, progress) = match kind {
            JobKind::Training => (
                self.training.running(),
                Some(self.training_tracker.progress()),
            ),
            JobKind::Diagnosis => (self.diagnosis.running(), None),
        };
        match running {
            Some((id, elapsed)) => JobStatus::Running {
                id,
                elapsed,
                progress,
            },
            None => JobStatus::Idle,
        }
    }

    pub fn is_busy(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Training => self.training.is_busy(),
            JobKind::Diagnosis => self.diagnosis.is_busy(),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.training.is_busy() && !self.diagnosis.is_busy()
    }

    /// Deliver every finished job to `listener`; returns how many were delivered.
    ///
    /// Never blocks. Slots are released before the listener runs, so the
    /// listener may submit follow-up jobs.
    pub fn dispatch(&mut self, listener: &mut impl JobListener) -> usize {
        let mut delivered = 0;
        if let Some((id, message)) = self.training.poll() {
            log_completion(JobKind::Training, id, &message);
            listener.on_training_complete(message);
            delivered += 1;
        }
        if let Some((id, message)) = self.diagnosis.poll() {
            log_completion(JobKind::Diagnosis, id, &message);
            listener.on_diagnosis_complete(message);
            delivered += 1;
        }
        delivered
    }
}

fn log_completion<T>(kind: JobKind, id: Uuid, message: &JobMessage<T>) {
    match message {
        JobMessage::Success(_) => info!("{kind} job {id} finished"),
        JobMessage::Failure { kind: error, message } => {
            warn!("{kind} job {id} failed ({error:?}): {message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiagnosticsCache;
    use crate::signal::SignalLoader;
    use std::sync::Mutex;

    /// Holds jobs until the test runs them.
    #[derive(Default)]
    struct HeldExecutor {
        jobs: Mutex<Vec<Job>>,
    }

    impl HeldExecutor {
        fn run_all(&self) {
            let jobs: Vec<Job> = self.jobs.lock().unwrap().drain(..).collect();
            for job in jobs {
                job();
            }
        }

        fn drop_all(&self) {
            self.jobs.lock().unwrap().clear();
        }
    }

    impl JobExecutor for HeldExecutor {
        fn spawn(&self, _name: String, job: Job) -> Result<()> {
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        diagnoses: Vec<JobMessage<DiagnosisResult>>,
    }

    impl JobListener for Recorder {
        fn on_training_complete(&mut self, _message: JobMessage<TrainingResult>) {}

        fn on_diagnosis_complete(&mut self, message: JobMessage<DiagnosisResult>) {
            self.diagnoses.push(message);
        }
    }

    fn scheduler(dir: &Path, executor: Arc<HeldExecutor>) -> JobScheduler {
        let ctx = PipelineContext::new(
            SignalLoader::new("DE").unwrap(),
            DiagnosticsCache::new(dir.join("cache")),
            2500,
        );
        JobScheduler::with_executor(ctx, 42, executor)
    }

    #[test]
    fn missing_inputs_fail_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(HeldExecutor::default());
        let mut jobs = scheduler(dir.path(), executor.clone());
        let err = jobs
            .submit_diagnosis(&dir.path().join("x.forest"), &dir.path().join("s.mat"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        let err = jobs
            .submit_training(ModelFamily::Gru, &dir.path().join("nowhere"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(jobs.is_idle());
        assert!(executor.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn second_diagnosis_is_busy_until_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("m.forest");
        let signal = dir.path().join("s.mat");
        std::fs::write(&model, b"{}").unwrap();
        std::fs::write(&signal, b"").unwrap();
        let executor = Arc::new(HeldExecutor::default());
        let mut jobs = scheduler(dir.path(), executor.clone());

        jobs.submit_diagnosis(&model, &signal).unwrap();
        assert!(matches!(
            jobs.status(JobKind::Diagnosis),
            JobStatus::Running { progress: None, .. }
        ));
        let err = jobs.submit_diagnosis(&model, &signal).unwrap_err();
        assert!(matches!(err, PipelineError::Busy("diagnosis")));

        let mut listener = Recorder::default();
        assert_eq!(jobs.dispatch(&mut listener), 0);
        executor.run_all();
        assert_eq!(jobs.dispatch(&mut listener), 1);
        assert!(matches!(
            listener.diagnoses[0],
            JobMessage::Failure {
                kind: ErrorKind::ArtifactLoad,
                ..
            }
        ));
        assert_eq!(jobs.status(JobKind::Diagnosis), JobStatus::Idle);
        assert!(jobs.submit_diagnosis(&model, &signal).is_ok());
    }

    #[test]
    fn dropped_job_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("m.network");
        let signal = dir.path().join("s.mat");
        std::fs::write(&model, b"{}").unwrap();
        std::fs::write(&signal, b"").unwrap();
        let executor = Arc::new(HeldExecutor::default());
        let mut jobs = scheduler(dir.path(), executor.clone());
        jobs.submit_diagnosis(&model, &signal).unwrap();
        executor.drop_all();
        let mut listener = Recorder::default();
        assert_eq!(jobs.dispatch(&mut listener), 1);
        assert!(matches!(
            listener.diagnoses[0],
            JobMessage::Failure {
                kind: ErrorKind::WorkerLost,
                ..
            }
        ));
        assert!(jobs.is_idle());
    }
}
