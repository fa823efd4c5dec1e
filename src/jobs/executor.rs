use std::thread;

use crate::error::{PipelineError, Result};

/// Work handed to an executor; it reports through its own channel.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where submitted jobs run.
pub trait JobExecutor: Send + Sync {
    fn spawn(&self, name: String, job: Job) -> Result<()>;
}

/// One fresh, detached OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl JobExecutor for ThreadExecutor {
    fn spawn(&self, name: String, job: Job) -> Result<()> {
        thread::Builder::new()
            .name(name.clone())
            .spawn(job)
            .map(|_| ())
            .map_err(|source| spawn_error(name, source))
    }
}

fn spawn_error(name: String, source: std::io::Error) -> PipelineError {
    PipelineError::Spawn { name, source }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn refused_spawn_is_an_io_failure() {
        let err = spawn_error(
            "training-1".into(),
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "thread limit reached"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("training-1"));
    }

    #[test]
    fn thread_executor_runs_the_job() {
        let (tx, rx) = mpsc::channel();
        ThreadExecutor
            .spawn(
                "unit-job".into(),
                Box::new(move || {
                    let name = std::thread::current().name().map(str::to_string);
                    let _ = tx.send(name);
                }),
            )
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("unit-job"));
    }
}
