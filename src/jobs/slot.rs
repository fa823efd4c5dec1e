use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use super::JobMessage;
use crate::error::ErrorKind;

struct RunningJob<T> {
    id: Uuid,
    started: Instant,
    rx: Receiver<JobMessage<T>>,
}

/// Either idle or holding the receiving end of the running job's channel.
pub(super) struct JobSlot<T> {
    running: Option<RunningJob<T>>,
}

impl<T> Default for JobSlot<T> {
    fn default() -> Self {
        Self { running: None }
    }
}

impl<T> JobSlot<T> {
    pub(super) fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    pub(super) fn running(&self) -> Option<(Uuid, Duration)> {
        self.running
            .as_ref()
            .map(|job| (job.id, job.started.elapsed()))
    }

    pub(super) fn occupy(&mut self, id: Uuid, rx: Receiver<JobMessage<T>>) {
        self.running = Some(RunningJob {
            id,
            started: Instant::now(),
            rx,
        });
    }

    /// Take the job's single message if it arrived, releasing the slot.
    ///
    /// A worker that hung up without sending is reported as a failure.
    pub(super) fn poll(&mut self) -> Option<(Uuid, JobMessage<T>)> {
        let job = self.running.as_ref()?;
        let message = match job.rx.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                warn!("Job {} exited without reporting a result", job.id);
                JobMessage::Failure {
                    kind: ErrorKind::WorkerLost,
                    message: "worker exited without reporting a result".to_string(),
                }
            }
        };
        let id = job.id;
        self.running = None;
        Some((id, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn slot_releases_after_message() {
        let mut slot = JobSlot::<u32>::default();
        let (tx, rx) = sync_channel(1);
        slot.occupy(Uuid::new_v4(), rx);
        assert!(slot.is_busy());
        assert!(slot.poll().is_none());
        tx.send(JobMessage::Success(7)).unwrap();
        let (_, message) = slot.poll().unwrap();
        assert!(matches!(message, JobMessage::Success(7)));
        assert!(!slot.is_busy());
        assert!(slot.poll().is_none());
    }

    #[test]
    fn dropped_sender_is_a_lost_worker() {
        let mut slot = JobSlot::<u32>::default();
        let (tx, rx) = sync_channel(1);
        slot.occupy(Uuid::new_v4(), rx);
        drop(tx);
        let (_, message) = slot.poll().unwrap();
        assert!(matches!(
            message,
            JobMessage::Failure {
                kind: ErrorKind::WorkerLost,
                ..
            }
        ));
        assert!(!slot.is_busy());
    }
}
