//! Task queue and worker dispatch.
//!
//! Both triggers (the upload event and the retention timer) enqueue units
//! of work here instead of doing it inline in request handling. The
//! dispatcher drains the channel and runs each task on its own tokio task
//! under a worker-count semaphore; stages for different meetings run fully in
//! parallel, while within one meeting the orchestrator's persisted-status CAS
//! keeps stages strictly sequential. Handlers tolerate duplicate delivery, so
//! losing or re-running a task is safe.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

use super::Orchestrator;
use crate::publish::Publisher;
use crate::retention::RetentionSweeper;

/// A unit of work on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Run (or resume) the processing pipeline for one meeting.
    Process(i64),
    /// One retention sweep pass over all expired audio payloads.
    Sweep,
    PublishWiki(i64),
    PublishChat(i64),
}

/// Cloneable enqueue handle.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Task>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Task>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn enqueue(&self, task: Task) -> Result<()> {
        self.tx
            .send(task)
            .await
            .context("Task queue is closed")
    }
}

/// Drains the queue and runs tasks on the worker pool.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    sweeper: Arc<RetentionSweeper>,
    publisher: Arc<Publisher>,
    workers: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        sweeper: Arc<RetentionSweeper>,
        publisher: Arc<Publisher>,
        workers: usize,
    ) -> Self {
        Self {
            orchestrator,
            sweeper,
            publisher,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<Task>) {
        info!(
            "Task dispatcher running with {} workers",
            self.workers.available_permits()
        );

        while let Some(task) = rx.recv().await {
            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed, shutting down
            };

            let orchestrator = self.orchestrator.clone();
            let sweeper = self.sweeper.clone();
            let publisher = self.publisher.clone();

            tokio::spawn(async move {
                let _permit = permit;
                match task {
                    Task::Process(id) => {
                        if let Err(e) = orchestrator.process(id).await {
                            error!("Processing meeting {id} failed: {e}");
                        }
                    }
                    Task::Sweep => match sweeper.sweep().await {
                        Ok(outcome) => info!(
                            "Retention sweep done: {} cleared, {} failed",
                            outcome.cleared, outcome.failed
                        ),
                        Err(e) => error!("Retention sweep failed: {e}"),
                    },
                    Task::PublishWiki(id) => {
                        if let Err(e) = publisher.publish_wiki(id).await {
                            error!("Wiki publish for meeting {id} failed: {e}");
                        }
                    }
                    Task::PublishChat(id) => {
                        if let Err(e) = publisher.publish_chat(id).await {
                            error!("Chat publish for meeting {id} failed: {e}");
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_receive_in_order() {
        let (queue, mut rx) = TaskQueue::new(8);
        queue.enqueue(Task::Process(1)).await.unwrap();
        queue.enqueue(Task::Sweep).await.unwrap();
        queue.enqueue(Task::PublishWiki(1)).await.unwrap();

        assert_eq!(rx.recv().await, Some(Task::Process(1)));
        assert_eq!(rx.recv().await, Some(Task::Sweep));
        assert_eq!(rx.recv().await, Some(Task::PublishWiki(1)));
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped_errors() {
        let (queue, rx) = TaskQueue::new(1);
        drop(rx);
        assert!(queue.enqueue(Task::Sweep).await.is_err());
    }
}
