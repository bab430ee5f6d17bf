//! Bounded email job queue drained by a fixed worker pool.
//!
//! Submission waits at most `submit_timeout` for room in the channel and
//! then fails with [`AuthError::QueueSaturated`]. Workers never retry; a
//! failed delivery is reported to `tracing` and the log pipeline. Jobs still
//! queued at shutdown are abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ticketing_logging::LogSink;

use super::jobs::{EmailComposer, EmailJob};
use super::service::Mailer;
use crate::error::{AuthError, Result};
use crate::tokens::verification_code;

#[derive(Debug, Clone)]
pub struct EmailQueueConfig {
    pub capacity: usize,
    pub workers: usize,
    pub submit_timeout: Duration,
}

impl Default for EmailQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            workers: 5,
            submit_timeout: Duration::from_millis(100),
        }
    }
}

impl EmailQueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: std::env::var("EMAIL_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.workers),
            ..defaults
        }
    }
}

/// Clonable submit handle; every clone feeds the same workers.
#[derive(Clone)]
pub struct EmailQueue {
    sender: mpsc::Sender<EmailJob>,
    submit_timeout: Duration,
    cancel: CancellationToken,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl EmailQueue {
    /// Spawn the worker pool on the current runtime.
    pub fn start(
        config: EmailQueueConfig,
        mailer: Arc<dyn Mailer>,
        composer: Arc<EmailComposer>,
        log: Option<LogSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let handles = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&mailer),
                    Arc::clone(&composer),
                    log.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers.max(1),
            capacity = config.capacity,
            "Email queue started"
        );

        Self {
            sender,
            submit_timeout: config.submit_timeout,
            cancel,
            workers: Arc::new(Mutex::new(handles)),
        }
    }

    pub async fn submit(&self, job: EmailJob) -> Result<()> {
        match self.sender.send_timeout(job, self.submit_timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(job)) => {
                tracing::warn!(
                    kind = job.kind_name(),
                    timeout_ms = self.submit_timeout.as_millis() as u64,
                    "Email queue saturated"
                );
                Err(AuthError::QueueSaturated)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(AuthError::Internal("Email queue is shut down".to_string()))
            }
        }
    }

    /// Generate a verification code and enqueue its delivery.
    ///
    /// The code is returned once the job is queued; delivery is not awaited.
    pub async fn send_verification(&self, recipient: &str, username: &str) -> Result<String> {
        let code = verification_code()?;
        self.submit(EmailJob::verification(recipient, username, &code))
            .await?;
        Ok(code)
    }

    /// Stop the workers and wait for in-flight jobs to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Email worker failed");
            }
        }
        tracing::info!("Email queue stopped");
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<EmailJob>>>,
    mailer: Arc<dyn Mailer>,
    composer: Arc<EmailComposer>,
    log: Option<LogSink>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = next_job(&receiver) => job,
        };
        let Some(job) = job else { break };

        let message = composer.compose(&job);
        if let Err(e) = mailer.send(message).await {
            tracing::error!(
                worker = id,
                kind = job.kind_name(),
                error = %e,
                "Email delivery failed"
            );
            if let Some(log) = &log {
                log.error(
                    format!("{} email delivery failed: {}", job.kind_name(), e),
                    None,
                );
            }
        }
    }

    tracing::debug!(worker = id, "Email worker stopped");
}

async fn next_job(receiver: &Mutex<mpsc::Receiver<EmailJob>>) -> Option<EmailJob> {
    receiver.lock().await.recv().await
}
