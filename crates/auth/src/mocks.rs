//! Test doubles for the email seam.

use crate::email::{EmailMessage, Mailer};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Records every delivered message instead of talking to SMTP.
///
/// A gated mailer parks each `send` until [`release`](Self::release) hands
/// out a permit, which lets tests hold workers busy.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    attempts: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery fails after being counted as an attempt.
    pub fn failing() -> Self {
        let mailer = Self::new();
        mailer.fail(true);
        mailer
    }

    /// Deliveries block until released.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Let `n` parked deliveries through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Calls to `send`, including ones still parked on the gate.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Poll until at least `count` messages were delivered or `timeout`
    /// passes, then return what was delivered.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<EmailMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until at least `count` sends have started.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let attempts = self.attempts();
            if attempts >= count || tokio::time::Instant::now() >= deadline {
                return attempts;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: EmailMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| AuthError::Internal(e.to_string()))?;
            permit.forget();
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Internal("smtp unavailable".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| AuthError::Internal("Mutex lock failed".to_string()))?
            .push(email);
        Ok(())
    }
}
