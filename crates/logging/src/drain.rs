use std::sync::Arc;
use std::time::Duration;

use ticketing_database::LogStore;
use ticketing_models::{LogLevel, LogRepeat, NewLogRecord};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::caller::{trim_path, CallerFilter, MAX_STACK_FRAMES};
use crate::pipeline::Submission;

/// The single consumer of the log channel.
pub(crate) struct Drain {
    store: Arc<dyn LogStore>,
    receiver: mpsc::Receiver<Submission>,
    batch: Vec<NewLogRecord>,
    buffer_size: usize,
    flush_period: Duration,
    dedup_window: chrono::Duration,
    callers: CallerFilter,
}

impl Drain {
    pub(crate) fn new(
        store: Arc<dyn LogStore>,
        receiver: mpsc::Receiver<Submission>,
        buffer_size: usize,
        flush_period: Duration,
        dedup_window: chrono::Duration,
        callers: CallerFilter,
    ) -> Self {
        Self {
            store,
            receiver,
            batch: Vec::with_capacity(buffer_size),
            buffer_size,
            flush_period,
            dedup_window,
            callers,
        }
    }

    /// Run until cancelled or until every sender is gone.
    ///
    /// On exit the channel is closed, whatever was already queued is
    /// ingested, and the batch is flushed.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            buffer_size = self.buffer_size,
            flush_period_secs = self.flush_period.as_secs(),
            "Log drain started"
        );

        let mut ticker = tokio::time::interval(self.flush_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.receiver.recv() => match received {
                    Some(submission) => {
                        let record = self.resolve(submission);
                        self.ingest(record).await
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }

        self.receiver.close();
        let mut remaining = 0usize;
        while let Ok(submission) = self.receiver.try_recv() {
            remaining += 1;
            let record = self.resolve(submission);
            self.ingest(record).await;
        }
        self.flush().await;

        tracing::info!(drained_on_shutdown = remaining, "Log drain stopped");
    }

    /// Point an error record at its first caller frame and attach the stack.
    fn resolve(&self, submission: Submission) -> NewLogRecord {
        let Submission { mut record, trace } = submission;
        let Some(trace) = trace.filter(|_| record.level == LogLevel::Error) else {
            return record;
        };

        let frames = self.callers.resolve(&trace, MAX_STACK_FRAMES);
        if let Some(frame) = frames.first() {
            record.file = Some(trim_path(&frame.file));
            record.line = i32::try_from(frame.line).ok();
            let stack: Vec<String> = frames.iter().map(ToString::to_string).collect();
            record.stack = Some(stack.join("\n"));
        }
        record
    }

    async fn ingest(&mut self, record: NewLogRecord) {
        if let Some(key) = record.dedup_key() {
            let since = record.created_at - self.dedup_window;
            let repeat = LogRepeat::from_record(&record);

            // Newest pending record first; nothing pending is in the store yet.
            if let Some(pending) = self
                .batch
                .iter_mut()
                .rev()
                .find(|pending| pending.created_at >= since && pending.dedup_key() == Some(key))
            {
                pending.absorb(&repeat);
                return;
            }

            match self.store.find_recent_duplicate(key, since).await {
                Ok(Some(existing)) => match self.store.record_repeat(existing.id, &repeat).await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            log_id = existing.id,
                            "Failed to increment log occurrences, inserting as new record"
                        );
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Log dedup lookup failed, treating as new record");
                }
            }
        }

        self.batch.push(record);
        if self.batch.len() >= self.buffer_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.buffer_size));
        match self.store.insert_batch(&batch).await {
            Ok(inserted) => {
                tracing::debug!(inserted, "Flushed log batch");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    dropped = batch.len(),
                    "Failed to persist log batch, records dropped"
                );
            }
        }
    }
}
