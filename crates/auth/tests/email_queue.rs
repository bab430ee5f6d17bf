use std::sync::Arc;
use std::time::{Duration, Instant};

use ticketing_auth::mocks::RecordingMailer;
use ticketing_auth::{AuthError, EmailComposer, EmailJob, EmailQueue, EmailQueueConfig};

fn start(mailer: &RecordingMailer, workers: usize) -> EmailQueue {
    EmailQueue::start(
        EmailQueueConfig {
            workers,
            ..Default::default()
        },
        Arc::new(mailer.clone()),
        Arc::new(EmailComposer::default()),
        None,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_queue_reports_saturation_within_timeout() {
    let mailer = RecordingMailer::gated();
    let queue = start(&mailer, 1);

    // Park the only worker on a job so nothing drains the channel.
    queue
        .submit(EmailJob::verification("first@example.com", "first", "00000001"))
        .await
        .unwrap();
    assert_eq!(mailer.wait_for_attempts(1, Duration::from_secs(2)).await, 1);

    let handles: Vec<_> = (0..1001)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = queue
                    .send_verification(&format!("fan{}@example.com", i), "fan")
                    .await;
                (result, started.elapsed())
            })
        })
        .collect();

    let mut accepted = 0;
    let mut saturated = Vec::new();
    for handle in handles {
        let (result, elapsed) = handle.await.unwrap();
        match result {
            Ok(code) => {
                assert_eq!(code.len(), 8);
                accepted += 1;
            }
            Err(AuthError::QueueSaturated) => saturated.push(elapsed),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(accepted, 1000);
    assert_eq!(saturated.len(), 1);
    for elapsed in saturated {
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1000), "took {:?}", elapsed);
    }

    mailer.release(1);
    tokio::time::timeout(Duration::from_secs(5), queue.shutdown())
        .await
        .expect("shutdown should not wait for queued jobs");
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn shutdown_finishes_in_flight_job() {
    let mailer = RecordingMailer::gated();
    let queue = start(&mailer, 2);

    queue
        .submit(EmailJob::verification("a@example.com", "alice", "12345678"))
        .await
        .unwrap();
    mailer.wait_for_attempts(1, Duration::from_secs(2)).await;

    let shutdown = tokio::spawn({
        let queue = queue.clone();
        async move { queue.shutdown().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished());

    mailer.release(1);
    shutdown.await.unwrap();
    assert_eq!(mailer.sent().len(), 1);
}
