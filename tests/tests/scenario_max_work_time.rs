//! spec.md §8 concrete scenario: an assignment that blows its work-time
//! budget fails with `ExceededMaxWorkTime`. The driver reports that failure
//! to its error listeners, poisons both the assignment and its session, and
//! still releases the lease so the (now-poisoned) assignment can be picked
//! up again rather than leaking the lock forever.

mod common;

use async_trait::async_trait;
use common::Harness;
use falken_core::SessionType;
use falken_learner::driver::ErrorListener;
use falken_learner::error::Error as LearnerError;
use falken_learner::processor::ProcessorConfig;
use falken_test_utils::builders::{assignment, chunk, minimal_brain_spec, step};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct RecordingListener {
    errors: Mutex<Vec<String>>,
}

#[async_trait]
impl ErrorListener for RecordingListener {
    async fn on_error(&self, _assignment: &falken_core::Assignment, error: &LearnerError) {
        self.errors.lock().push(error.to_string());
    }
}

fn zero_budget_config() -> ProcessorConfig {
    ProcessorConfig {
        max_assignment_work_time: Duration::from_nanos(1),
        wait_for_data_brain: Duration::from_millis(200),
        fetch_poll_interval: Duration::from_millis(20),
        manual_mode: false,
    }
}

#[tokio::test]
async fn exceeding_work_time_poisons_session_and_releases_lease() {
    let harness = Harness::new(0.5, 600).await;
    harness.write_brain("p", "b", minimal_brain_spec()).await;
    harness
        .write_fresh_session("p", "b", "s0", SessionType::InteractiveTraining)
        .await;

    let overrides = r#"{"batch_size":10,"training_examples":10}"#;
    let a = assignment("p", "b", "s0", overrides);
    harness.write_assignment(&a).await;
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 0).steps((0..10).map(|i| step(i, falken_core::ActionSource::HumanDemonstration)).collect()).build())
        .await;

    let mut driver = harness.driver(zero_budget_config());
    let listener = Arc::new(RecordingListener { errors: Mutex::new(Vec::new()) });
    driver.add_error_listener(listener.clone());

    let result = driver.run_once(Some(Duration::from_secs(5))).await;
    assert!(result.is_err(), "a near-zero work-time budget must fail the assignment");
    assert_eq!(listener.errors.lock().len(), 1);
    assert!(listener.errors.lock()[0].to_lowercase().contains("too long"));

    let session = harness.storage.read_session("p", "b", "s0").await.unwrap();
    assert!(session.is_poisoned(), "the session must be poisoned so future state checks treat it as terminal");

    let reread: falken_core::Assignment = harness
        .storage
        .resource_store()
        .read(&falken_core::ResourceId::assignment("p", "b", "s0", &a.assignment_id))
        .await
        .unwrap();
    assert!(reread.status.is_some(), "the assignment itself must carry the failure message too");

    // The lease was released despite the failure, so the same (now-poisoned)
    // assignment is handed out again rather than stuck forever.
    let requeued = harness.storage.receive_assignment(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(requeued.map(|a| a.assignment_id), Some(a.assignment_id.clone()));

    // A fresh processor over the now-poisoned session enters already
    // `Finished`, matching the outer diagram's direct Start -> Finished edge.
    let mut processor = harness.new_processor(a, common::fast_config(false)).await.unwrap();
    assert_eq!(
        processor.next().await.unwrap(),
        falken_learner::processor::ProcessorEvent::Finished
    );
}
