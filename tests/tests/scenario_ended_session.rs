//! spec.md §8 concrete scenario: once a session has ended mid-assignment,
//! the processor keeps running (it still sees new chunks and still saves),
//! but `RecordNewModel` silently drops the write rather than dangling a
//! model off a session nobody can select it for anymore.

mod common;

use common::{fast_config, Harness};
use falken_core::{ActionSource, EpisodeState, SessionType};
use falken_core::timestamp::now_micros;
use falken_learner::processor::ProcessorEvent;
use falken_store::Error as StoreError;
use falken_test_utils::builders::{assignment, chunk, minimal_brain_spec, step};

#[tokio::test]
async fn ended_session_keeps_running_but_drops_the_second_model() {
    let harness = Harness::new(0.5, 600).await;
    harness.write_brain("p", "b", minimal_brain_spec()).await;
    harness
        .write_fresh_session("p", "b", "s0", SessionType::InteractiveTraining)
        .await;

    let overrides = r#"{"batch_size":10,"training_examples":10,"save_interval_batches":1,"synchronous_export":true}"#;
    let a = assignment("p", "b", "s0", overrides);
    harness.write_assignment(&a).await;

    let demo_steps = |offset: u32| (0..10).map(|i| step(offset + i, ActionSource::HumanDemonstration)).collect();
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 0).steps(demo_steps(0)).episode_state(EpisodeState::InProgress).build())
        .await;

    let mut processor = harness.new_processor(a.clone(), fast_config(false)).await.unwrap();

    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::WillFetchData);
    let ProcessorEvent::SavedModel { model_id: first_model } = processor.next().await.unwrap() else {
        panic!("first chunk should trigger a save (save_interval_batches: 1)");
    };

    let mut session = harness.storage.read_session("p", "b", "s0").await.unwrap();
    session.ended_micros = now_micros();
    harness.storage.resource_store().write(session, None).await.unwrap();

    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 1).steps(demo_steps(10)).episode_state(EpisodeState::InProgress).build())
        .await;

    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::WillFetchData);
    let ProcessorEvent::SavedModel { model_id: second_model } = processor.next().await.unwrap() else {
        panic!("the processor still reports a save even though the session has ended");
    };
    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::ProcessedStep);
    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::Finished);

    let first: falken_core::Model = harness
        .storage
        .resource_store()
        .read(&falken_core::ResourceId::model("p", "b", "s0", &first_model))
        .await
        .unwrap();
    assert_eq!(first.episode_id, "e0");

    let second = harness
        .storage
        .resource_store()
        .read::<falken_core::Model>(&falken_core::ResourceId::model("p", "b", "s0", &second_model))
        .await;
    assert!(matches!(second, Err(StoreError::NotFound(_))));

    let second_eval = harness
        .storage
        .resource_store()
        .read::<falken_core::OfflineEvaluation>(&falken_core::ResourceId::offline_evaluation(
            "p",
            "b",
            "s0",
            &second_model,
            "v0",
        ))
        .await;
    assert!(matches!(second_eval, Err(StoreError::NotFound(_))));
}
