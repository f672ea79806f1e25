//! spec.md §8 concrete scenario: two chunks arrive before the processor
//! ever looks at the store; a single training pass consumes both, saves
//! once (`save_interval_batches: 1`), and terminates immediately because
//! `max_train_examples` is already met by the combined demo data.

mod common;

use common::{fast_config, Harness};
use falken_core::{ActionSource, EpisodeState, SessionType};
use falken_learner::processor::ProcessorEvent;
use falken_test_utils::builders::{assignment, chunk, minimal_brain_spec, step};

#[tokio::test]
async fn two_chunks_train_once_save_once_and_finish() {
    let harness = Harness::new(0.75, 600).await;
    harness.write_brain("p", "b", minimal_brain_spec()).await;
    harness
        .write_fresh_session("p", "b", "s0", SessionType::InteractiveTraining)
        .await;

    let overrides = r#"{"batch_size":10,"training_examples":10,"save_interval_batches":1,"max_train_examples":10}"#;
    let a = assignment("p", "b", "s0", overrides);
    harness.write_assignment(&a).await;

    let demo_steps = |offset: u32| (0..5).map(|i| step(offset + i, ActionSource::HumanDemonstration)).collect();
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 0).steps(demo_steps(0)).episode_state(EpisodeState::InProgress).build())
        .await;
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 1).steps(demo_steps(5)).episode_state(EpisodeState::InProgress).build())
        .await;

    let mut processor = harness.new_processor(a, fast_config(false)).await.unwrap();

    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::WillFetchData);
    let ProcessorEvent::SavedModel { model_id } = processor.next().await.unwrap() else {
        panic!("expected a save once the combined ten demo frames were consumed");
    };
    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::ProcessedStep);
    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::Finished);
    // Once finished, every further call reports Finished again.
    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::Finished);

    let model: falken_core::Model = harness
        .storage
        .resource_store()
        .read(&falken_core::ResourceId::model("p", "b", "s0", &model_id))
        .await
        .unwrap();
    assert_eq!(model.episode_id, "e0");
    assert_eq!(model.chunk_id, 1);

    let evaluation: falken_core::OfflineEvaluation = harness
        .storage
        .resource_store()
        .read(&falken_core::ResourceId::offline_evaluation("p", "b", "s0", &model_id, "v0"))
        .await
        .unwrap();
    assert_eq!(evaluation.score, 0.75);
}
