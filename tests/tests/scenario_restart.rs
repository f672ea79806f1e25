//! spec.md §8 concrete scenario: a non-continuous assignment trains on its
//! first batch of demo data, then sees a second chunk arrive before it
//! would otherwise terminate. Rather than folding the new data into the
//! same run, it saves, reports `ProcessedStepNeedsRestart`, wipes its
//! checkpoint, and starts a fresh training pass that eventually terminates
//! once enough examples have been consumed.

mod common;

use common::{fast_config, Harness};
use falken_core::{ActionSource, EpisodeState, SessionType};
use falken_learner::processor::{AssignmentProcessor, ProcessorEvent};
use falken_test_utils::builders::{assignment, chunk, minimal_brain_spec, step};
use std::time::Duration;

/// Drains events until `stop` matches one, sleeping briefly between
/// `WillFetchData` events so the background fetcher's poll (every 20ms,
/// per [`fast_config`]) gets a chance to run between our non-blocking
/// `next()` calls.
async fn drain_until(
    processor: &mut AssignmentProcessor,
    stop: impl Fn(&ProcessorEvent) -> bool,
    events: &mut Vec<ProcessorEvent>,
) {
    for _ in 0..500 {
        let event = processor.next().await.unwrap();
        let hit = stop(&event);
        events.push(event);
        if hit {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("event never observed within the retry budget: {events:?}");
}

#[tokio::test]
async fn non_continuous_restart_then_terminates() {
    let harness = Harness::new(0.5, 600).await;
    harness.write_brain("p", "b", minimal_brain_spec()).await;
    harness
        .write_fresh_session("p", "b", "s0", SessionType::InteractiveTraining)
        .await;

    let overrides = r#"{"continuous":false,"batch_size":5,"training_examples":5,"max_train_examples":2000}"#;
    let a = assignment("p", "b", "s0", overrides);
    harness.write_assignment(&a).await;

    let demo_steps = |offset: u32, count: u32| (0..count).map(|i| step(offset + i, ActionSource::HumanDemonstration)).collect();
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 0).steps(demo_steps(0, 2)).episode_state(EpisodeState::InProgress).build())
        .await;

    let mut processor = harness.new_processor(a, fast_config(false)).await.unwrap();

    // Pass 1: consumes chunk 0's two frames, trains once; being the very
    // first pass it never requests a restart regardless of what arrives.
    assert_eq!(processor.next().await.unwrap(), ProcessorEvent::WillFetchData);

    // A second chunk arrives mid-run. Some subsequent pass sees it and,
    // being non-continuous past the first pass, flags a restart, which the
    // pass after that acts on: a save, then the restart event itself.
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 1).steps(demo_steps(2, 2)).episode_state(EpisodeState::InProgress).build())
        .await;

    let mut events = Vec::new();
    drain_until(&mut processor, |e| *e == ProcessorEvent::ProcessedStepNeedsRestart, &mut events).await;
    assert!(matches!(events[events.len() - 2], ProcessorEvent::SavedModel { .. }));
    assert_eq!(
        events.iter().filter(|e| matches!(e, ProcessorEvent::ProcessedStepNeedsRestart)).count(),
        1
    );

    // The fresh generation re-trains on the same staged demo frames with no
    // further data arriving, until a third chunk pushes it over
    // `max_train_examples` and it terminates.
    harness
        .write_chunk(chunk("p", "b", "s0", "e0", 2).steps(demo_steps(4, 2)).episode_state(EpisodeState::InProgress).build())
        .await;
    drain_until(&mut processor, |e| *e == ProcessorEvent::Finished, &mut events).await;

    assert!(matches!(
        events[events.len() - 3..],
        [ProcessorEvent::SavedModel { .. }, ProcessorEvent::ProcessedStep, ProcessorEvent::Finished]
    ));
    // One save on the restart, one save on the way out.
    assert_eq!(events.iter().filter(|e| matches!(e, ProcessorEvent::SavedModel { .. })).count(), 2);
}
