//! spec.md §8 concrete scenario: `GetAncestorSessionIds` over a branching,
//! merging snapshot DAG. Sessions `e`, `f`, `d` are leaves; `c` starts from
//! `e`; `a` merges `c` and `d`; `b` starts from `f`; a final session `x`
//! starts from both `a` and `b`. Every one of the six ancestor sessions must
//! come back, however deep or merged the path to reach it.

mod common;

use common::Harness;
use falken_core::{Snapshot, SnapshotParents};
use std::collections::HashSet;

fn leaf_snapshot(id: &str) -> Snapshot {
    Snapshot {
        project_id: "p".into(),
        brain_id: "b".into(),
        snapshot_id: id.into(),
        session_id: format!("session-{id}"),
        model_id: format!("model-{id}"),
        model_path: format!("/models/{id}"),
        ancestor_snapshots: vec![],
    }
}

fn snapshot_from(id: &str, starting: &[&Snapshot]) -> Snapshot {
    let ancestor_snapshots: Vec<SnapshotParents> = starting
        .iter()
        .flat_map(|s| Snapshot::build_ancestor_snapshots(id, std::slice::from_ref(s)))
        .collect();
    Snapshot {
        project_id: "p".into(),
        brain_id: "b".into(),
        snapshot_id: id.into(),
        session_id: format!("session-{id}"),
        model_id: format!("model-{id}"),
        model_path: format!("/models/{id}"),
        ancestor_snapshots,
    }
}

#[tokio::test]
async fn ancestor_session_ids_walks_a_branching_merging_dag() {
    let harness = Harness::new(0.5, 600).await;

    let e = leaf_snapshot("e");
    let f = leaf_snapshot("f");
    let d = leaf_snapshot("d");
    let c = snapshot_from("c", &[&e]);
    let a = snapshot_from("a", &[&c, &d]);
    let b = snapshot_from("b", &[&f]);

    for snapshot in [&e, &f, &d, &c, &a, &b] {
        harness.storage.resource_store().write(snapshot.clone(), None).await.unwrap();
    }

    for snapshot in [&e, &f, &d, &c, &a, &b] {
        harness
            .write_fresh_session(
                "p",
                "b",
                &snapshot.session_id,
                falken_core::SessionType::InteractiveTraining,
            )
            .await;
    }

    let session_x = falken_core::Session {
        project_id: "p".into(),
        brain_id: "b".into(),
        session_id: "session-x".into(),
        session_type: falken_core::SessionType::InteractiveTraining,
        starting_snapshots: vec!["a".into(), "b".into()],
        user_agent: "falken-integration-tests".into(),
        created_micros: falken_core::timestamp::now_micros(),
        last_data_received_micros: falken_core::timestamp::now_micros(),
        last_demo_data_received_micros: falken_core::timestamp::now_micros(),
        ended_micros: 0,
        status: None,
    };
    harness.storage.resource_store().write(session_x, None).await.unwrap();

    let ancestors = harness
        .storage
        .get_ancestor_session_ids("p", "b", "session-x")
        .await
        .unwrap();

    let expected: HashSet<String> = ["a", "b", "c", "d", "e", "f"]
        .iter()
        .map(|id| format!("session-{id}"))
        .collect();
    assert_eq!(ancestors, expected);
}
