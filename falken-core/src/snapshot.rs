//! Snapshots and their ancestor DAG (spec.md §3 invariant 5, grounded in
//! `stop_session_handler.py::_create_snapshot`).

use serde::{Deserialize, Serialize};

/// One edge of the ancestor DAG: `snapshot_id`'s direct parent snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotParents {
    pub snapshot_id: String,
    pub parent_snapshot_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub project_id: String,
    pub brain_id: String,
    pub snapshot_id: String,
    /// The session whose `StopSession` call created this snapshot (`snapshot.session`
    /// in the original implementation), used to resolve `GetAncestorSessionIds`
    /// (spec.md §4.3) from a snapshot id back to its owning session.
    pub session_id: String,
    pub model_id: String,
    pub model_path: String,
    /// Every edge of the DAG reachable from this snapshot: its own direct
    /// parents plus every ancestor edge each starting snapshot already
    /// carried. Flattened (not just immediate parents) so a later snapshot
    /// can be built by extension alone, without re-walking the store.
    pub ancestor_snapshots: Vec<SnapshotParents>,
}

impl Snapshot {
    /// Builds a new snapshot's `ancestor_snapshots` from the starting
    /// snapshots of the session it closes (`_create_snapshot` in the
    /// original implementation): for each starting snapshot, record a
    /// direct-parent edge plus every edge that starting snapshot already
    /// carried.
    pub fn build_ancestor_snapshots(
        new_snapshot_id: &str,
        starting_snapshots: &[Snapshot],
    ) -> Vec<SnapshotParents> {
        let mut ancestors = Vec::new();
        for starting_snapshot in starting_snapshots {
            ancestors.push(SnapshotParents {
                snapshot_id: new_snapshot_id.to_string(),
                parent_snapshot_ids: vec![starting_snapshot.snapshot_id.clone()],
            });
            ancestors.extend(starting_snapshot.ancestor_snapshots.iter().cloned());
        }
        ancestors
    }

    /// The transitive set of session-bearing ancestor snapshot ids, used by
    /// `GetAncestorSessionIds` (spec.md §4.3) once combined with the
    /// snapshot -> session mapping kept by the storage façade.
    pub fn ancestor_snapshot_ids(&self) -> impl Iterator<Item = &str> {
        self.ancestor_snapshots
            .iter()
            .flat_map(|edge| edge.parent_snapshot_ids.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn single_parent_snapshot_gets_direct_edge() {
        let parent = leaf_snapshot("snap-a");
        let ancestors = Snapshot::build_ancestor_snapshots("snap-b", &[parent]);
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].snapshot_id, "snap-b");
        assert_eq!(ancestors[0].parent_snapshot_ids, vec!["snap-a".to_string()]);
    }

    #[test]
    fn grandparent_edges_are_carried_forward() {
        let grandparent = leaf_snapshot("snap-a");
        let mut parent = leaf_snapshot("snap-b");
        parent.ancestor_snapshots = Snapshot::build_ancestor_snapshots("snap-b", &[grandparent]);

        let ancestors = Snapshot::build_ancestor_snapshots("snap-c", &[parent]);
        // One direct edge (snap-c -> snap-b) plus the carried edge
        // (snap-b -> snap-a).
        assert_eq!(ancestors.len(), 2);
        assert!(ancestors
            .iter()
            .any(|edge| edge.snapshot_id == "snap-c" && edge.parent_snapshot_ids == vec!["snap-b"]));
        assert!(ancestors
            .iter()
            .any(|edge| edge.snapshot_id == "snap-b" && edge.parent_snapshot_ids == vec!["snap-a"]));
    }

    #[test]
    fn merge_of_two_starting_snapshots_unions_their_dags() {
        let a = leaf_snapshot("snap-a");
        let b = leaf_snapshot("snap-b");
        let ancestors = Snapshot::build_ancestor_snapshots("snap-c", &[a, b]);
        assert_eq!(ancestors.len(), 2);
    }
}
