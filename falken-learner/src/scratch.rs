//! Per-processor scratch directory layout (spec.md §4.4.7), grounded in
//! `learner/file_system.py`'s checkpoint/model/summary path helpers.
//!
//! Every processor gets `checkpoints/{assignment_rid}`,
//! `tmp_models/{assignment_rid}/{model_id}`, and `summaries/{assignment_rid}`
//! under a configured root, with cleanup guaranteed on entry and exit.

use falken_core::ResourceId;
use std::path::{Path, PathBuf};

/// Roots for the three scratch trees a processor writes into.
#[derive(Debug, Clone)]
pub struct ScratchLayout {
    checkpoints_root: PathBuf,
    tmp_models_root: PathBuf,
    summaries_root: PathBuf,
}

impl ScratchLayout {
    pub fn new(
        checkpoints_root: impl Into<PathBuf>,
        tmp_models_root: impl Into<PathBuf>,
        summaries_root: impl Into<PathBuf>,
    ) -> Self {
        ScratchLayout {
            checkpoints_root: checkpoints_root.into(),
            tmp_models_root: tmp_models_root.into(),
            summaries_root: summaries_root.into(),
        }
    }

    fn assignment_segment(assignment_rid: &ResourceId) -> String {
        assignment_rid.path().replace('/', "_")
    }

    pub fn checkpoints_path(&self, assignment_rid: &ResourceId) -> PathBuf {
        self.checkpoints_root
            .join(Self::assignment_segment(assignment_rid))
    }

    pub fn tmp_checkpoint_path(&self, assignment_rid: &ResourceId, model_id: &str) -> PathBuf {
        self.tmp_models_root
            .join(Self::assignment_segment(assignment_rid))
            .join(model_id)
    }

    pub fn summary_path(&self, assignment_rid: &ResourceId) -> PathBuf {
        self.summaries_root
            .join(Self::assignment_segment(assignment_rid))
    }

    /// Removes the checkpoints directory for `assignment_rid`, if it
    /// exists. Called on processor entry (a restart must start from
    /// scratch), on every `PROCESSED_STEP_NEEDS_RESTART`, and on exit
    /// (spec.md §4.4.7, §4.4.3).
    pub fn wipe_checkpoints(&self, assignment_rid: &ResourceId) -> std::io::Result<()> {
        remove_dir_if_present(&self.checkpoints_path(assignment_rid))
    }

    /// Removes the whole tmp-model scratch tree for `assignment_rid`,
    /// called once the exporter has finished moving a checkpoint into its
    /// permanent location (or on processor exit).
    pub fn wipe_tmp_models(&self, assignment_rid: &ResourceId) -> std::io::Result<()> {
        remove_dir_if_present(
            &self
                .tmp_models_root
                .join(Self::assignment_segment(assignment_rid)),
        )
    }
}

fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_checkpoints_is_idempotent_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::new(
            dir.path().join("checkpoints"),
            dir.path().join("tmp_models"),
            dir.path().join("summaries"),
        );
        let rid = ResourceId::assignment("p", "b", "s", "default");
        layout.wipe_checkpoints(&rid).unwrap();
    }

    #[test]
    fn paths_are_scoped_per_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::new(
            dir.path().join("checkpoints"),
            dir.path().join("tmp_models"),
            dir.path().join("summaries"),
        );
        let a = ResourceId::assignment("p", "b", "s", "default");
        let b = ResourceId::assignment("p", "b", "s", r#"{"batch_size":1}"#);
        assert_ne!(layout.checkpoints_path(&a), layout.checkpoints_path(&b));
    }
}
