//! Session lifecycle and state derivation (spec.md §3, §4.3 `GetSessionState`).

use serde::{Deserialize, Serialize};

/// `stale_seconds` default used by `GetSessionState` (spec.md §4.3).
pub const DEFAULT_STALE_SECONDS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    InteractiveTraining,
    Inference,
    Evaluation,
}

/// The four states `GetSessionState` may report (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    New,
    InProgress,
    Stale,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub project_id: String,
    pub brain_id: String,
    pub session_id: String,
    pub session_type: SessionType,
    pub starting_snapshots: Vec<String>,
    pub user_agent: String,
    pub created_micros: i64,
    pub last_data_received_micros: i64,
    pub last_demo_data_received_micros: i64,
    pub ended_micros: i64,
    pub status: Option<String>,
}

impl Session {
    /// Derives the session state (spec.md §4.3):
    /// - `Ended` if `ended_micros > 0`.
    /// - `Stale` if `now - max(last_data_received, created) > stale_seconds`.
    /// - `InProgress` if `last_data_received_micros > 0`.
    /// - `New` otherwise.
    pub fn state(&self, now_micros: i64, stale_seconds: i64) -> SessionState {
        if self.ended_micros > 0 {
            return SessionState::Ended;
        }
        let baseline = self.last_data_received_micros.max(self.created_micros);
        if now_micros - baseline > stale_seconds * 1_000_000 {
            return SessionState::Stale;
        }
        if self.last_data_received_micros > 0 {
            return SessionState::InProgress;
        }
        SessionState::New
    }

    /// A session poisoned by `HandleAssignmentError` (spec.md §4.3) is
    /// treated as terminal by future state checks.
    pub fn is_poisoned(&self) -> bool {
        self.status.is_some()
    }
}
