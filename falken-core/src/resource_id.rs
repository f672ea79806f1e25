//! Hierarchical resource IDs (spec.md §3, §4.1).
//!
//! A [`ResourceId`] is the rendered path of an ordered sequence of
//! `(collection, element)` pairs, e.g.
//! `projects/p/brains/b/sessions/s/episodes/e/chunks/0`. Glob and brace
//! components (`*`, `{a,b,c}`) are valid element values; they are only
//! resolved against real paths by [`falken_store`](../../falken_store/index.html)'s
//! `List` operation, so the type here stays a plain wrapper around a path
//! string built by the constructors below.

use sha2::{Digest, Sha256};
use std::fmt;

/// The reserved final path segment naming an attribute record (spec.md §4.1
/// "Attributes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// `online_evaluation`, attached to an episode.
    OnlineEvaluation,
}

impl Attribute {
    fn segment(self) -> &'static str {
        match self {
            Attribute::OnlineEvaluation => "online_evaluation",
        }
    }
}

/// A resource id, rendered as a `/`-joined path.
///
/// Equality and hashing are on the rendered string, matching the store's
/// use of the resource id as both a directory path and a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Assignment ids can be arbitrarily long JSON blobs (spec.md §3); hash them
/// down to a bounded filesystem-safe segment. Collisions are acceptable in
/// the sense that a colliding pair would alias two assignments onto the same
/// lease path, which is a correctness bug but astronomically unlikely at
/// 128 bits of digest.
fn hash_assignment_id(assignment_id: &str) -> String {
    let digest = Sha256::digest(assignment_id.as_bytes());
    hex::encode(&digest[..16])
}

impl ResourceId {
    fn from_segments(segments: &[(&str, &str)]) -> Self {
        let mut path = String::new();
        for (collection, element) in segments {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(collection);
            path.push('/');
            path.push_str(element);
        }
        ResourceId(path)
    }

    fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.0.push('/');
        self.0.push_str(attribute.segment());
        self
    }

    /// Constructs a `ResourceId` from an already-rendered path string, e.g. a
    /// path read back from `List`. No validation is performed.
    pub fn from_raw(path: impl Into<String>) -> Self {
        ResourceId(path.into())
    }

    pub fn project(project: &str) -> Self {
        Self::from_segments(&[("projects", project)])
    }

    pub fn brain(project: &str, brain: &str) -> Self {
        Self::from_segments(&[("projects", project), ("brains", brain)])
    }

    pub fn session(project: &str, brain: &str, session: &str) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session),
        ])
    }

    pub fn episode(project: &str, brain: &str, session: &str, episode: &str) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session),
            ("episodes", episode),
        ])
    }

    /// `chunk_id` accepts a rendered string so that callers can pass glob
    /// syntax (`"*"`) when building a list pattern.
    pub fn chunk(project: &str, brain: &str, session: &str, episode: &str, chunk_id: &str) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session),
            ("episodes", episode),
            ("chunks", chunk_id),
        ])
    }

    /// The path segment is the hashed assignment id (spec.md §3): "The
    /// assignment id is hashed before use as a filesystem segment".
    pub fn assignment(project: &str, brain: &str, session: &str, assignment_id: &str) -> Self {
        let hashed = hash_assignment_id(assignment_id);
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session),
            ("assignments", &hashed),
        ])
    }

    pub fn snapshot(project: &str, brain: &str, snapshot_id: &str) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("snapshots", snapshot_id),
        ])
    }

    pub fn model(project: &str, brain: &str, session: &str, model_id: &str) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session),
            ("models", model_id),
        ])
    }

    pub fn offline_evaluation(
        project: &str,
        brain: &str,
        session: &str,
        model_id: &str,
        offline_evaluation_id: &str,
    ) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session),
            ("models", model_id),
            ("offline_evaluations", offline_evaluation_id),
        ])
    }

    /// The per-episode online evaluation attribute (spec.md §3, §4.1).
    pub fn online_evaluation(project: &str, brain: &str, session: &str, episode: &str) -> Self {
        Self::episode(project, brain, session, episode).with_attribute(Attribute::OnlineEvaluation)
    }

    /// Resource-id-shaped glob over every assignment under a session (or a
    /// brace-expanded set of sessions) for use with `ResourceStore::list`.
    pub fn assignment_glob(project: &str, brain: &str, session_glob: &str) -> Self {
        Self::from_segments(&[
            ("projects", project),
            ("brains", brain),
            ("sessions", session_glob),
            ("assignments", "*"),
        ])
    }

    /// Glob over every chunk of every episode in `session_glob` (spec.md
    /// §4.3 `GetEpisodeChunks`).
    pub fn chunk_glob(project: &str, brain: &str, session_glob: &str) -> Self {
        Self::chunk(project, brain, session_glob, "*", "*")
    }

    /// The owning session id, if this resource id has a `sessions/` segment.
    pub fn session_id(&self) -> Option<&str> {
        self.segment_value("sessions")
    }

    /// The owning episode id, if this resource id has an `episodes/` segment.
    pub fn episode_id(&self) -> Option<&str> {
        self.segment_value("episodes")
    }

    /// The chunk id, if this resource id has a `chunks/` segment.
    pub fn chunk_id(&self) -> Option<&str> {
        self.segment_value("chunks")
    }

    fn segment_value(&self, collection: &str) -> Option<&str> {
        let mut parts = self.0.split('/');
        while let Some(part) = parts.next() {
            if part == collection {
                return parts.next();
            }
        }
        None
    }

    /// The rendered path, used as a directory prefix by the resource store.
    pub fn path(&self) -> &str {
        &self.0
    }
}

/// Expands a single `{a,b,c}` brace group in a glob pattern into one pattern
/// per alternative (spec.md §4.1 "resolves `*` and `{a,b,c}` brace
/// expansion"). Patterns without a brace group are returned unchanged.
/// Only one brace group is supported per pattern, matching every call site
/// in this service (always a `sessions/{...}` alternation).
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| i + open) else {
        return vec![pattern.to_string()];
    };
    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    pattern[open + 1..close]
        .split(',')
        .map(|alt| format!("{prefix}{alt}{suffix}"))
        .collect()
}
