//! No library surface of its own; this crate exists to host the end-to-end
//! scenarios under `tests/` that exercise the store, monitor, and learner
//! crates wired together the way `falken-cli` wires them.
