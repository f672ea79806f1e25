//! Filesystem-backed assignment leasing and change notification (spec.md
//! §4.2), grounded in `data_store/assignment_monitor.py`.

pub mod error;
pub mod lease;
pub mod monitor;

pub use error::{Error, Result};
pub use lease::LeaseManager;
pub use monitor::{AssignmentMonitor, MonitorEvent};
