//! Saved log sessions for the console bridge.
//!
//! Provides:
//! - `SessionManager` - Save, load and list named snapshots of log entries
//! - Storage implementations (memory)

pub mod manager;
pub mod storage;

pub use manager::{ManagerError, SessionManager};
