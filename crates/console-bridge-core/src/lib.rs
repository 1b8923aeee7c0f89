//! In-memory data layer for the console bridge.
//!
//! This crate provides the query-side building blocks:
//! - `TabRegistry` - Connected tabs and their metadata
//! - `LogStore` - Bounded entry store with filters and live tailing
//! - `search` - Regex and keyword search with context windows
//! - `suggest` - Tab relevance scoring and dev-port detection
//! - `export` - JSON/CSV/text rendering
//! - `SessionStorage` trait for saved sessions

pub mod context;
pub mod error;
pub mod export;
pub mod filter;
pub mod log_entry;
pub mod log_store;
pub mod search;
pub mod suggest;
pub mod tab_registry;
pub mod traits;

pub use context::SuggestionContext;
pub use error::CoreError;
pub use filter::{FilterOptions, TimeBound};
pub use log_entry::{LogEntry, LogLevel, TabId, TabInfo};
pub use log_store::{LogStore, LogStoreConfig};
pub use search::{KeywordLogic, KeywordParams, SearchParams, SearchResult};
pub use suggest::{TabSuggestion, detect_common_ports, suggest_tabs};
pub use tab_registry::TabRegistry;
pub use traits::SessionStorage;
