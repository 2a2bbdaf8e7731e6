//! Core domain types and port definitions for the grabbit download
//! orchestrator.
//!
//! This crate holds the job model, the event vocabulary, the routing rules
//! and the ports that adapters (storage, chat capability, site extractor,
//! web surface) implement. It depends on no adapter-specific crates.

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod paths;
pub mod ports;
pub mod routing;
pub mod sanitize;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ChatConfig, ChatConfigView};
pub use error::{ChatError, CoreError, StorageError};
pub use events::{JobEvent, JobEventEmitter, NoopEmitter, ProgressPayload};
pub use job::{
    Job, JobKind, JobPage, JobQuery, JobStatus, NewJob, ProgressPatch, SortField, SortOrder,
    StatsSnapshot, StatusFilter,
};
pub use ports::{
    ChatConnector, InboundFile, JobStore, MediaHandle, ProgressFn, RoutingStore, SettingsStore,
    User, UserStore,
};
pub use routing::{MediaKind, NewSourceRoute, SourceRoute, SourceRoutePatch};
