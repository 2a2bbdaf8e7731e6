//! SQLite repository implementations for grabbit.
//!
//! Storage lives behind the port traits in `grabbit-core`; this crate is the
//! only place that speaks SQL. `setup_database` creates the schema and runs
//! the forward-only migrations.

pub mod repositories;
pub mod setup;

pub use repositories::{
    SqliteJobStore, SqliteRoutingStore, SqliteSettingsStore, SqliteUserStore,
};
pub use setup::setup_database;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
