//! Waits for a local cluster to become healthy.
//!
//! Health is defined by a database table reaching an expected row count,
//! e.g. the satellite's `nodes` table listing every storage node.

pub mod counter;
pub mod error;
pub mod poller;

pub use counter::{PgRecordCounter, RecordCounter, ScriptedCounter, validate_table};
pub use error::HealthError;
pub use poller::{DEFAULT_INTERVAL, check_health, wait_for_records};
