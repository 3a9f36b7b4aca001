/*
    Store subsystem - In-memory collections and their serialized form
*/

pub mod errors;
pub mod record_store;
pub mod snapshot;

pub use errors::*;
pub use record_store::{Entity, RecordStore, StoreStats};
pub use snapshot::{SnapshotFile, StoreSnapshot, SNAPSHOT_SCHEMA_VERSION};
