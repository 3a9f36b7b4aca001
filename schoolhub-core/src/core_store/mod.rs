/*
    core_store - Authoritative in-memory state layer

    Handles:
    - Data models (people, classes, lessons, threads, workflows, logs)
    - Structural store primitives
    - Canonical serialized form of the whole store
*/

pub mod model;
pub mod store;

// Re-export commonly used types
pub use model::{ClassId, Lang, PersonId, Role, ThreadId, Timestamp};
pub use store::{
    Entity, RecordStore, SnapshotFile, StoreError, StoreResult, StoreSnapshot, StoreStats,
};
