/*
    schoolhub-core - Authorization-aware data engine for a school community

    Layers, leaves first:
    - core_store: entity model and the owned RecordStore
    - core_access: sessions, guards and per-viewer snapshots
    - core_messaging: threads, participants and the direct-message policy
    - core_workflow: registration and parent-student relation workflows
    - core_audit: notifications and the admin log
    - core_sync: local cache and remote authority persistence
    - engine: the public operations tying the layers together
*/

pub mod config;
pub mod core_access;
pub mod core_audit;
pub mod core_messaging;
pub mod core_store;
pub mod core_sync;
pub mod core_workflow;
pub mod engine;
pub mod error;
pub mod logging;
pub mod services;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{Config, ConfigError};
pub use engine::{Engine, EngineBuilder, OperationResponse};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
