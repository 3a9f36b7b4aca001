/*
    core_sync - Local cache and remote authority synchronization
*/

pub mod coordinator;
pub mod error;
pub mod remote;

pub use coordinator::{
    BootstrapReport, SyncCoordinator, SyncStatus, SyncTicket, SyncWorker, DEFAULT_REMOTE_TIMEOUT,
};
pub use error::{SyncError, SyncResult};
pub use remote::{HttpRemoteAuthority, PullResponse, PushRequest, RemoteAuthority};
