/*
    services - External collaborators consumed by the engine

    Each collaborator is a trait with a default implementation so the engine
    runs standalone:
    - Localizer: language detection and per-viewer text selection
    - BlobStore: attachment persistence
    - CredentialHasher: password hashing
*/

pub mod blob;
pub mod localization;
pub mod password;

pub use blob::{BlobError, BlobStore, LocalBlobStore};
pub use localization::{Localizer, ScriptLocalizer};
pub use password::{derive_login, generate_password, Argon2Hasher, CredentialError, CredentialHasher};
