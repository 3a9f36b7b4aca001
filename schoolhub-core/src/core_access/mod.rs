/*
    core_access - Who may see and do what

    - session: token issue and verification
    - guards: predicates run before every mutation
    - visibility: per-viewer filtered snapshots
*/

pub mod guards;
pub mod session;
pub mod visibility;

pub use guards::{
    require_auth, require_class_access, require_homeroom_of, require_parent_of, require_role,
    require_student_details_access, Authenticated,
};
pub use session::{Session, SessionClaims, SessionCodec, SessionError, DEFAULT_SESSION_TTL};
pub use visibility::{accessible_class_ids, resolve_snapshot, visible_person_ids, FilteredSnapshot};
