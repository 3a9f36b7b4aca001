/*
    core_audit - Notification and admin-log side effects
*/

pub mod builders;
pub mod emitter;

pub use builders::*;
pub use emitter::{log_admin, notify, notify_all, AuditRecord};
