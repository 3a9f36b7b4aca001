/*
    core_messaging - Conversation threads

    - policy: direct-message eligibility per (sender role, target role)
    - threads: lazy creation under the uniqueness rules, posting, read marks
*/

pub mod policy;
pub mod threads;

pub use policy::can_message;
pub use threads::{
    attach_parent_to_student_scope, class_participants, create_announcement_thread,
    ensure_class_thread, find_class_thread, find_or_create_direct, find_or_create_parent_teacher,
    join_class_threads, leave_class_threads, mark_thread_read, post_message, PreparedMessage,
};
