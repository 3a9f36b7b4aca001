/*
    policy.rs - Who may open a direct conversation with whom

    | sender        | eligible targets                                  |
    |---------------|---------------------------------------------------|
    | Administrator | directors                                         |
    | Director      | anyone                                            |
    | Student       | classmates, own teachers, director, staff         |
    | Teacher       | students or parents sharing a class, director, staff |
    | Parent        | children's teachers, director, staff              |
    | Staff         | teachers, director, students, staff               |
*/

use crate::core_store::model::{Person, Role};
use crate::core_store::RecordStore;

/// True when any child of `parent` shares a class with `other`
fn children_share_class(parent: &Person, other: &Person, store: &RecordStore) -> bool {
    parent.child_ids.iter().any(|child_id| {
        store
            .get::<Person>(child_id)
            .map(|child| child.shares_class_with(other))
            .unwrap_or(false)
    })
}

/// Whether `sender` may start or use a direct thread with `target`
pub fn can_message(sender: &Person, target: &Person, store: &RecordStore) -> bool {
    if sender.id == target.id || !target.can_sign_in() {
        return false;
    }

    match sender.role {
        Role::Administrator => target.role == Role::Director,
        Role::Director => true,
        Role::Student => match target.role {
            Role::Student | Role::Teacher => sender.shares_class_with(target),
            Role::Director | Role::Staff => true,
            Role::Parent | Role::Administrator => false,
        },
        Role::Teacher => match target.role {
            Role::Student => sender.shares_class_with(target),
            Role::Parent => children_share_class(target, sender, store),
            Role::Director | Role::Staff => true,
            Role::Teacher | Role::Administrator => false,
        },
        Role::Parent => match target.role {
            Role::Teacher => children_share_class(sender, target, store),
            Role::Director | Role::Staff => true,
            _ => false,
        },
        Role::Staff => matches!(
            target.role,
            Role::Teacher | Role::Director | Role::Student | Role::Staff
        ),
    }
}
