/*
    message.rs - Conversation threads and their messages

    Uniqueness rules (enforced by the messaging manager, not here):
    - at most one Direct thread per unordered participant pair
    - at most one Class thread per class
    - at most one ParentTeacher thread per (teacher, parent) pair
*/

use super::types::{ClassId, LocalizedText, MessageId, PersonId, ThreadId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadKind {
    Class,
    Direct,
    ParentTeacher,
    Announcement,
}

/// A conversation scope with a participant set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub kind: ThreadKind,
    pub participant_ids: BTreeSet<PersonId>,
    pub class_id: Option<ClassId>,
    /// Only set for announcements
    pub title: Option<String>,
    pub created_by: Option<PersonId>,
    pub created_at: Timestamp,
}

impl Thread {
    pub fn new(kind: ThreadKind, participant_ids: BTreeSet<PersonId>) -> Self {
        Thread {
            id: ThreadId::generate(),
            kind,
            participant_ids,
            class_id: None,
            title: None,
            created_by: None,
            created_at: Timestamp::now(),
        }
    }

    pub fn has_participant(&self, person_id: &PersonId) -> bool {
        self.participant_ids.contains(person_id)
    }

    /// True when this is a direct thread between exactly `a` and `b`
    pub fn is_direct_between(&self, a: &PersonId, b: &PersonId) -> bool {
        self.kind == ThreadKind::Direct
            && self.participant_ids.len() == 2
            && self.participant_ids.contains(a)
            && self.participant_ids.contains(b)
    }

    pub fn is_parent_teacher_between(&self, teacher: &PersonId, parent: &PersonId) -> bool {
        self.kind == ThreadKind::ParentTeacher
            && self.participant_ids.contains(teacher)
            && self.participant_ids.contains(parent)
    }
}

/// A message in a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_id: PersonId,
    pub content: LocalizedText,
    /// Blob store uris
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: Timestamp,
    /// Always contains the sender
    pub read_by: BTreeSet<PersonId>,
}
