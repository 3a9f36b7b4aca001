/*
    feedback.rs - Feedback items addressed to the school
*/

use super::types::{ClassId, FeedbackId, LocalizedText, PersonId, Role, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    Suggestion,
    Complaint,
    Gratitude,
    Question,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    New,
    Reviewed,
    Planned,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub author_id: PersonId,
    /// Role of the author when the item was written
    pub author_role: Role,
    pub category: FeedbackCategory,
    pub content: LocalizedText,
    /// Roles allowed to read the item besides the author
    pub visibility_roles: BTreeSet<Role>,
    pub is_private: bool,
    pub class_id: Option<ClassId>,
    pub status: FeedbackStatus,
    pub created_at: Timestamp,
}
