/*
    workflow.rs - Registration applications and parent-student relation requests

    Both entities are finite-state records. The transition tables live here so
    that every caller agrees on them; side effects live in core_workflow.
*/

use super::types::{
    ApplicationId, ClassId, Lang, PersonId, RelationRequestId, ReviewNote, Timestamp,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    ParentWithStudent,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    New,
    InReview,
    NeedMoreInfo,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// Transition table for reviewer-driven changes
    ///
    /// need_more_info only leaves through the applicant's reply, and a
    /// rejection is final.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        match (self, next) {
            (New, InReview | NeedMoreInfo | Approved | Rejected) => true,
            (InReview, Approved | Rejected | NeedMoreInfo) => true,
            // re-approval is accepted and changes nothing
            (Approved, Approved) => true,
            _ => false,
        }
    }

    /// Whether an applicant reply may move the application back to in_review
    pub fn awaits_reply(&self) -> bool {
        *self == ApplicationStatus::NeedMoreInfo
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::New => "new",
            ApplicationStatus::InReview => "in_review",
            ApplicationStatus::NeedMoreInfo => "need_more_info",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff roles an applicant may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedStaffRole {
    Teacher,
    HomeroomTeacher,
    Staff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_lang: Lang,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDetails {
    pub name: String,
    pub birthday: Option<NaiveDate>,
    pub grade: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistrationPayload {
    ParentWithStudent {
        parent: ApplicantDetails,
        student: StudentDetails,
        #[serde(default)]
        requested_class_ids: BTreeSet<ClassId>,
    },
    Staff {
        applicant: ApplicantDetails,
        requested_role: RequestedStaffRole,
        #[serde(default)]
        requested_class_ids: BTreeSet<ClassId>,
    },
}

impl RegistrationPayload {
    pub fn kind(&self) -> ApplicationType {
        match self {
            RegistrationPayload::ParentWithStudent { .. } => ApplicationType::ParentWithStudent,
            RegistrationPayload::Staff { .. } => ApplicationType::Staff,
        }
    }

    pub fn requested_class_ids(&self) -> &BTreeSet<ClassId> {
        match self {
            RegistrationPayload::ParentWithStudent { requested_class_ids, .. }
            | RegistrationPayload::Staff { requested_class_ids, .. } => requested_class_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationApplication {
    pub id: ApplicationId,
    pub payload: RegistrationPayload,
    pub status: ApplicationStatus,
    pub reviewer_id: Option<PersonId>,
    /// Latest reviewer comment
    pub comment: Option<String>,
    /// Open question to the applicant while in NeedMoreInfo
    pub info_request: Option<String>,
    /// Applicant answer to the latest info request
    pub applicant_reply: Option<String>,
    #[serde(default)]
    pub review_notes: Vec<ReviewNote>,
    /// Accounts created on approval; non-empty means approval already happened
    #[serde(default)]
    pub approved_user_ids: Vec<PersonId>,
    #[serde(default)]
    pub assigned_class_ids: BTreeSet<ClassId>,
    pub created_at: Timestamp,
}

impl RegistrationApplication {
    pub fn new(payload: RegistrationPayload) -> Self {
        RegistrationApplication {
            id: ApplicationId::generate(),
            payload,
            status: ApplicationStatus::New,
            reviewer_id: None,
            comment: None,
            info_request: None,
            applicant_reply: None,
            review_notes: Vec::new(),
            approved_user_ids: Vec::new(),
            assigned_class_ids: BTreeSet::new(),
            created_at: Timestamp::now(),
        }
    }

    pub fn kind(&self) -> ApplicationType {
        self.payload.kind()
    }

    pub fn accounts_created(&self) -> bool {
        !self.approved_user_ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RelationStatus {
    /// Approved and Rejected are terminal
    pub fn is_resolved(&self) -> bool {
        !matches!(self, RelationStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentStudentRelationRequest {
    pub id: RelationRequestId,
    pub parent_id: PersonId,
    pub student_id: PersonId,
    pub status: RelationStatus,
    pub reviewer_id: Option<PersonId>,
    pub comment: Option<String>,
    #[serde(default)]
    pub review_notes: Vec<ReviewNote>,
    pub created_at: Timestamp,
}

impl ParentStudentRelationRequest {
    pub fn new(parent_id: PersonId, student_id: PersonId) -> Self {
        ParentStudentRelationRequest {
            id: RelationRequestId::generate(),
            parent_id,
            student_id,
            status: RelationStatus::Pending,
            reviewer_id: None,
            comment: None,
            review_notes: Vec::new(),
            created_at: Timestamp::now(),
        }
    }
}
