/*
    person.rs - People of every role

    A single record type covers staff, parents and students. Role-specific
    relationships live in id sets:
    - class_ids: class memberships (students, teachers, staff)
    - child_ids: parent -> student links
*/

use super::types::{ClassId, Lang, PersonId, Role, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Optional contact and profile details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Profile {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub avatar_uri: Option<String>,
}

/// A person known to the school
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Unique identifier
    pub id: PersonId,

    /// Display name
    pub name: String,

    /// Login used for password authentication
    pub login: String,

    /// Opaque password hash
    pub password_hash: String,

    pub role: Role,

    /// Homeroom delegation, only meaningful for teachers
    #[serde(default)]
    pub is_homeroom: bool,

    #[serde(default)]
    pub preferred_lang: Lang,

    #[serde(default)]
    pub class_ids: BTreeSet<ClassId>,

    #[serde(default)]
    pub child_ids: BTreeSet<PersonId>,

    pub active: bool,

    #[serde(default)]
    pub blocked: bool,

    #[serde(default)]
    pub profile: Profile,

    pub created_at: Timestamp,
}

impl Person {
    /// Create an active person with no memberships
    pub fn new(
        name: impl Into<String>,
        login: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        Person {
            id: PersonId::generate(),
            name: name.into(),
            login: login.into(),
            password_hash: password_hash.into(),
            role,
            is_homeroom: false,
            preferred_lang: Lang::default(),
            class_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
            active: true,
            blocked: false,
            profile: Profile::default(),
            created_at: Timestamp::now(),
        }
    }

    /// Active and not blocked
    pub fn can_sign_in(&self) -> bool {
        self.active && !self.blocked
    }

    pub fn is_in_class(&self, class_id: &ClassId) -> bool {
        self.class_ids.contains(class_id)
    }

    /// True when both people have at least one class in common
    pub fn shares_class_with(&self, other: &Person) -> bool {
        !self.class_ids.is_disjoint(&other.class_ids)
    }

    pub fn is_parent_of(&self, student_id: &PersonId) -> bool {
        self.role == Role::Parent && self.child_ids.contains(student_id)
    }

    /// Homeroom flag only counts for teachers
    pub fn is_homeroom_teacher(&self) -> bool {
        self.role == Role::Teacher && self.is_homeroom
    }
}
