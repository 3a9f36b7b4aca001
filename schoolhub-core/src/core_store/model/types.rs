/*
    types.rs - Common types for core_store models

    Defines:
    - Timestamps
    - Ids for every stored entity
    - Roles and languages
    - Localized text and review notes
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds since epoch
    pub fn as_secs(&self) -> i64 {
        (self.0 / 1000) as i64
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const REDACTED: &str = "hidden";

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn generate() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Placeholder used in filtered snapshots for records the viewer may not see
            pub fn redacted() -> Self {
                $name(REDACTED.to_string())
            }

            pub fn is_redacted(&self) -> bool {
                self.0 == REDACTED
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a person (any role)
    PersonId
);
entity_id!(
    /// Unique identifier for a class group
    ClassId
);
entity_id!(SubjectId);
entity_id!(LessonId);
entity_id!(HomeworkId);
entity_id!(
    /// Unique identifier for a conversation thread
    ThreadId
);
entity_id!(MessageId);
entity_id!(FeedbackId);
entity_id!(ApplicationId);
entity_id!(RelationRequestId);
entity_id!(LessonReportId);
entity_id!(LessonRecordId);
entity_id!(AbsenceId);
entity_id!(ScheduleId);
entity_id!(DeviceId);
entity_id!(NotificationId);
entity_id!(LogEntryId);

/// Closed set of roles a person can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Director,
    Teacher,
    Parent,
    Student,
    Staff,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Director,
        Role::Teacher,
        Role::Parent,
        Role::Student,
        Role::Staff,
        Role::Administrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Director => "director",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Administrator => "administrator",
        }
    }

    /// Director and Administrator see every user and class
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Director | Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported content languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Ru,
    Kk,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ru => "ru",
            Lang::Kk => "kk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" => Some(Lang::En),
            "ru" => Some(Lang::Ru),
            "kk" | "kz" => Some(Lang::Kk),
            _ => None,
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names keyed by language, used for classes and subjects
pub type LocalizedNames = BTreeMap<Lang, String>;

/// User-authored text with its detected language and any translations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocalizedText {
    pub text: String,
    pub lang: Lang,
    #[serde(default)]
    pub translations: BTreeMap<Lang, String>,
}

impl LocalizedText {
    pub fn new(text: impl Into<String>, lang: Lang) -> Self {
        LocalizedText {
            text: text.into(),
            lang,
            translations: BTreeMap::new(),
        }
    }
}

/// Structured note left by a reviewer on a workflow entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNote {
    pub author_id: PersonId,
    pub text: String,
    pub at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = PersonId::generate();
        let b = PersonId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = ClassId::new("7a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7a\"");
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&Role::Administrator).unwrap(),
            "\"administrator\""
        );
        let role: Role = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(role, Role::Teacher);
    }

    #[test]
    fn test_elevated_roles() {
        assert!(Role::Director.is_elevated());
        assert!(Role::Administrator.is_elevated());
        assert!(!Role::Staff.is_elevated());
        assert!(!Role::Teacher.is_elevated());
    }

    #[test]
    fn test_lang_parse() {
        assert_eq!(Lang::parse("RU"), Some(Lang::Ru));
        assert_eq!(Lang::parse("kz"), Some(Lang::Kk));
        assert_eq!(Lang::parse("de"), None);
    }

    #[test]
    fn test_redacted_ids() {
        assert!(PersonId::redacted().is_redacted());
        assert!(!PersonId::generate().is_redacted());
        assert!(SubjectId::redacted().is_redacted());
        assert!(!LessonId::generate().is_redacted());
    }
}
