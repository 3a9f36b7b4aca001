/*
    school.rs - Classes, subjects, the timetable and everything hanging off a lesson

    Lesson replacement model:
    - Rescheduling cancels the original lesson (kept for the record)
    - The replacement has status Changed and points at the canceled original
*/

use super::types::{
    AbsenceId, ClassId, HomeworkId, LessonId, LessonRecordId, LessonReportId, LocalizedNames,
    LocalizedText, PersonId, SubjectId, Timestamp,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A class group (for example "7A")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassGroup {
    pub id: ClassId,
    pub grade: u8,
    pub names: LocalizedNames,
    pub homeroom_teacher_id: Option<PersonId>,
    #[serde(default)]
    pub subject_ids: BTreeSet<SubjectId>,
    #[serde(default)]
    pub archived: bool,
}

impl ClassGroup {
    pub fn new(grade: u8, names: LocalizedNames) -> Self {
        ClassGroup {
            id: ClassId::generate(),
            grade,
            names,
            homeroom_teacher_id: None,
            subject_ids: BTreeSet::new(),
            archived: false,
        }
    }
}

/// How an archived subject stays around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectArchiveMode {
    /// Not shown to anyone except the school administration
    Hidden,
    /// Shown, but no new lessons may reference it
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub names: LocalizedNames,
    #[serde(default)]
    pub archived: bool,
    pub archive_mode: Option<SubjectArchiveMode>,
}

impl Subject {
    pub fn new(names: LocalizedNames) -> Self {
        Subject {
            id: SubjectId::generate(),
            names,
            archived: false,
            archive_mode: None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.archived && self.archive_mode == Some(SubjectArchiveMode::Hidden)
    }

    /// New lessons may only reference subjects that are not archived
    pub fn accepts_new_lessons(&self) -> bool {
        !self.archived
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Normal,
    Changed,
    Canceled,
}

/// A single timetable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub class_id: ClassId,
    pub teacher_id: PersonId,
    pub subject_id: SubjectId,
    pub room: String,
    pub date: NaiveDate,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub status: LessonStatus,
    /// For a Changed lesson: the canceled lesson it replaces
    pub original_id: Option<LessonId>,
    pub reason: Option<String>,
}

impl Lesson {
    pub fn is_canceled(&self) -> bool {
        self.status == LessonStatus::Canceled
    }
}

/// Homework attached to a lesson
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Homework {
    pub id: HomeworkId,
    pub lesson_id: LessonId,
    pub class_id: ClassId,
    pub teacher_id: PersonId,
    pub content: LocalizedText,
    pub assigned_on: NaiveDate,
    pub due_on: NaiveDate,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Students who marked the homework as done
    #[serde(default)]
    pub student_confirmed_ids: BTreeSet<PersonId>,
    /// Parents who confirmed the homework for their child
    #[serde(default)]
    pub parent_confirmed_ids: BTreeSet<PersonId>,
}

/// Teacher's note on what was covered in a lesson
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonReport {
    pub id: LessonReportId,
    pub lesson_id: LessonId,
    pub class_id: ClassId,
    pub teacher_id: PersonId,
    pub topic: String,
    pub created_at: Timestamp,
}

/// Per-student grade and attendance for a lesson
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentLessonRecord {
    pub id: LessonRecordId,
    pub lesson_id: LessonId,
    pub class_id: ClassId,
    pub student_id: PersonId,
    pub grade: Option<u8>,
    pub present: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absence {
    pub id: AbsenceId,
    pub student_id: PersonId,
    pub lesson_id: Option<LessonId>,
    pub date: NaiveDate,
    pub reason: String,
    pub reported_by: PersonId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::types::Lang;

    #[test]
    fn test_hidden_subject() {
        let mut names = LocalizedNames::new();
        names.insert(Lang::En, "Music".to_string());
        let mut subject = Subject::new(names);
        assert!(!subject.is_hidden());
        assert!(subject.accepts_new_lessons());

        subject.archived = true;
        subject.archive_mode = Some(SubjectArchiveMode::ReadOnly);
        assert!(!subject.is_hidden());
        assert!(!subject.accepts_new_lessons());

        subject.archive_mode = Some(SubjectArchiveMode::Hidden);
        assert!(subject.is_hidden());
    }

    #[test]
    fn test_new_class_has_no_homeroom() {
        let class = ClassGroup::new(7, LocalizedNames::new());
        assert!(class.homeroom_teacher_id.is_none());
        assert!(!class.archived);
    }
}
