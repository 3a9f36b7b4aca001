/*
    snapshot.rs - Serializable form of the whole store

    One document holds every collection as an ordered list of records.
    Sets and maps inside records are ordered, so serializing the same state
    always yields the same text; the sync coordinator relies on that to skip
    redundant writes.

    Features:
    - Structural validation of externally supplied documents
    - Atomic cache file writes (write to temp, then rename)
*/

use crate::core_store::model::*;
use crate::core_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};

/// Current document layout version
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Every collection of the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub classes: Vec<ClassGroup>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub homework: Vec<Homework>,
    #[serde(default)]
    pub lesson_reports: Vec<LessonReport>,
    #[serde(default)]
    pub student_lesson_records: Vec<StudentLessonRecord>,
    #[serde(default)]
    pub absences: Vec<Absence>,
    #[serde(default)]
    pub threads: Vec<Thread>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
    #[serde(default)]
    pub registration_applications: Vec<RegistrationApplication>,
    #[serde(default)]
    pub relation_requests: Vec<ParentStudentRelationRequest>,
    #[serde(default)]
    pub staff_schedules: Vec<StaffSchedule>,
    #[serde(default)]
    pub staff_schedule_exceptions: Vec<StaffScheduleException>,
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Newest first
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Newest first
    #[serde(default)]
    pub admin_log: Vec<AdminLogEntry>,
}

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        StoreSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            persons: Vec::new(),
            classes: Vec::new(),
            subjects: Vec::new(),
            lessons: Vec::new(),
            homework: Vec::new(),
            lesson_reports: Vec::new(),
            student_lesson_records: Vec::new(),
            absences: Vec::new(),
            threads: Vec::new(),
            messages: Vec::new(),
            feedback: Vec::new(),
            registration_applications: Vec::new(),
            relation_requests: Vec::new(),
            staff_schedules: Vec::new(),
            staff_schedule_exceptions: Vec::new(),
            devices: Vec::new(),
            notifications: Vec::new(),
            admin_log: Vec::new(),
        }
    }
}

fn check_unique<'a, T, K, F>(items: &'a [T], kind: &str, key: F) -> StoreResult<()>
where
    F: Fn(&'a T) -> &'a K,
    K: Eq + Hash + std::fmt::Display + 'a,
{
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let id = key(item);
        if !seen.insert(id) {
            return Err(StoreError::CorruptedData(format!("duplicate {} id {}", kind, id)));
        }
    }
    Ok(())
}

impl StoreSnapshot {
    /// Serialize to the canonical textual form
    pub fn to_serialized(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Parse and structurally validate a document
    pub fn from_serialized(text: &str) -> StoreResult<Self> {
        let snapshot: StoreSnapshot = serde_json::from_str(text)?;
        snapshot.validate_structure()?;
        Ok(snapshot)
    }

    /// Reject documents a store must never hold
    pub fn validate_structure(&self) -> StoreResult<()> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(StoreError::CorruptedData(format!(
                "unsupported schema version {}",
                self.schema_version
            )));
        }

        check_unique(&self.persons, "person", |p| &p.id)?;
        check_unique(&self.classes, "class", |c| &c.id)?;
        check_unique(&self.subjects, "subject", |s| &s.id)?;
        check_unique(&self.lessons, "lesson", |l| &l.id)?;
        check_unique(&self.homework, "homework", |h| &h.id)?;
        check_unique(&self.lesson_reports, "lesson report", |r| &r.id)?;
        check_unique(&self.student_lesson_records, "lesson record", |r| &r.id)?;
        check_unique(&self.absences, "absence", |a| &a.id)?;
        check_unique(&self.threads, "thread", |t| &t.id)?;
        check_unique(&self.messages, "message", |m| &m.id)?;
        check_unique(&self.feedback, "feedback", |f| &f.id)?;
        check_unique(&self.registration_applications, "application", |a| &a.id)?;
        check_unique(&self.relation_requests, "relation request", |r| &r.id)?;
        check_unique(&self.staff_schedules, "staff schedule", |s| &s.id)?;
        check_unique(&self.staff_schedule_exceptions, "schedule exception", |s| &s.id)?;
        check_unique(&self.devices, "device", |d| &d.id)?;
        check_unique(&self.notifications, "notification", |n| &n.id)?;
        check_unique(&self.admin_log, "log entry", |e| &e.id)?;

        let thread_ids: HashSet<&ThreadId> = self.threads.iter().map(|t| &t.id).collect();
        if let Some(orphan) = self.messages.iter().find(|m| !thread_ids.contains(&m.thread_id)) {
            return Err(StoreError::CorruptedData(format!(
                "message {} references missing thread {}",
                orphan.id, orphan.thread_id
            )));
        }

        let lesson_ids: HashSet<&LessonId> = self.lessons.iter().map(|l| &l.id).collect();
        if let Some(orphan) = self.homework.iter().find(|h| !lesson_ids.contains(&h.lesson_id)) {
            return Err(StoreError::CorruptedData(format!(
                "homework {} references missing lesson {}",
                orphan.id, orphan.lesson_id
            )));
        }

        Ok(())
    }

    /// Total number of records across all collections
    pub fn record_count(&self) -> usize {
        self.persons.len()
            + self.classes.len()
            + self.subjects.len()
            + self.lessons.len()
            + self.homework.len()
            + self.lesson_reports.len()
            + self.student_lesson_records.len()
            + self.absences.len()
            + self.threads.len()
            + self.messages.len()
            + self.feedback.len()
            + self.registration_applications.len()
            + self.relation_requests.len()
            + self.staff_schedules.len()
            + self.staff_schedule_exceptions.len()
            + self.devices.len()
            + self.notifications.len()
            + self.admin_log.len()
    }
}

/// Local cache file holding the serialized store
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached text, `None` if no cache exists yet
    pub async fn read(&self) -> StoreResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the cache atomically
    pub async fn write(&self, text: &str) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, text.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
