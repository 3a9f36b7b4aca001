/*
    record_store.rs - In-memory record store

    Holds every entity collection and exposes structural primitives only:
    get / find / insert / update / remove plus a deep-copy snapshot.
    No authorization logic lives here; the engine runs guards before it
    touches the store.
*/

use crate::core_store::model::*;
use crate::core_store::store::errors::{StoreError, StoreResult};
use crate::core_store::store::snapshot::StoreSnapshot;
use std::fmt;

/// A record type that lives in one collection of the store
pub trait Entity: Clone + Sized {
    type Id: PartialEq + Clone + fmt::Display;

    /// Human-readable collection name used in errors
    const KIND: &'static str;

    fn id(&self) -> &Self::Id;

    fn collection(snapshot: &StoreSnapshot) -> &Vec<Self>;

    fn collection_mut(snapshot: &mut StoreSnapshot) -> &mut Vec<Self>;
}

macro_rules! stored_entity {
    ($ty:ty, $id:ty, $field:ident, $kind:literal) => {
        impl Entity for $ty {
            type Id = $id;
            const KIND: &'static str = $kind;

            fn id(&self) -> &Self::Id {
                &self.id
            }

            fn collection(snapshot: &StoreSnapshot) -> &Vec<Self> {
                &snapshot.$field
            }

            fn collection_mut(snapshot: &mut StoreSnapshot) -> &mut Vec<Self> {
                &mut snapshot.$field
            }
        }
    };
}

stored_entity!(Person, PersonId, persons, "person");
stored_entity!(ClassGroup, ClassId, classes, "class");
stored_entity!(Subject, SubjectId, subjects, "subject");
stored_entity!(Lesson, LessonId, lessons, "lesson");
stored_entity!(Homework, HomeworkId, homework, "homework");
stored_entity!(LessonReport, LessonReportId, lesson_reports, "lesson report");
stored_entity!(StudentLessonRecord, LessonRecordId, student_lesson_records, "lesson record");
stored_entity!(Absence, AbsenceId, absences, "absence");
stored_entity!(Thread, ThreadId, threads, "thread");
stored_entity!(Message, MessageId, messages, "message");
stored_entity!(Feedback, FeedbackId, feedback, "feedback");
stored_entity!(RegistrationApplication, ApplicationId, registration_applications, "application");
stored_entity!(ParentStudentRelationRequest, RelationRequestId, relation_requests, "relation request");
stored_entity!(StaffSchedule, ScheduleId, staff_schedules, "staff schedule");
stored_entity!(StaffScheduleException, ScheduleId, staff_schedule_exceptions, "schedule exception");
stored_entity!(Device, DeviceId, devices, "device");
stored_entity!(Notification, NotificationId, notifications, "notification");
stored_entity!(AdminLogEntry, LogEntryId, admin_log, "log entry");

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub persons_count: usize,
    pub threads_count: usize,
    pub messages_count: usize,
    pub record_count: usize,
}

/// Owned, injectable record store
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    data: StoreSnapshot,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        RecordStore::default()
    }

    /// Create a store holding the given collections
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        RecordStore { data: snapshot }
    }

    /// Parse a serialized document into a store
    pub fn from_serialized(text: &str) -> StoreResult<Self> {
        Ok(RecordStore::from_snapshot(StoreSnapshot::from_serialized(text)?))
    }

    /// Canonical serialized form of the current state
    pub fn to_serialized(&self) -> StoreResult<String> {
        self.data.to_serialized()
    }

    /// Read-only view of the live collections
    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.data
    }

    /// Deep copy of every collection; the copy shares nothing with live state
    pub fn clone_snapshot(&self) -> StoreSnapshot {
        self.data.clone()
    }

    /// Swap in a whole new state (startup reconciliation)
    pub fn replace_all(&mut self, snapshot: StoreSnapshot) {
        self.data = snapshot;
    }

    pub fn all<T: Entity>(&self) -> &[T] {
        T::collection(&self.data)
    }

    pub fn get<T: Entity>(&self, id: &T::Id) -> Option<&T> {
        T::collection(&self.data).iter().find(|item| item.id() == id)
    }

    pub fn get_mut<T: Entity>(&mut self, id: &T::Id) -> Option<&mut T> {
        T::collection_mut(&mut self.data)
            .iter_mut()
            .find(|item| item.id() == id)
    }

    /// Like `get`, but a missing record is an error
    pub fn require<T: Entity>(&self, id: &T::Id) -> StoreResult<&T> {
        self.get(id).ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    pub fn contains<T: Entity>(&self, id: &T::Id) -> bool {
        self.get::<T>(id).is_some()
    }

    pub fn find<T: Entity, F>(&self, predicate: F) -> Option<&T>
    where
        F: Fn(&T) -> bool,
    {
        T::collection(&self.data).iter().find(|item| predicate(item))
    }

    pub fn filter<T: Entity, F>(&self, predicate: F) -> Vec<&T>
    where
        F: Fn(&T) -> bool,
    {
        T::collection(&self.data)
            .iter()
            .filter(|item| predicate(item))
            .collect()
    }

    /// Append a record; ids are unique per collection
    pub fn insert<T: Entity>(&mut self, item: T) -> StoreResult<()> {
        self.ensure_absent(&item)?;
        T::collection_mut(&mut self.data).push(item);
        Ok(())
    }

    /// Insert at the front, for newest-first logs
    pub fn prepend<T: Entity>(&mut self, item: T) -> StoreResult<()> {
        self.ensure_absent(&item)?;
        T::collection_mut(&mut self.data).insert(0, item);
        Ok(())
    }

    fn ensure_absent<T: Entity>(&self, item: &T) -> StoreResult<()> {
        if self.contains::<T>(item.id()) {
            return Err(StoreError::Duplicate {
                kind: T::KIND,
                id: item.id().to_string(),
            });
        }
        Ok(())
    }

    /// Mutate a record in place
    pub fn update<T: Entity, F>(&mut self, id: &T::Id, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut T),
    {
        let item = self.get_mut::<T>(id).ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })?;
        mutate(item);
        Ok(())
    }

    /// Insert or overwrite by id, keeping the position of an existing record
    pub fn upsert<T: Entity>(&mut self, item: T) {
        match self.get_mut::<T>(item.id()) {
            Some(existing) => *existing = item,
            None => T::collection_mut(&mut self.data).push(item),
        }
    }

    pub fn remove<T: Entity>(&mut self, id: &T::Id) -> Option<T> {
        let collection = T::collection_mut(&mut self.data);
        let position = collection.iter().position(|item| item.id() == id)?;
        Some(collection.remove(position))
    }

    /// Drop every record matching the predicate, returning how many went
    pub fn remove_where<T: Entity, F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        let collection = T::collection_mut(&mut self.data);
        let before = collection.len();
        collection.retain(|item| !predicate(item));
        before - collection.len()
    }

    pub fn person_by_login(&self, login: &str) -> Option<&Person> {
        let login = login.trim().to_lowercase();
        self.find::<Person, _>(|p| p.login == login)
    }

    /// Get storage statistics
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            persons_count: self.data.persons.len(),
            threads_count: self.data.threads.len(),
            messages_count: self.data.messages.len(),
            record_count: self.data.record_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(login: &str) -> Person {
        Person::new(login, login, "hash", Role::Student)
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = RecordStore::new();
        let person = student("amir");
        let id = person.id.clone();

        store.insert(person).unwrap();

        let fetched = store.get::<Person>(&id).unwrap();
        assert_eq!(fetched.login, "amir");
        assert_eq!(store.stats().persons_count, 1);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = RecordStore::new();
        let person = student("amir");
        store.insert(person.clone()).unwrap();

        let err = store.insert(person).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { kind: "person", .. }));
    }

    #[test]
    fn test_require_missing_is_not_found() {
        let store = RecordStore::new();
        let err = store.require::<Lesson>(&LessonId::new("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "lesson", .. }));
    }

    #[test]
    fn test_update_in_place() {
        let mut store = RecordStore::new();
        let person = student("amir");
        let id = person.id.clone();
        store.insert(person).unwrap();

        store
            .update::<Person, _>(&id, |p| p.blocked = true)
            .unwrap();
        assert!(store.get::<Person>(&id).unwrap().blocked);
    }

    #[test]
    fn test_prepend_keeps_newest_first() {
        let mut store = RecordStore::new();
        for title in ["first", "second"] {
            store
                .prepend(Notification {
                    id: NotificationId::generate(),
                    recipient_id: PersonId::new("p"),
                    kind: NotificationKind::Announcement,
                    title: title.to_string(),
                    body: String::new(),
                    created_at: Timestamp::now(),
                    read: false,
                })
                .unwrap();
        }
        let titles: Vec<_> = store
            .all::<Notification>()
            .iter()
            .map(|n| n.title.as_str())
            .collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn test_remove_where_counts() {
        let mut store = RecordStore::new();
        store.insert(student("a")).unwrap();
        store.insert(student("b")).unwrap();
        store.insert(student("c")).unwrap();

        let removed = store.remove_where::<Person, _>(|p| p.login != "b");
        assert_eq!(removed, 2);
        assert_eq!(store.all::<Person>().len(), 1);
    }

    #[test]
    fn test_clone_snapshot_is_detached() {
        let mut store = RecordStore::new();
        let person = student("a");
        let id = person.id.clone();
        store.insert(person).unwrap();

        let copy = store.clone_snapshot();
        store.update::<Person, _>(&id, |p| p.name = "changed".into()).unwrap();

        assert_eq!(copy.persons[0].name, "a");
    }

    #[test]
    fn test_serialized_round_trip() {
        let mut store = RecordStore::new();
        let mut person = student("a");
        person.class_ids.insert(ClassId::new("c1"));
        store.insert(person).unwrap();

        let text = store.to_serialized().unwrap();
        let loaded = RecordStore::from_serialized(&text).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
    }

    #[test]
    fn test_person_by_login_is_case_insensitive() {
        let mut store = RecordStore::new();
        store.insert(student("amir")).unwrap();
        assert!(store.person_by_login(" AMIR ").is_some());
        assert!(store.person_by_login("bob").is_none());
    }
}
