//! Custom assertions for engine results and filtered snapshots
//!
//! Each helper panics with the offending value so a failing test shows what
//! actually came back.

use crate::core_access::FilteredSnapshot;
use crate::core_store::model::{ClassId, LessonId, PersonId, SubjectId};
use crate::error::CoreError;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

fn expect_core_err<T: Debug>(result: Result<T, CoreError>, kind: &str) -> String {
    match result {
        Ok(value) => panic!("Expected {} error, got Ok: {:?}", kind, value),
        Err(e) if e.kind() == kind => e.to_string(),
        Err(e) => panic!("Expected {} error, got {:?}", kind, e),
    }
}

/// Assert an Unauthorized error and return its message
pub fn assert_unauthorized<T: Debug>(result: Result<T, CoreError>) -> String {
    expect_core_err(result, "unauthorized")
}

/// Assert a NotFound error and return its message
pub fn assert_not_found<T: Debug>(result: Result<T, CoreError>) -> String {
    expect_core_err(result, "not_found")
}

/// Assert a Validation error whose message contains `fragment`
pub fn assert_validation<T: Debug>(result: Result<T, CoreError>, fragment: &str) {
    let message = expect_core_err(result, "validation");
    if !message.contains(fragment) {
        panic!(
            "Validation message {:?} does not contain {:?}",
            message, fragment
        );
    }
}

/// Every person id a filtered snapshot mentions outside its person list
fn referenced_person_ids(snapshot: &FilteredSnapshot) -> Vec<(&'static str, PersonId)> {
    let data = &snapshot.data;
    let mut refs: Vec<(&'static str, PersonId)> = Vec::new();
    let mut add = |field: &'static str, id: &PersonId| refs.push((field, id.clone()));

    for p in &data.persons {
        p.child_ids.iter().for_each(|id| add("person.child_ids", id));
    }
    for c in &data.classes {
        if let Some(id) = &c.homeroom_teacher_id {
            add("class.homeroom_teacher_id", id);
        }
    }
    for l in &data.lessons {
        add("lesson.teacher_id", &l.teacher_id);
    }
    for h in &data.homework {
        add("homework.teacher_id", &h.teacher_id);
        h.student_confirmed_ids.iter().for_each(|id| add("homework.student_confirmed_ids", id));
        h.parent_confirmed_ids.iter().for_each(|id| add("homework.parent_confirmed_ids", id));
    }
    for r in &data.lesson_reports {
        add("lesson_report.teacher_id", &r.teacher_id);
    }
    for r in &data.student_lesson_records {
        add("lesson_record.student_id", &r.student_id);
    }
    for a in &data.absences {
        add("absence.student_id", &a.student_id);
        add("absence.reported_by", &a.reported_by);
    }
    for t in &data.threads {
        t.participant_ids.iter().for_each(|id| add("thread.participant_ids", id));
        if let Some(id) = &t.created_by {
            add("thread.created_by", id);
        }
    }
    for m in &data.messages {
        add("message.sender_id", &m.sender_id);
        m.read_by.iter().for_each(|id| add("message.read_by", id));
    }
    for f in &data.feedback {
        add("feedback.author_id", &f.author_id);
    }
    for a in &data.registration_applications {
        if let Some(id) = &a.reviewer_id {
            add("application.reviewer_id", id);
        }
        a.approved_user_ids.iter().for_each(|id| add("application.approved_user_ids", id));
        a.review_notes.iter().for_each(|n| add("application.review_notes", &n.author_id));
    }
    for r in &data.relation_requests {
        add("relation_request.parent_id", &r.parent_id);
        add("relation_request.student_id", &r.student_id);
        if let Some(id) = &r.reviewer_id {
            add("relation_request.reviewer_id", id);
        }
        r.review_notes.iter().for_each(|n| add("relation_request.review_notes", &n.author_id));
    }
    for s in &data.staff_schedules {
        add("staff_schedule.owner_id", &s.owner_id);
    }
    for s in &data.staff_schedule_exceptions {
        add("schedule_exception.owner_id", &s.owner_id);
    }
    for d in &data.devices {
        add("device.owner_id", &d.owner_id);
    }
    for n in &data.notifications {
        add("notification.recipient_id", &n.recipient_id);
    }
    for e in &data.admin_log {
        add("admin_log.actor_id", &e.actor_id);
    }
    refs
}

/// Class, subject and lesson ids a filtered snapshot mentions outside their own lists
#[derive(Default)]
struct RecordRefs {
    classes: Vec<(&'static str, ClassId)>,
    subjects: Vec<(&'static str, SubjectId)>,
    lessons: Vec<(&'static str, LessonId)>,
}

fn referenced_record_ids(snapshot: &FilteredSnapshot) -> RecordRefs {
    let data = &snapshot.data;
    let mut refs = RecordRefs::default();

    for p in &data.persons {
        p.class_ids.iter().for_each(|id| refs.classes.push(("person.class_ids", id.clone())));
    }
    for c in &data.classes {
        c.subject_ids.iter().for_each(|id| refs.subjects.push(("class.subject_ids", id.clone())));
    }
    for l in &data.lessons {
        refs.classes.push(("lesson.class_id", l.class_id.clone()));
        refs.subjects.push(("lesson.subject_id", l.subject_id.clone()));
        if let Some(id) = &l.original_id {
            refs.lessons.push(("lesson.original_id", id.clone()));
        }
    }
    for h in &data.homework {
        refs.classes.push(("homework.class_id", h.class_id.clone()));
        refs.lessons.push(("homework.lesson_id", h.lesson_id.clone()));
    }
    for r in &data.lesson_reports {
        refs.classes.push(("lesson_report.class_id", r.class_id.clone()));
        refs.lessons.push(("lesson_report.lesson_id", r.lesson_id.clone()));
    }
    for r in &data.student_lesson_records {
        refs.classes.push(("lesson_record.class_id", r.class_id.clone()));
        refs.lessons.push(("lesson_record.lesson_id", r.lesson_id.clone()));
    }
    for a in &data.absences {
        if let Some(id) = &a.lesson_id {
            refs.lessons.push(("absence.lesson_id", id.clone()));
        }
    }
    for t in &data.threads {
        if let Some(id) = &t.class_id {
            refs.classes.push(("thread.class_id", id.clone()));
        }
    }
    for f in &data.feedback {
        if let Some(id) = &f.class_id {
            refs.classes.push(("feedback.class_id", id.clone()));
        }
    }
    for a in &data.registration_applications {
        a.assigned_class_ids
            .iter()
            .for_each(|id| refs.classes.push(("application.assigned_class_ids", id.clone())));
    }
    refs
}

fn check_kept<Id: Ord + Debug>(
    snapshot: &FilteredSnapshot,
    kind: &str,
    kept: BTreeSet<&Id>,
    refs: &[(&'static str, Id)],
    is_redacted: impl Fn(&Id) -> bool,
) {
    for (field, id) in refs {
        if !is_redacted(id) && !kept.contains(id) {
            panic!(
                "Snapshot for {} leaks {} {:?} through {}",
                snapshot.viewer_id, kind, id, field
            );
        }
    }
}

/// Assert that a snapshot never names a person, class, subject or lesson it
/// does not include
///
/// Redacted placeholders are allowed; password hashes must be blank.
pub fn assert_no_leakage(snapshot: &FilteredSnapshot) {
    let visible: BTreeSet<&PersonId> = snapshot.data.persons.iter().map(|p| &p.id).collect();

    for person in &snapshot.data.persons {
        if !person.password_hash.is_empty() {
            panic!("Password hash of {} leaked into snapshot", person.id);
        }
    }
    for (field, id) in referenced_person_ids(snapshot) {
        if !id.is_redacted() && !visible.contains(&id) {
            panic!(
                "Snapshot for {} leaks person {} through {}",
                snapshot.viewer_id, id, field
            );
        }
    }

    let data = &snapshot.data;
    let refs = referenced_record_ids(snapshot);
    let classes: BTreeSet<&ClassId> = data.classes.iter().map(|c| &c.id).collect();
    let subjects: BTreeSet<&SubjectId> = data.subjects.iter().map(|s| &s.id).collect();
    let lessons: BTreeSet<&LessonId> = data.lessons.iter().map(|l| &l.id).collect();
    check_kept(snapshot, "class", classes, &refs.classes, ClassId::is_redacted);
    check_kept(snapshot, "subject", subjects, &refs.subjects, SubjectId::is_redacted);
    check_kept(snapshot, "lesson", lessons, &refs.lessons, LessonId::is_redacted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::{Person, Role, Thread, ThreadKind};
    use crate::core_store::StoreSnapshot;

    fn snapshot_with(persons: Vec<Person>, threads: Vec<Thread>) -> FilteredSnapshot {
        FilteredSnapshot {
            viewer_id: persons[0].id.clone(),
            data: StoreSnapshot {
                persons,
                threads,
                ..StoreSnapshot::default()
            },
        }
    }

    #[test]
    fn test_assert_ok() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(assert_ok(result), 42);
    }

    #[test]
    fn test_assert_kinds() {
        assert_unauthorized::<()>(Err(CoreError::unauthorized("no")));
        assert_not_found::<()>(Err(CoreError::not_found("gone")));
        assert_validation::<()>(Err(CoreError::validation("request already pending")), "pending");
    }

    #[test]
    #[should_panic(expected = "Expected validation error")]
    fn test_assert_validation_rejects_other_kind() {
        assert_validation::<()>(Err(CoreError::unauthorized("no")), "no");
    }

    #[test]
    fn test_redacted_reference_is_not_leakage() {
        let mut viewer = Person::new("V", "v", "", Role::Student);
        viewer.password_hash.clear();
        let thread = Thread::new(
            ThreadKind::Direct,
            [viewer.id.clone(), PersonId::redacted()].into(),
        );
        assert_no_leakage(&snapshot_with(vec![viewer], vec![thread]));
    }

    #[test]
    #[should_panic(expected = "leaks person")]
    fn test_unknown_reference_is_leakage() {
        let viewer = Person::new("V", "v", "", Role::Student);
        let thread = Thread::new(
            ThreadKind::Direct,
            [viewer.id.clone(), PersonId::new("stranger")].into(),
        );
        assert_no_leakage(&snapshot_with(vec![viewer], vec![thread]));
    }

    #[test]
    #[should_panic(expected = "leaks class")]
    fn test_unknown_class_membership_is_leakage() {
        let mut viewer = Person::new("V", "v", "", Role::Staff);
        viewer.class_ids.insert(ClassId::new("7a"));
        assert_no_leakage(&snapshot_with(vec![viewer], Vec::new()));
    }

    #[test]
    #[should_panic(expected = "Password hash")]
    fn test_password_hash_is_leakage() {
        let viewer = Person::new("V", "v", "$argon2id$...", Role::Student);
        assert_no_leakage(&snapshot_with(vec![viewer], Vec::new()));
    }
}
