/*
    visibility.rs - Per-viewer filtering of the store

    `resolve_snapshot` is pure: it reads the store and builds a detached copy
    holding only what the viewer may see. After filtering, every person
    reference inside an included record is rewritten so it never names a
    person outside the visible set:
    - id sets are intersected with the visible set
    - single references become `PersonId::redacted()`
    - a class's homeroom teacher becomes `None`
    Class, subject and lesson references get the same treatment against
    the records the snapshot kept. Password hashes are blanked for everyone.
*/

use crate::core_store::model::*;
use crate::core_store::{RecordStore, StoreSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Store contents visible to one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredSnapshot {
    pub viewer_id: PersonId,
    #[serde(flatten)]
    pub data: StoreSnapshot,
}

impl FilteredSnapshot {
    pub fn person(&self, id: &PersonId) -> Option<&Person> {
        self.data.persons.iter().find(|p| &p.id == id)
    }

    pub fn contains_person(&self, id: &PersonId) -> bool {
        self.person(id).is_some()
    }

    pub fn thread(&self, id: &ThreadId) -> Option<&Thread> {
        self.data.threads.iter().find(|t| &t.id == id)
    }

    pub fn messages_in(&self, thread_id: &ThreadId) -> Vec<&Message> {
        self.data
            .messages
            .iter()
            .filter(|m| &m.thread_id == thread_id)
            .collect()
    }
}

/// Ids of everyone `viewer` may see
pub fn visible_person_ids(viewer: &Person, store: &RecordStore) -> BTreeSet<PersonId> {
    let persons = store.all::<Person>();
    let mut visible = BTreeSet::new();
    visible.insert(viewer.id.clone());

    match viewer.role {
        Role::Director | Role::Administrator => {
            visible.extend(persons.iter().map(|p| p.id.clone()));
        }
        Role::Teacher => {
            let students: BTreeSet<&PersonId> = persons
                .iter()
                .filter(|p| p.role == Role::Student && viewer.shares_class_with(p))
                .map(|p| &p.id)
                .collect();
            for p in persons {
                let include = match p.role {
                    Role::Student => students.contains(&p.id),
                    Role::Teacher => viewer.shares_class_with(p),
                    Role::Parent => p.child_ids.iter().any(|c| students.contains(c)),
                    Role::Director | Role::Staff => true,
                    Role::Administrator => false,
                };
                if include {
                    visible.insert(p.id.clone());
                }
            }
        }
        Role::Student => {
            for p in persons {
                let include = match p.role {
                    Role::Student | Role::Teacher => viewer.shares_class_with(p),
                    Role::Director | Role::Staff => true,
                    Role::Parent | Role::Administrator => false,
                };
                if include {
                    visible.insert(p.id.clone());
                }
            }
        }
        Role::Staff => {
            for p in persons {
                if matches!(p.role, Role::Teacher | Role::Director | Role::Student) {
                    visible.insert(p.id.clone());
                }
            }
        }
        Role::Parent => {
            let children: Vec<&Person> = persons
                .iter()
                .filter(|p| viewer.child_ids.contains(&p.id))
                .collect();
            for p in persons {
                let include = match p.role {
                    Role::Student => viewer.child_ids.contains(&p.id),
                    Role::Teacher => children.iter().any(|c| c.shares_class_with(p)),
                    Role::Director | Role::Staff => true,
                    Role::Parent | Role::Administrator => false,
                };
                if include {
                    visible.insert(p.id.clone());
                }
            }
        }
    }

    visible
}

/// Classes whose timetable and homework `viewer` may see
pub fn accessible_class_ids(viewer: &Person, store: &RecordStore) -> BTreeSet<ClassId> {
    match viewer.role {
        Role::Director | Role::Administrator => store
            .all::<ClassGroup>()
            .iter()
            .map(|c| c.id.clone())
            .collect(),
        Role::Parent => store
            .all::<Person>()
            .iter()
            .filter(|p| viewer.child_ids.contains(&p.id))
            .flat_map(|child| child.class_ids.iter().cloned())
            .collect(),
        _ => viewer.class_ids.clone(),
    }
}

fn thread_visible(viewer: &Person, thread: &Thread, store: &RecordStore) -> bool {
    match viewer.role {
        Role::Director => true,
        Role::Administrator => {
            thread.kind == ThreadKind::Direct
                && thread.has_participant(&viewer.id)
                && thread.participant_ids.iter().any(|id| {
                    id != &viewer.id
                        && store
                            .get::<Person>(id)
                            .map(|p| p.role == Role::Director)
                            .unwrap_or(false)
                })
        }
        _ => thread.has_participant(&viewer.id),
    }
}

fn feedback_visible(
    viewer: &Person,
    item: &Feedback,
    classes: &BTreeSet<ClassId>,
    store: &RecordStore,
) -> bool {
    if viewer.role == Role::Administrator {
        return false;
    }
    if item.author_id == viewer.id {
        return true;
    }
    if item.is_private || !item.visibility_roles.contains(&viewer.role) {
        return false;
    }
    if viewer.role.is_elevated() || !matches!(item.author_role, Role::Teacher | Role::Student) {
        return true;
    }

    let class_shared = item
        .class_id
        .as_ref()
        .map(|c| classes.contains(c))
        .unwrap_or(false);
    let author_shared = store
        .get::<Person>(&item.author_id)
        .map(|author| !author.class_ids.is_disjoint(classes))
        .unwrap_or(false);
    class_shared || author_shared
}

fn relation_request_visible(
    viewer: &Person,
    request: &ParentStudentRelationRequest,
    store: &RecordStore,
) -> bool {
    match viewer.role {
        Role::Director | Role::Administrator => true,
        Role::Parent => request.parent_id == viewer.id,
        Role::Teacher if viewer.is_homeroom => store
            .get::<Person>(&request.student_id)
            .map(|student| {
                student.class_ids.iter().any(|class_id| {
                    store
                        .get::<ClassGroup>(class_id)
                        .and_then(|c| c.homeroom_teacher_id.as_ref())
                        == Some(&viewer.id)
                })
            })
            .unwrap_or(false),
        _ => false,
    }
}

/// Whether `viewer` may see grades and absences of `student_id`
fn student_record_visible(
    viewer: &Person,
    student_id: &PersonId,
    classes: &BTreeSet<ClassId>,
    store: &RecordStore,
) -> bool {
    match viewer.role {
        Role::Director | Role::Administrator => true,
        Role::Teacher => store
            .get::<Person>(student_id)
            .map(|s| !s.class_ids.is_disjoint(classes))
            .unwrap_or(false),
        Role::Student => student_id == &viewer.id,
        Role::Parent => viewer.child_ids.contains(student_id),
        Role::Staff => false,
    }
}

/// Ids of the records a filtered snapshot kept
struct Kept {
    classes: BTreeSet<ClassId>,
    subjects: BTreeSet<SubjectId>,
    lessons: BTreeSet<LessonId>,
}

impl Kept {
    fn of(data: &StoreSnapshot) -> Self {
        Kept {
            classes: data.classes.iter().map(|c| c.id.clone()).collect(),
            subjects: data.subjects.iter().map(|s| s.id.clone()).collect(),
            lessons: data.lessons.iter().map(|l| l.id.clone()).collect(),
        }
    }

    fn class(&self, id: &mut ClassId) {
        if !self.classes.contains(id) {
            *id = ClassId::redacted();
        }
    }

    fn class_opt(&self, id: &mut Option<ClassId>) {
        if id.as_ref().is_some_and(|c| !self.classes.contains(c)) {
            *id = None;
        }
    }

    fn lesson(&self, id: &mut LessonId) {
        if !self.lessons.contains(id) {
            *id = LessonId::redacted();
        }
    }

    fn lesson_opt(&self, id: &mut Option<LessonId>) {
        if id.as_ref().is_some_and(|l| !self.lessons.contains(l)) {
            *id = None;
        }
    }

    fn subject(&self, id: &mut SubjectId) {
        if !self.subjects.contains(id) {
            *id = SubjectId::redacted();
        }
    }
}

struct Redactor<'a> {
    visible: &'a BTreeSet<PersonId>,
}

impl Redactor<'_> {
    fn one(&self, id: &mut PersonId) {
        if !self.visible.contains(id) {
            *id = PersonId::redacted();
        }
    }

    fn opt(&self, id: &mut Option<PersonId>) {
        if let Some(inner) = id.as_mut() {
            self.one(inner);
        }
    }

    fn set(&self, ids: &mut BTreeSet<PersonId>) {
        ids.retain(|id| self.visible.contains(id));
    }

    fn list(&self, ids: &mut Vec<PersonId>) {
        ids.retain(|id| self.visible.contains(id));
    }

    fn notes(&self, notes: &mut [ReviewNote]) {
        for note in notes {
            self.one(&mut note.author_id);
        }
    }

    fn apply(&self, data: &mut StoreSnapshot) {
        let kept = Kept::of(data);

        for p in &mut data.persons {
            p.password_hash.clear();
            self.set(&mut p.child_ids);
            p.class_ids.retain(|c| kept.classes.contains(c));
        }
        for c in &mut data.classes {
            if let Some(id) = &c.homeroom_teacher_id {
                if !self.visible.contains(id) {
                    c.homeroom_teacher_id = None;
                }
            }
            c.subject_ids.retain(|s| kept.subjects.contains(s));
        }
        for l in &mut data.lessons {
            self.one(&mut l.teacher_id);
            kept.subject(&mut l.subject_id);
            kept.lesson_opt(&mut l.original_id);
        }
        for h in &mut data.homework {
            self.one(&mut h.teacher_id);
            self.set(&mut h.student_confirmed_ids);
            self.set(&mut h.parent_confirmed_ids);
            kept.lesson(&mut h.lesson_id);
        }
        for r in &mut data.lesson_reports {
            self.one(&mut r.teacher_id);
            kept.lesson(&mut r.lesson_id);
        }
        for r in &mut data.student_lesson_records {
            self.one(&mut r.student_id);
            kept.lesson(&mut r.lesson_id);
            kept.class(&mut r.class_id);
        }
        for a in &mut data.absences {
            self.one(&mut a.student_id);
            self.one(&mut a.reported_by);
            kept.lesson_opt(&mut a.lesson_id);
        }
        for t in &mut data.threads {
            self.set(&mut t.participant_ids);
            self.opt(&mut t.created_by);
            kept.class_opt(&mut t.class_id);
        }
        for m in &mut data.messages {
            self.one(&mut m.sender_id);
            self.set(&mut m.read_by);
        }
        for f in &mut data.feedback {
            self.one(&mut f.author_id);
            kept.class_opt(&mut f.class_id);
        }
        for a in &mut data.registration_applications {
            self.opt(&mut a.reviewer_id);
            self.list(&mut a.approved_user_ids);
            self.notes(&mut a.review_notes);
            a.assigned_class_ids.retain(|c| kept.classes.contains(c));
        }
        for r in &mut data.relation_requests {
            self.one(&mut r.parent_id);
            self.one(&mut r.student_id);
            self.opt(&mut r.reviewer_id);
            self.notes(&mut r.review_notes);
        }
        for s in &mut data.staff_schedules {
            self.one(&mut s.owner_id);
        }
        for s in &mut data.staff_schedule_exceptions {
            self.one(&mut s.owner_id);
        }
        for d in &mut data.devices {
            self.one(&mut d.owner_id);
        }
        for n in &mut data.notifications {
            self.one(&mut n.recipient_id);
        }
        for e in &mut data.admin_log {
            self.one(&mut e.actor_id);
        }
    }
}

fn keep<T: Clone, F>(items: &[T], predicate: F) -> Vec<T>
where
    F: Fn(&T) -> bool,
{
    items.iter().filter(|item| predicate(item)).cloned().collect()
}

/// Build the snapshot `viewer` is allowed to see
pub fn resolve_snapshot(viewer: &Person, store: &RecordStore) -> FilteredSnapshot {
    let source = store.snapshot();
    let elevated = viewer.role.is_elevated();
    let visible = visible_person_ids(viewer, store);
    let classes = accessible_class_ids(viewer, store);

    let threads = keep(&source.threads, |t| thread_visible(viewer, t, store));
    let thread_ids: BTreeSet<&ThreadId> = threads.iter().map(|t| &t.id).collect();
    let messages = keep(&source.messages, |m| thread_ids.contains(&m.thread_id));

    let mut data = StoreSnapshot {
        schema_version: source.schema_version,
        persons: keep(&source.persons, |p| visible.contains(&p.id)),
        classes: keep(&source.classes, |c| classes.contains(&c.id)),
        subjects: keep(&source.subjects, |s| elevated || !s.is_hidden()),
        lessons: keep(&source.lessons, |l| classes.contains(&l.class_id)),
        homework: keep(&source.homework, |h| classes.contains(&h.class_id)),
        lesson_reports: keep(&source.lesson_reports, |r| classes.contains(&r.class_id)),
        student_lesson_records: keep(&source.student_lesson_records, |r| {
            student_record_visible(viewer, &r.student_id, &classes, store)
        }),
        absences: keep(&source.absences, |a| {
            student_record_visible(viewer, &a.student_id, &classes, store)
        }),
        threads,
        messages,
        feedback: keep(&source.feedback, |f| feedback_visible(viewer, f, &classes, store)),
        registration_applications: if elevated {
            source.registration_applications.clone()
        } else {
            Vec::new()
        },
        relation_requests: keep(&source.relation_requests, |r| {
            relation_request_visible(viewer, r, store)
        }),
        staff_schedules: keep(&source.staff_schedules, |s| elevated || s.owner_id == viewer.id),
        staff_schedule_exceptions: keep(&source.staff_schedule_exceptions, |s| {
            elevated || s.owner_id == viewer.id
        }),
        devices: keep(&source.devices, |d| d.owner_id == viewer.id),
        notifications: keep(&source.notifications, |n| n.recipient_id == viewer.id),
        admin_log: if elevated {
            source.admin_log.clone()
        } else {
            Vec::new()
        },
    };

    Redactor { visible: &visible }.apply(&mut data);

    FilteredSnapshot {
        viewer_id: viewer.id.clone(),
        data,
    }
}
