/*
    threads.rs - Thread lifecycle and message posting

    All functions here are synchronous store mutations. Anything that needs
    an external service (language detection, attachment persistence) is
    resolved by the caller beforehand and passed in as plain values.

    Uniqueness:
    - one Class thread per class id
    - one Direct thread per unordered pair
    - one ParentTeacher thread per (teacher, parent)
*/

use crate::core_store::model::*;
use crate::core_store::RecordStore;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeSet;

/// Active class members plus parents of the class's students
pub fn class_participants(store: &RecordStore, class_id: &ClassId) -> BTreeSet<PersonId> {
    let members: Vec<&Person> = store.filter::<Person, _>(|p| p.active && p.is_in_class(class_id));
    let student_ids: BTreeSet<&PersonId> = members
        .iter()
        .filter(|p| p.role == Role::Student)
        .map(|p| &p.id)
        .collect();

    let mut participants: BTreeSet<PersonId> = members.iter().map(|p| p.id.clone()).collect();
    for parent in store.filter::<Person, _>(|p| p.role == Role::Parent && p.active) {
        if parent.child_ids.iter().any(|c| student_ids.contains(c)) {
            participants.insert(parent.id.clone());
        }
    }
    participants
}

pub fn find_class_thread<'a>(store: &'a RecordStore, class_id: &ClassId) -> Option<&'a Thread> {
    store.find::<Thread, _>(|t| t.kind == ThreadKind::Class && t.class_id.as_ref() == Some(class_id))
}

/// Find or create the class thread, adding any missing participants
pub fn ensure_class_thread(
    store: &mut RecordStore,
    class_id: &ClassId,
    now: Timestamp,
) -> CoreResult<ThreadId> {
    store.require::<ClassGroup>(class_id)?;
    let participants = class_participants(store, class_id);

    if let Some(existing) = find_class_thread(store, class_id) {
        let id = existing.id.clone();
        store.update::<Thread, _>(&id, |t| t.participant_ids.extend(participants))?;
        return Ok(id);
    }

    let mut thread = Thread::new(ThreadKind::Class, participants);
    thread.class_id = Some(class_id.clone());
    thread.created_at = now;
    let id = thread.id.clone();
    store.insert(thread)?;

    tracing::debug!(class_id = %class_id, thread_id = %id, "Created class thread");
    Ok(id)
}

/// Add `person_id` to the class thread of every class in `class_ids`
pub fn join_class_threads<'a, I>(
    store: &mut RecordStore,
    person_id: &PersonId,
    class_ids: I,
    now: Timestamp,
) -> CoreResult<()>
where
    I: IntoIterator<Item = &'a ClassId>,
{
    for class_id in class_ids {
        let thread_id = ensure_class_thread(store, class_id, now)?;
        store.update::<Thread, _>(&thread_id, |t| {
            t.participant_ids.insert(person_id.clone());
        })?;
    }
    Ok(())
}

fn has_child_in_class(store: &RecordStore, parent: &Person, class_id: &ClassId) -> bool {
    parent.child_ids.iter().any(|child_id| {
        store
            .get::<Person>(child_id)
            .is_some_and(|child| child.is_in_class(class_id))
    })
}

/// Take `person_id` out of the class threads of classes they no longer belong to
///
/// Parents stay only while one of their children is still in the class, so
/// moving a student or unlinking a child also drops the parents it brought in.
/// Call after the store already reflects the change.
pub fn leave_class_threads(
    store: &mut RecordStore,
    person_id: &PersonId,
    class_ids: &[ClassId],
) -> CoreResult<()> {
    for class_id in class_ids {
        let Some(thread) = find_class_thread(store, class_id) else {
            continue;
        };
        let thread_id = thread.id.clone();
        let stale: Vec<PersonId> = thread
            .participant_ids
            .iter()
            .filter(|id| match store.get::<Person>(id) {
                Some(p) if p.role == Role::Parent => !has_child_in_class(store, p, class_id),
                _ => *id == person_id,
            })
            .cloned()
            .collect();
        if stale.is_empty() {
            continue;
        }

        store.update::<Thread, _>(&thread_id, |t| {
            for id in &stale {
                t.participant_ids.remove(id);
            }
        })?;
        tracing::debug!(class_id = %class_id, removed = stale.len(), "Left class thread");
    }
    Ok(())
}

/// Find or create the direct thread between `a` and `b`
pub fn find_or_create_direct(
    store: &mut RecordStore,
    a: &PersonId,
    b: &PersonId,
    now: Timestamp,
) -> CoreResult<ThreadId> {
    if a == b {
        return Err(CoreError::validation("Cannot open a conversation with yourself"));
    }
    if let Some(existing) = store.find::<Thread, _>(|t| t.is_direct_between(a, b)) {
        return Ok(existing.id.clone());
    }

    let mut thread = Thread::new(ThreadKind::Direct, [a.clone(), b.clone()].into());
    thread.created_by = Some(a.clone());
    thread.created_at = now;
    let id = thread.id.clone();
    store.insert(thread)?;
    Ok(id)
}

pub fn find_or_create_parent_teacher(
    store: &mut RecordStore,
    teacher_id: &PersonId,
    parent_id: &PersonId,
    now: Timestamp,
) -> CoreResult<ThreadId> {
    if let Some(existing) =
        store.find::<Thread, _>(|t| t.is_parent_teacher_between(teacher_id, parent_id))
    {
        return Ok(existing.id.clone());
    }

    let mut thread = Thread::new(
        ThreadKind::ParentTeacher,
        [teacher_id.clone(), parent_id.clone()].into(),
    );
    thread.created_at = now;
    let id = thread.id.clone();
    store.insert(thread)?;
    Ok(id)
}

/// Give a newly linked parent the conversations of their child
///
/// Adds the parent to the class thread of each of the student's classes and
/// opens a parent-teacher thread with every teacher of those classes.
/// Running it twice changes nothing.
pub fn attach_parent_to_student_scope(
    store: &mut RecordStore,
    parent_id: &PersonId,
    student_id: &PersonId,
    now: Timestamp,
) -> CoreResult<()> {
    let student = store.require::<Person>(student_id)?.clone();
    store.require::<Person>(parent_id)?;

    let class_thread_ids: Vec<ThreadId> = store
        .filter::<Thread, _>(|t| {
            t.kind == ThreadKind::Class
                && t.class_id
                    .as_ref()
                    .map(|c| student.is_in_class(c))
                    .unwrap_or(false)
        })
        .into_iter()
        .map(|t| t.id.clone())
        .collect();
    for thread_id in &class_thread_ids {
        store.update::<Thread, _>(thread_id, |t| {
            t.participant_ids.insert(parent_id.clone());
        })?;
    }

    let teacher_ids: Vec<PersonId> = store
        .filter::<Person, _>(|p| p.role == Role::Teacher && p.active && p.shares_class_with(&student))
        .into_iter()
        .map(|p| p.id.clone())
        .collect();
    for teacher_id in &teacher_ids {
        find_or_create_parent_teacher(store, teacher_id, parent_id, now)?;
    }

    tracing::debug!(
        parent = %parent_id,
        student = %student_id,
        class_threads = class_thread_ids.len(),
        teachers = teacher_ids.len(),
        "Attached parent to student scope"
    );
    Ok(())
}

/// Announcement thread for one class, or the whole school when `class_id` is None
pub fn create_announcement_thread(
    store: &mut RecordStore,
    author_id: &PersonId,
    class_id: Option<&ClassId>,
    title: &str,
    now: Timestamp,
) -> CoreResult<ThreadId> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::validation("Announcement title is required"));
    }

    let mut participants = match class_id {
        Some(class_id) => {
            store.require::<ClassGroup>(class_id)?;
            class_participants(store, class_id)
        }
        None => store
            .filter::<Person, _>(|p| p.can_sign_in())
            .into_iter()
            .map(|p| p.id.clone())
            .collect(),
    };
    participants.insert(author_id.clone());

    let mut thread = Thread::new(ThreadKind::Announcement, participants);
    thread.class_id = class_id.cloned();
    thread.title = Some(title.to_string());
    thread.created_by = Some(author_id.clone());
    thread.created_at = now;
    let id = thread.id.clone();
    store.insert(thread)?;
    Ok(id)
}

/// Message content after external services have run
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    pub content: LocalizedText,
    /// Already persisted blob uris
    pub attachments: Vec<String>,
}

/// Append a message to a thread
///
/// The sender must participate, except a director who joins on posting.
pub fn post_message(
    store: &mut RecordStore,
    thread_id: &ThreadId,
    sender: &Person,
    message: PreparedMessage,
    now: Timestamp,
) -> CoreResult<MessageId> {
    let thread = store.require::<Thread>(thread_id)?;
    let is_member = thread.has_participant(&sender.id);
    if !is_member && sender.role != Role::Director {
        return Err(CoreError::unauthorized("Not a participant of this thread"));
    }
    let is_author = thread.created_by.as_ref() == Some(&sender.id);
    if thread.kind == ThreadKind::Announcement && !is_author && sender.role != Role::Director {
        return Err(CoreError::unauthorized("Announcements are read-only"));
    }
    if message.content.text.trim().is_empty() {
        return Err(CoreError::validation("Message text is required"));
    }

    if !is_member {
        store.update::<Thread, _>(thread_id, |t| {
            t.participant_ids.insert(sender.id.clone());
        })?;
    }

    let mut content = message.content;
    content.text = content.text.trim().to_string();
    let record = Message {
        id: MessageId::generate(),
        thread_id: thread_id.clone(),
        sender_id: sender.id.clone(),
        content,
        attachments: message.attachments,
        created_at: now,
        read_by: [sender.id.clone()].into(),
    };
    let id = record.id.clone();
    store.insert(record)?;
    Ok(id)
}

/// Mark every message in the thread as read by `person_id`
pub fn mark_thread_read(
    store: &mut RecordStore,
    thread_id: &ThreadId,
    person_id: &PersonId,
) -> CoreResult<usize> {
    if !store.require::<Thread>(thread_id)?.has_participant(person_id) {
        return Err(CoreError::unauthorized("Not a participant of this thread"));
    }

    let unread: Vec<MessageId> = store
        .filter::<Message, _>(|m| &m.thread_id == thread_id && !m.read_by.contains(person_id))
        .into_iter()
        .map(|m| m.id.clone())
        .collect();
    for id in &unread {
        store.update::<Message, _>(id, |m| {
            m.read_by.insert(person_id.clone());
        })?;
    }
    Ok(unread.len())
}
