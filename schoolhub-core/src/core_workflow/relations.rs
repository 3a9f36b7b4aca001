/*
    relations.rs - Parent-student relation requests

    pending -> approved | rejected; both outcomes are terminal.
    Reviewers: director, administrator, or the homeroom teacher of one of the
    student's classes.
*/

use crate::core_access::require_homeroom_of;
use crate::core_audit::{
    build_relation_approved_notification, build_relation_rejected_notification, log_admin,
    notify, AuditRecord,
};
use crate::core_messaging::attach_parent_to_student_scope;
use crate::core_store::model::*;
use crate::core_store::RecordStore;
use crate::error::{CoreError, CoreResult};

/// File a request to link `parent` with an existing student
pub fn submit_relation_request(
    store: &mut RecordStore,
    parent: &Person,
    student_id: &PersonId,
    now: Timestamp,
) -> CoreResult<RelationRequestId> {
    let student = store.require::<Person>(student_id)?;
    if student.role != Role::Student || !student.active {
        return Err(CoreError::validation("Target is not an active student"));
    }
    if parent.child_ids.contains(student_id) {
        return Err(CoreError::validation("Student is already linked"));
    }
    let pending = store.find::<ParentStudentRelationRequest, _>(|r| {
        r.parent_id == parent.id && &r.student_id == student_id && !r.status.is_resolved()
    });
    if pending.is_some() {
        return Err(CoreError::validation("request already pending"));
    }

    let mut request = ParentStudentRelationRequest::new(parent.id.clone(), student_id.clone());
    request.created_at = now;
    let id = request.id.clone();
    store.insert(request)?;

    tracing::info!(request_id = %id, parent = %parent.id, student = %student_id, "Relation request submitted");
    Ok(id)
}

/// Director, administrator, or homeroom teacher of one of the student's classes
pub fn require_relation_reviewer(
    store: &RecordStore,
    reviewer: &Person,
    student: &Person,
) -> CoreResult<()> {
    if reviewer.role.is_elevated() {
        return Ok(());
    }
    let homeroom = student
        .class_ids
        .iter()
        .filter_map(|class_id| store.get::<ClassGroup>(class_id))
        .any(|class| require_homeroom_of(reviewer, class).is_ok());
    if homeroom {
        Ok(())
    } else {
        Err(CoreError::unauthorized("Not allowed to review this request"))
    }
}

pub fn review_relation_request(
    store: &mut RecordStore,
    reviewer: &Person,
    request_id: &RelationRequestId,
    approve: bool,
    comment: Option<String>,
    now: Timestamp,
) -> CoreResult<RelationStatus> {
    let request = store.require::<ParentStudentRelationRequest>(request_id)?.clone();
    let student = store.require::<Person>(&request.student_id)?.clone();
    require_relation_reviewer(store, reviewer, &student)?;

    if request.status.is_resolved() {
        return Err(CoreError::validation("Request is already resolved"));
    }
    let parent = store.require::<Person>(&request.parent_id)?;
    if parent.role != Role::Parent {
        return Err(CoreError::validation("Requester is not a parent"));
    }

    let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    let status = if approve {
        RelationStatus::Approved
    } else {
        RelationStatus::Rejected
    };

    if approve {
        store.update::<Person, _>(&request.parent_id, |p| {
            p.child_ids.insert(request.student_id.clone());
        })?;
        attach_parent_to_student_scope(store, &request.parent_id, &request.student_id, now)?;
        notify(
            store,
            &request.parent_id,
            &build_relation_approved_notification(&student.name),
            now,
        )?;
    } else {
        notify(
            store,
            &request.parent_id,
            &build_relation_rejected_notification(comment.as_deref()),
            now,
        )?;
    }

    let note = match &comment {
        Some(c) => format!("{:?}: {}", status, c),
        None => format!("{:?}", status),
    };
    store.update::<ParentStudentRelationRequest, _>(request_id, |r| {
        r.status = status;
        r.reviewer_id = Some(reviewer.id.clone());
        r.comment = comment.clone();
        r.review_notes.push(ReviewNote {
            author_id: reviewer.id.clone(),
            text: note.clone(),
            at: now,
        });
    })?;

    log_admin(
        store,
        AuditRecord {
            actor_id: &reviewer.id,
            action: if approve { "relation.approved" } else { "relation.rejected" },
            entity_type: "relation_request",
            entity_id: request_id.to_string(),
            detail: note,
        },
        now,
    )?;

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Setup {
        store: RecordStore,
        class_id: ClassId,
        student: Person,
        parent: Person,
        director: Person,
    }

    fn setup() -> Setup {
        let mut store = RecordStore::new();
        let class = ClassGroup::new(4, LocalizedNames::new());
        let class_id = class.id.clone();
        store.insert(class).unwrap();

        let mut student = Person::new("Kid", "kid", "h", Role::Student);
        student.class_ids.insert(class_id.clone());
        let parent = Person::new("Mum", "mum", "h", Role::Parent);
        let director = Person::new("Dir", "dir", "h", Role::Director);
        store.insert(student.clone()).unwrap();
        store.insert(parent.clone()).unwrap();
        store.insert(director.clone()).unwrap();

        Setup {
            store,
            class_id,
            student,
            parent,
            director,
        }
    }

    #[test]
    fn test_duplicate_pending_rejected() {
        let mut s = setup();
        let now = Timestamp::now();
        submit_relation_request(&mut s.store, &s.parent, &s.student.id, now).unwrap();
        let err = submit_relation_request(&mut s.store, &s.parent, &s.student.id, now).unwrap_err();
        assert_eq!(err, CoreError::Validation("request already pending".to_string()));
    }

    #[test]
    fn test_approve_links_and_is_terminal() {
        let mut s = setup();
        let now = Timestamp::now();
        let id = submit_relation_request(&mut s.store, &s.parent, &s.student.id, now).unwrap();

        let status =
            review_relation_request(&mut s.store, &s.director, &id, true, None, now).unwrap();
        assert_eq!(status, RelationStatus::Approved);
        let parent = s.store.get::<Person>(&s.parent.id).unwrap();
        assert!(parent.child_ids.contains(&s.student.id));
        assert_eq!(s.store.all::<Notification>().len(), 1);

        let err = review_relation_request(&mut s.store, &s.director, &id, false, None, now)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let linked = s.store.get::<Person>(&s.parent.id).unwrap().clone();
        let err = submit_relation_request(&mut s.store, &linked, &s.student.id, now).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_homeroom_teacher_may_review() {
        let mut s = setup();
        let now = Timestamp::now();
        let mut teacher = Person::new("T", "t", "h", Role::Teacher);
        teacher.is_homeroom = true;
        teacher.class_ids.insert(s.class_id.clone());
        s.store.insert(teacher.clone()).unwrap();

        let id = submit_relation_request(&mut s.store, &s.parent, &s.student.id, now).unwrap();
        let err = review_relation_request(&mut s.store, &teacher, &id, true, None, now).unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));

        let teacher_id = teacher.id.clone();
        s.store
            .update::<ClassGroup, _>(&s.class_id, |c| c.homeroom_teacher_id = Some(teacher_id))
            .unwrap();
        let status = review_relation_request(
            &mut s.store,
            &teacher,
            &id,
            false,
            Some("unknown family".to_string()),
            now,
        )
        .unwrap();
        assert_eq!(status, RelationStatus::Rejected);

        let request = s.store.get::<ParentStudentRelationRequest>(&id).unwrap();
        assert_eq!(request.comment.as_deref(), Some("unknown family"));
        assert_eq!(request.review_notes.len(), 1);
    }
}
