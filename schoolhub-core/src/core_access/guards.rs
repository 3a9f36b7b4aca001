/*
    guards.rs - Authorization guards

    Stateless predicates run at the top of every operation, before any field
    validation or store write. Each returns Unauthorized on failure.
*/

use super::session::{Session, SessionCodec};
use crate::core_store::model::{ClassGroup, ClassId, Person, PersonId, Role, Timestamp};
use crate::core_store::RecordStore;
use crate::error::{CoreError, CoreResult};

/// A verified caller
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub person: Person,
    pub session: Session,
}

/// Resolve a token to an active, unblocked person whose role still matches
pub fn require_auth(
    store: &RecordStore,
    codec: &SessionCodec,
    token: &str,
    now: Timestamp,
) -> CoreResult<Authenticated> {
    let claims = codec
        .verify(token, now)
        .map_err(|e| CoreError::unauthorized(e.to_string()))?;

    let person = store
        .get::<Person>(&claims.sub)
        .ok_or_else(|| CoreError::unauthorized("Unknown session user"))?;

    if !person.can_sign_in() {
        return Err(CoreError::unauthorized("Account is inactive or blocked"));
    }
    if person.role != claims.role {
        return Err(CoreError::unauthorized("Session role no longer matches"));
    }

    Ok(Authenticated {
        person: person.clone(),
        session: codec.session_for(token, &claims),
    })
}

pub fn require_role(person: &Person, allowed: &[Role]) -> CoreResult<()> {
    if allowed.contains(&person.role) {
        Ok(())
    } else {
        Err(CoreError::unauthorized(format!(
            "Role {} may not perform this action",
            person.role
        )))
    }
}

/// Director and Administrator reach every class; a teacher only their own
pub fn require_class_access(person: &Person, class_id: &ClassId) -> CoreResult<()> {
    let allowed = match person.role {
        Role::Director | Role::Administrator => true,
        Role::Teacher => person.is_in_class(class_id),
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::unauthorized(format!("No access to class {}", class_id)))
    }
}

/// Director, Administrator and Staff, or a teacher sharing a class
pub fn require_student_details_access(viewer: &Person, student: &Person) -> CoreResult<()> {
    let allowed = match viewer.role {
        Role::Director | Role::Administrator | Role::Staff => true,
        Role::Teacher => viewer.shares_class_with(student),
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::unauthorized("No access to student details"))
    }
}

/// The caller is the homeroom teacher of `class`
pub fn require_homeroom_of(person: &Person, class: &ClassGroup) -> CoreResult<()> {
    if person.is_homeroom_teacher() && class.homeroom_teacher_id.as_ref() == Some(&person.id) {
        Ok(())
    } else {
        Err(CoreError::unauthorized(format!(
            "Not the homeroom teacher of class {}",
            class.id
        )))
    }
}

pub fn require_parent_of(person: &Person, student_id: &PersonId) -> CoreResult<()> {
    if person.is_parent_of(student_id) {
        Ok(())
    } else {
        Err(CoreError::unauthorized("Not a parent of this student"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::LocalizedNames;

    fn person(role: Role, classes: &[&str]) -> Person {
        let mut p = Person::new("x", format!("{}-{}", role, classes.len()), "h", role);
        p.class_ids = classes.iter().map(|c| ClassId::new(*c)).collect();
        p
    }

    #[test]
    fn test_require_auth_happy_path() {
        let mut store = RecordStore::new();
        let teacher = person(Role::Teacher, &["c1"]);
        store.insert(teacher.clone()).unwrap();

        let codec = SessionCodec::default();
        let now = Timestamp::now();
        let session = codec.issue(&teacher.id, Role::Teacher, now);

        let auth = require_auth(&store, &codec, &session.token, now).unwrap();
        assert_eq!(auth.person.id, teacher.id);
        assert_eq!(auth.session.token, session.token);
    }

    #[test]
    fn test_require_auth_rejects_blocked_and_role_mismatch() {
        let mut store = RecordStore::new();
        let mut teacher = person(Role::Teacher, &[]);
        teacher.blocked = true;
        store.insert(teacher.clone()).unwrap();

        let codec = SessionCodec::default();
        let now = Timestamp::now();
        let token = codec.issue(&teacher.id, Role::Teacher, now).token;
        assert!(matches!(
            require_auth(&store, &codec, &token, now),
            Err(CoreError::Unauthorized(_))
        ));

        store.update::<Person, _>(&teacher.id, |p| p.blocked = false).unwrap();
        let director_token = codec.issue(&teacher.id, Role::Director, now).token;
        assert!(matches!(
            require_auth(&store, &codec, &director_token, now),
            Err(CoreError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_require_auth_unknown_user() {
        let store = RecordStore::new();
        let codec = SessionCodec::default();
        let now = Timestamp::now();
        let token = codec.issue(&PersonId::new("ghost"), Role::Director, now).token;
        assert!(require_auth(&store, &codec, &token, now).is_err());
    }

    #[test]
    fn test_class_access() {
        let class = ClassId::new("c1");
        assert!(require_class_access(&person(Role::Director, &[]), &class).is_ok());
        assert!(require_class_access(&person(Role::Teacher, &["c1"]), &class).is_ok());
        assert!(require_class_access(&person(Role::Teacher, &["c2"]), &class).is_err());
        assert!(require_class_access(&person(Role::Student, &["c1"]), &class).is_err());
    }

    #[test]
    fn test_student_details_access() {
        let student = person(Role::Student, &["c1"]);
        assert!(require_student_details_access(&person(Role::Staff, &[]), &student).is_ok());
        assert!(require_student_details_access(&person(Role::Teacher, &["c1"]), &student).is_ok());
        assert!(require_student_details_access(&person(Role::Teacher, &["c9"]), &student).is_err());
        assert!(require_student_details_access(&person(Role::Parent, &[]), &student).is_err());
    }

    #[test]
    fn test_homeroom_and_parent_guards() {
        let mut teacher = person(Role::Teacher, &["c1"]);
        teacher.is_homeroom = true;
        let mut class = ClassGroup::new(5, LocalizedNames::new());
        assert!(require_homeroom_of(&teacher, &class).is_err());
        class.homeroom_teacher_id = Some(teacher.id.clone());
        assert!(require_homeroom_of(&teacher, &class).is_ok());

        let mut parent = person(Role::Parent, &[]);
        let child = PersonId::new("kid");
        assert!(require_parent_of(&parent, &child).is_err());
        parent.child_ids.insert(child.clone());
        assert!(require_parent_of(&parent, &child).is_ok());
    }
}
