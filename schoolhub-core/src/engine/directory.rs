//! People, classes and subjects
//!
//! Only the school administration (director, administrator) creates and
//! reshapes these records. A person may edit their own language and
//! profile and change their own password.

use super::{Engine, OperationResponse};
use crate::core_access::require_role;
use crate::core_audit::{build_account_created_notification, log_admin, notify, AuditRecord};
use crate::core_messaging::{
    attach_parent_to_student_scope, ensure_class_thread, join_class_threads, leave_class_threads,
};
use crate::core_store::model::*;
use crate::core_store::RecordStore;
use crate::core_workflow::IssuedCredentials;
use crate::error::{CoreError, CoreResult};
use crate::services::{derive_login, generate_password};
use crate::telemetry::OperationSpan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const ADMINISTRATION: &[Role] = &[Role::Director, Role::Administrator];
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInput {
    pub grade: u8,
    pub names: LocalizedNames,
    pub homeroom_teacher_id: Option<PersonId>,
    #[serde(default)]
    pub subject_ids: BTreeSet<SubjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonInput {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub is_homeroom: bool,
    #[serde(default)]
    pub preferred_lang: Lang,
    #[serde(default)]
    pub class_ids: BTreeSet<ClassId>,
    /// Students linked to a new parent
    #[serde(default)]
    pub child_ids: BTreeSet<PersonId>,
    #[serde(default)]
    pub profile: Profile,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonUpdate {
    pub name: Option<String>,
    pub preferred_lang: Option<Lang>,
    pub profile: Option<Profile>,
    pub class_ids: Option<BTreeSet<ClassId>>,
    pub child_ids: Option<BTreeSet<PersonId>>,
    pub is_homeroom: Option<bool>,
}

impl PersonUpdate {
    fn touches_administrative_fields(&self) -> bool {
        self.name.is_some()
            || self.class_ids.is_some()
            || self.child_ids.is_some()
            || self.is_homeroom.is_some()
    }
}

fn clean_names(names: &LocalizedNames, what: &str) -> CoreResult<LocalizedNames> {
    let cleaned: LocalizedNames = names
        .iter()
        .map(|(lang, name)| (*lang, name.trim().to_string()))
        .filter(|(_, name)| !name.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Err(CoreError::validation(format!("{} needs a name", what)));
    }
    Ok(cleaned)
}

fn check_grade(grade: u8) -> CoreResult<()> {
    if (1..=12).contains(&grade) {
        Ok(())
    } else {
        Err(CoreError::validation("Grade must be between 1 and 12"))
    }
}

fn check_classes(store: &RecordStore, class_ids: &BTreeSet<ClassId>) -> CoreResult<()> {
    for class_id in class_ids {
        if store.require::<ClassGroup>(class_id)?.archived {
            return Err(CoreError::validation(format!("Class {} is archived", class_id)));
        }
    }
    Ok(())
}

fn check_subjects(store: &RecordStore, subject_ids: &BTreeSet<SubjectId>) -> CoreResult<()> {
    for subject_id in subject_ids {
        store.require::<Subject>(subject_id)?;
    }
    Ok(())
}

fn check_children(store: &RecordStore, child_ids: &BTreeSet<PersonId>) -> CoreResult<()> {
    for child_id in child_ids {
        if store.require::<Person>(child_id)?.role != Role::Student {
            return Err(CoreError::validation(format!("{} is not a student", child_id)));
        }
    }
    Ok(())
}

fn check_homeroom_candidate(store: &RecordStore, teacher_id: &PersonId) -> CoreResult<()> {
    let teacher = store.require::<Person>(teacher_id)?;
    if teacher.role != Role::Teacher || !teacher.can_sign_in() {
        return Err(CoreError::validation("Homeroom teacher must be an active teacher"));
    }
    Ok(())
}

/// Point the class at a new homeroom teacher and keep the flags consistent
fn assign_homeroom(
    store: &mut RecordStore,
    class_id: &ClassId,
    teacher_id: Option<&PersonId>,
    now: Timestamp,
) -> CoreResult<()> {
    let previous = store.require::<ClassGroup>(class_id)?.homeroom_teacher_id.clone();
    if previous.as_ref() == teacher_id {
        return Ok(());
    }

    store.update::<ClassGroup, _>(class_id, |c| c.homeroom_teacher_id = teacher_id.cloned())?;

    if let Some(previous) = previous {
        let still_homeroom = store
            .find::<ClassGroup, _>(|c| c.homeroom_teacher_id.as_ref() == Some(&previous))
            .is_some();
        if !still_homeroom {
            store.update::<Person, _>(&previous, |p| p.is_homeroom = false)?;
        }
    }
    if let Some(teacher_id) = teacher_id {
        store.update::<Person, _>(teacher_id, |p| {
            p.is_homeroom = true;
            p.class_ids.insert(class_id.clone());
        })?;
        join_class_threads(store, teacher_id, [class_id], now)?;
    }
    Ok(())
}

/// Administrators manage every account except the school administration's
fn check_manageable(actor: &Person, target: &Person) -> CoreResult<()> {
    if actor.role == Role::Administrator && target.role.is_elevated() {
        return Err(CoreError::unauthorized(
            "Only the director manages administration accounts",
        ));
    }
    Ok(())
}

impl Engine {
    /// First account of an empty school; fails once any director exists
    pub async fn seed_director(&mut self, name: &str) -> CoreResult<IssuedCredentials> {
        let op = OperationSpan::start("seed_director", self.telemetry.clone());
        let now = self.now();
        let result = op.span().in_scope(|| {
            if self.store.find::<Person, _>(|p| p.role == Role::Director).is_some() {
                return Err(CoreError::validation("A director already exists"));
            }
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::validation("Name is required"));
            }

            let login = derive_login(name, |candidate| self.store.person_by_login(candidate).is_some());
            let password = generate_password();
            let hash = self
                .hasher
                .hash(&password)
                .map_err(|e| CoreError::validation(e.to_string()))?;
            let mut director = Person::new(name, login, hash, Role::Director);
            director.created_at = now;
            let credentials = IssuedCredentials {
                person_id: director.id.clone(),
                role: Role::Director,
                login: director.login.clone(),
                password,
            };
            self.store.insert(director)?;
            tracing::info!(person = %credentials.person_id, login = %credentials.login, "Director seeded");
            Ok(credentials)
        });
        if result.is_ok() {
            self.persist();
        }
        op.finish(&result);
        result
    }

    pub async fn create_class(
        &mut self,
        token: &str,
        input: ClassInput,
    ) -> CoreResult<OperationResponse<ClassId>> {
        let (op, caller) = self.begin("create_class", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            require_role(actor, ADMINISTRATION)?;
            check_grade(input.grade)?;
            let names = clean_names(&input.names, "Class")?;
            check_subjects(&self.store, &input.subject_ids)?;
            if let Some(teacher_id) = &input.homeroom_teacher_id {
                check_homeroom_candidate(&self.store, teacher_id)?;
            }

            let mut class = ClassGroup::new(input.grade, names);
            class.subject_ids = input.subject_ids;
            let class_id = class.id.clone();
            self.store.insert(class)?;
            ensure_class_thread(&mut self.store, &class_id, now)?;
            assign_homeroom(
                &mut self.store,
                &class_id,
                input.homeroom_teacher_id.as_ref(),
                now,
            )?;

            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &actor.id,
                    action: "class.created",
                    entity_type: "class",
                    entity_id: class_id.to_string(),
                    detail: format!("grade {}", input.grade),
                },
                now,
            )?;
            Ok(class_id)
        });
        self.commit(op, &caller, result)
    }

    pub async fn update_class(
        &mut self,
        token: &str,
        class_id: &ClassId,
        input: ClassInput,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("update_class", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            require_role(actor, ADMINISTRATION)?;
            self.store.require::<ClassGroup>(class_id)?;
            check_grade(input.grade)?;
            let names = clean_names(&input.names, "Class")?;
            check_subjects(&self.store, &input.subject_ids)?;
            if let Some(teacher_id) = &input.homeroom_teacher_id {
                check_homeroom_candidate(&self.store, teacher_id)?;
            }

            self.store.update::<ClassGroup, _>(class_id, |c| {
                c.grade = input.grade;
                c.names = names;
                c.subject_ids = input.subject_ids;
            })?;
            assign_homeroom(
                &mut self.store,
                class_id,
                input.homeroom_teacher_id.as_ref(),
                now,
            )?;

            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &actor.id,
                    action: "class.updated",
                    entity_type: "class",
                    entity_id: class_id.to_string(),
                    detail: String::new(),
                },
                now,
            )?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    pub async fn set_class_archived(
        &mut self,
        token: &str,
        class_id: &ClassId,
        archived: bool,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("set_class_archived", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            require_role(&caller.person, ADMINISTRATION)?;
            self.store
                .update::<ClassGroup, _>(class_id, |c| c.archived = archived)?;
            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &caller.person.id,
                    action: if archived { "class.archived" } else { "class.restored" },
                    entity_type: "class",
                    entity_id: class_id.to_string(),
                    detail: String::new(),
                },
                now,
            )?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    pub async fn create_subject(
        &mut self,
        token: &str,
        names: LocalizedNames,
    ) -> CoreResult<OperationResponse<SubjectId>> {
        let (op, caller) = self.begin("create_subject", token)?;
        let result = op.span().in_scope(|| {
            require_role(&caller.person, ADMINISTRATION)?;
            let subject = Subject::new(clean_names(&names, "Subject")?);
            let id = subject.id.clone();
            self.store.insert(subject)?;
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    /// Archive a subject in `mode`, or restore it with `None`
    pub async fn archive_subject(
        &mut self,
        token: &str,
        subject_id: &SubjectId,
        mode: Option<SubjectArchiveMode>,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("archive_subject", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            require_role(&caller.person, ADMINISTRATION)?;
            self.store.update::<Subject, _>(subject_id, |s| {
                s.archived = mode.is_some();
                s.archive_mode = mode;
            })?;
            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &caller.person.id,
                    action: "subject.archive_mode",
                    entity_type: "subject",
                    entity_id: subject_id.to_string(),
                    detail: format!("{:?}", mode),
                },
                now,
            )?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Create an account directly; the clear password is only in the result
    pub async fn create_person(
        &mut self,
        token: &str,
        input: PersonInput,
    ) -> CoreResult<OperationResponse<IssuedCredentials>> {
        let (op, caller) = self.begin("create_person", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            require_role(actor, ADMINISTRATION)?;
            if matches!(input.role, Role::Director | Role::Administrator) && actor.role != Role::Director {
                return Err(CoreError::unauthorized(
                    "Only the director creates administration accounts",
                ));
            }

            let name = input.name.trim();
            if name.is_empty() {
                return Err(CoreError::validation("Name is required"));
            }
            if input.is_homeroom && input.role != Role::Teacher {
                return Err(CoreError::validation("Only teachers can be homeroom teachers"));
            }
            check_classes(&self.store, &input.class_ids)?;
            if !input.child_ids.is_empty() && input.role != Role::Parent {
                return Err(CoreError::validation("Only parents have children"));
            }
            check_children(&self.store, &input.child_ids)?;

            let login = derive_login(name, |candidate| self.store.person_by_login(candidate).is_some());
            let password = generate_password();
            let hash = self
                .hasher
                .hash(&password)
                .map_err(|e| CoreError::validation(e.to_string()))?;

            let mut person = Person::new(name, login, hash, input.role);
            person.is_homeroom = input.is_homeroom;
            person.preferred_lang = input.preferred_lang;
            person.class_ids = input.class_ids;
            person.child_ids = input.child_ids;
            person.profile = input.profile;
            person.created_at = now;
            let credentials = IssuedCredentials {
                person_id: person.id.clone(),
                role: person.role,
                login: person.login.clone(),
                password,
            };

            self.store.insert(person.clone())?;
            if person.role != Role::Parent {
                join_class_threads(&mut self.store, &person.id, &person.class_ids, now)?;
            }
            for child_id in &person.child_ids {
                attach_parent_to_student_scope(&mut self.store, &person.id, child_id, now)?;
            }
            notify(
                &mut self.store,
                &person.id,
                &build_account_created_notification(&person.login),
                now,
            )?;
            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &actor.id,
                    action: "person.created",
                    entity_type: "person",
                    entity_id: person.id.to_string(),
                    detail: format!("{} {}", person.role, person.login),
                },
                now,
            )?;
            Ok(credentials)
        });
        self.commit(op, &caller, result)
    }

    pub async fn update_person(
        &mut self,
        token: &str,
        person_id: &PersonId,
        update: PersonUpdate,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("update_person", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            let is_self = &actor.id == person_id;
            let is_admin = actor.role.is_elevated();
            if !is_self && !is_admin {
                return Err(CoreError::unauthorized("Cannot edit another person"));
            }
            if update.touches_administrative_fields() && !is_admin {
                return Err(CoreError::unauthorized(
                    "Only the administration changes names, classes and links",
                ));
            }

            let target = self.store.require::<Person>(person_id)?.clone();
            if !is_self || update.touches_administrative_fields() {
                check_manageable(actor, &target)?;
            }
            let name = match &update.name {
                Some(name) if name.trim().is_empty() => {
                    return Err(CoreError::validation("Name is required"))
                }
                Some(name) => Some(name.trim().to_string()),
                None => None,
            };
            if update.is_homeroom == Some(true) && target.role != Role::Teacher {
                return Err(CoreError::validation("Only teachers can be homeroom teachers"));
            }
            if let Some(class_ids) = &update.class_ids {
                check_classes(&self.store, class_ids)?;
            }
            if let Some(child_ids) = &update.child_ids {
                if target.role != Role::Parent {
                    return Err(CoreError::validation("Only parents have children"));
                }
                check_children(&self.store, child_ids)?;
            }

            let left: Vec<ClassId> = update
                .class_ids
                .as_ref()
                .map(|new| target.class_ids.difference(new).cloned().collect())
                .unwrap_or_default();
            let new_children: Vec<PersonId> = update
                .child_ids
                .as_ref()
                .map(|new| new.difference(&target.child_ids).cloned().collect())
                .unwrap_or_default();
            let dropped_classes: Vec<ClassId> = update
                .child_ids
                .as_ref()
                .map(|new| {
                    target
                        .child_ids
                        .difference(new)
                        .filter_map(|child_id| self.store.get::<Person>(child_id))
                        .flat_map(|child| child.class_ids.iter().cloned())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect()
                })
                .unwrap_or_default();

            self.store.update::<Person, _>(person_id, |p| {
                if let Some(name) = name {
                    p.name = name;
                }
                if let Some(lang) = update.preferred_lang {
                    p.preferred_lang = lang;
                }
                if let Some(profile) = update.profile {
                    p.profile = profile;
                }
                if let Some(class_ids) = update.class_ids.clone() {
                    p.class_ids = class_ids;
                }
                if let Some(child_ids) = update.child_ids {
                    p.child_ids = child_ids;
                }
                if let Some(is_homeroom) = update.is_homeroom {
                    p.is_homeroom = is_homeroom;
                }
            })?;

            if let Some(class_ids) = &update.class_ids {
                leave_class_threads(&mut self.store, person_id, &left)?;
                if target.role != Role::Parent {
                    join_class_threads(&mut self.store, person_id, class_ids, now)?;
                }
                // parents of a moved student follow them into the new class threads
                if target.role == Role::Student {
                    let parents: Vec<PersonId> = self
                        .store
                        .filter::<Person, _>(|p| p.is_parent_of(person_id))
                        .into_iter()
                        .map(|p| p.id.clone())
                        .collect();
                    for parent_id in &parents {
                        attach_parent_to_student_scope(&mut self.store, parent_id, person_id, now)?;
                    }
                }
            }
            for child_id in &new_children {
                attach_parent_to_student_scope(&mut self.store, person_id, child_id, now)?;
            }
            leave_class_threads(&mut self.store, person_id, &dropped_classes)?;

            if is_admin && !is_self {
                log_admin(
                    &mut self.store,
                    AuditRecord {
                        actor_id: &actor.id,
                        action: "person.updated",
                        entity_type: "person",
                        entity_id: person_id.to_string(),
                        detail: String::new(),
                    },
                    now,
                )?;
            }
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Activate, deactivate, block or unblock an account
    pub async fn set_person_status(
        &mut self,
        token: &str,
        person_id: &PersonId,
        active: bool,
        blocked: bool,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("set_person_status", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            require_role(actor, ADMINISTRATION)?;
            if &actor.id == person_id {
                return Err(CoreError::validation("Cannot change your own account status"));
            }
            let target = self.store.require::<Person>(person_id)?;
            check_manageable(actor, target)?;

            self.store.update::<Person, _>(person_id, |p| {
                p.active = active;
                p.blocked = blocked;
            })?;
            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &actor.id,
                    action: "person.status",
                    entity_type: "person",
                    entity_id: person_id.to_string(),
                    detail: format!("active={} blocked={}", active, blocked),
                },
                now,
            )?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Replace a person's password with a generated one
    pub async fn reset_password(
        &mut self,
        token: &str,
        person_id: &PersonId,
    ) -> CoreResult<OperationResponse<IssuedCredentials>> {
        let (op, caller) = self.begin("reset_password", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            require_role(actor, ADMINISTRATION)?;
            let target = self.store.require::<Person>(person_id)?.clone();
            check_manageable(actor, &target)?;

            let password = generate_password();
            let hash = self
                .hasher
                .hash(&password)
                .map_err(|e| CoreError::validation(e.to_string()))?;
            self.store
                .update::<Person, _>(person_id, |p| p.password_hash = hash)?;
            log_admin(
                &mut self.store,
                AuditRecord {
                    actor_id: &actor.id,
                    action: "person.password_reset",
                    entity_type: "person",
                    entity_id: person_id.to_string(),
                    detail: String::new(),
                },
                now,
            )?;
            Ok(IssuedCredentials {
                person_id: target.id,
                role: target.role,
                login: target.login,
                password,
            })
        });
        self.commit(op, &caller, result)
    }

    pub async fn change_password(
        &mut self,
        token: &str,
        current: &str,
        new_password: &str,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("change_password", token)?;
        let result = op.span().in_scope(|| {
            let person = self.store.require::<Person>(&caller.person.id)?;
            if !self.hasher.verify(current, &person.password_hash) {
                return Err(CoreError::validation("Current password is incorrect"));
            }
            if new_password.chars().count() < MIN_PASSWORD_LEN {
                return Err(CoreError::validation(format!(
                    "Password must have at least {} characters",
                    MIN_PASSWORD_LEN
                )));
            }
            let hash = self
                .hasher
                .hash(new_password)
                .map_err(|e| CoreError::validation(e.to_string()))?;
            self.store
                .update::<Person, _>(&caller.person.id, |p| p.password_hash = hash)?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }
}
