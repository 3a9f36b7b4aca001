/*
    registration.rs - Registration application lifecycle

    new -> in_review | need_more_info | approved | rejected
    in_review -> approved | rejected | need_more_info
    need_more_info -> in_review (applicant resubmits) | rejected
    rejected -> in_review
    approved -> approved (no effect on accounts)

    Approval creates accounts exactly once: a non-empty `approved_user_ids`
    means the accounts already exist. Passwords are generated, hashed, and
    handed back once in the outcome.
*/

use crate::core_audit::{build_account_created_notification, log_admin, notify, AuditRecord};
use crate::core_messaging::{attach_parent_to_student_scope, join_class_threads};
use crate::core_store::model::*;
use crate::core_store::RecordStore;
use crate::error::{CoreError, CoreResult};
use crate::services::password::{derive_login, generate_password, CredentialHasher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reviewer's decision on an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub status: ApplicationStatus,
    pub comment: Option<String>,
    /// Question for the applicant, required for need_more_info
    pub info_request: Option<String>,
    /// Classes to place the new accounts in; requested ones when empty
    #[serde(default)]
    pub assigned_class_ids: BTreeSet<ClassId>,
}

impl ReviewDecision {
    pub fn new(status: ApplicationStatus) -> Self {
        ReviewDecision {
            status,
            comment: None,
            info_request: None,
            assigned_class_ids: BTreeSet::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_info_request(mut self, request: impl Into<String>) -> Self {
        self.info_request = Some(request.into());
        self
    }

    pub fn with_classes(mut self, class_ids: impl IntoIterator<Item = ClassId>) -> Self {
        self.assigned_class_ids = class_ids.into_iter().collect();
        self
    }
}

/// Login and clear-text password of a freshly created account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredentials {
    pub person_id: PersonId,
    pub role: Role,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    /// Only populated on the approval that created the accounts
    pub credentials: Vec<IssuedCredentials>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_applicant(details: &ApplicantDetails) -> CoreResult<()> {
    if details.name.trim().is_empty() {
        return Err(CoreError::validation("Applicant name is required"));
    }
    let has_contact = [&details.phone, &details.email]
        .iter()
        .any(|c| c.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false));
    if !has_contact {
        return Err(CoreError::validation("A phone number or email is required"));
    }
    Ok(())
}

fn validate_classes(store: &RecordStore, class_ids: &BTreeSet<ClassId>) -> CoreResult<()> {
    for class_id in class_ids {
        let class = store.require::<ClassGroup>(class_id)?;
        if class.archived {
            return Err(CoreError::validation(format!("Class {} is archived", class_id)));
        }
    }
    Ok(())
}

fn validate_payload(store: &RecordStore, payload: &RegistrationPayload) -> CoreResult<()> {
    match payload {
        RegistrationPayload::ParentWithStudent { parent, student, .. } => {
            validate_applicant(parent)?;
            if student.name.trim().is_empty() {
                return Err(CoreError::validation("Student name is required"));
            }
            if let Some(grade) = student.grade {
                if !(1..=12).contains(&grade) {
                    return Err(CoreError::validation("Grade must be between 1 and 12"));
                }
            }
        }
        RegistrationPayload::Staff { applicant, .. } => validate_applicant(applicant)?,
    }
    validate_classes(store, payload.requested_class_ids())
}

/// Unauthenticated intake of a new application
pub fn submit_registration(
    store: &mut RecordStore,
    payload: RegistrationPayload,
    now: Timestamp,
) -> CoreResult<ApplicationId> {
    validate_payload(store, &payload)?;

    let mut application = RegistrationApplication::new(payload);
    application.created_at = now;
    let id = application.id.clone();
    store.insert(application)?;

    tracing::info!(application_id = %id, "Registration application submitted");
    Ok(id)
}

/// Applicant answer to an information request
///
/// Moves the application from need_more_info back to in_review, optionally
/// replacing the payload with corrected details of the same type.
pub fn resubmit_registration(
    store: &mut RecordStore,
    application_id: &ApplicationId,
    reply: &str,
    payload: Option<RegistrationPayload>,
) -> CoreResult<()> {
    let application = store.require::<RegistrationApplication>(application_id)?;
    if !application.status.awaits_reply() {
        return Err(CoreError::validation(format!(
            "Application is {}, not waiting for information",
            application.status
        )));
    }
    let reply = non_empty(Some(reply))
        .ok_or_else(|| CoreError::validation("Reply text is required"))?;
    if let Some(payload) = &payload {
        if payload.kind() != application.kind() {
            return Err(CoreError::validation("Application type cannot change"));
        }
        validate_payload(store, payload)?;
    }

    store.update::<RegistrationApplication, _>(application_id, |app| {
        if let Some(payload) = payload {
            app.payload = payload;
        }
        app.applicant_reply = Some(reply);
        app.status = ApplicationStatus::InReview;
    })?;

    tracing::info!(application_id = %application_id, "Registration application resubmitted");
    Ok(())
}

/// A person ready to insert, with the clear password shown once
struct PendingAccount {
    person: Person,
    password: String,
}

fn new_account(
    store: &RecordStore,
    hasher: &dyn CredentialHasher,
    details: (&str, Lang),
    role: Role,
    reserved: &[&str],
    now: Timestamp,
) -> CoreResult<PendingAccount> {
    let (name, lang) = details;
    let login = derive_login(name, |candidate| {
        reserved.contains(&candidate) || store.person_by_login(candidate).is_some()
    });
    let password = generate_password();
    let hash = hasher
        .hash(&password)
        .map_err(|e| CoreError::validation(e.to_string()))?;

    let mut person = Person::new(name.trim(), login, hash, role);
    person.preferred_lang = lang;
    person.created_at = now;
    Ok(PendingAccount { person, password })
}

fn build_accounts(
    store: &RecordStore,
    hasher: &dyn CredentialHasher,
    payload: &RegistrationPayload,
    class_ids: &BTreeSet<ClassId>,
    now: Timestamp,
) -> CoreResult<Vec<PendingAccount>> {
    match payload {
        RegistrationPayload::ParentWithStudent { parent, student, .. } => {
            let mut parent_account = new_account(
                store,
                hasher,
                (parent.name.as_str(), parent.preferred_lang),
                Role::Parent,
                &[],
                now,
            )?;
            parent_account.person.profile.phone = parent.phone.clone();
            parent_account.person.profile.email = parent.email.clone();

            let reserved = [parent_account.person.login.as_str()];
            let mut student_account = new_account(
                store,
                hasher,
                (student.name.as_str(), parent.preferred_lang),
                Role::Student,
                &reserved,
                now,
            )?;
            student_account.person.profile.birthday = student.birthday;
            student_account.person.class_ids = class_ids.clone();
            parent_account
                .person
                .child_ids
                .insert(student_account.person.id.clone());

            Ok(vec![parent_account, student_account])
        }
        RegistrationPayload::Staff {
            applicant,
            requested_role,
            ..
        } => {
            let role = match requested_role {
                RequestedStaffRole::Teacher | RequestedStaffRole::HomeroomTeacher => Role::Teacher,
                RequestedStaffRole::Staff => Role::Staff,
            };
            let mut account = new_account(
                store,
                hasher,
                (applicant.name.as_str(), applicant.preferred_lang),
                role,
                &[],
                now,
            )?;
            account.person.is_homeroom = *requested_role == RequestedStaffRole::HomeroomTeacher;
            account.person.profile.phone = applicant.phone.clone();
            account.person.profile.email = applicant.email.clone();
            account.person.class_ids = class_ids.clone();
            Ok(vec![account])
        }
    }
}

/// Insert created accounts and wire up their classes and conversations
fn activate_accounts(
    store: &mut RecordStore,
    accounts: &[PendingAccount],
    now: Timestamp,
) -> CoreResult<()> {
    for account in accounts {
        store.insert(account.person.clone())?;
    }

    for account in accounts {
        let person = &account.person;
        match person.role {
            Role::Student | Role::Teacher => {
                join_class_threads(store, &person.id, &person.class_ids, now)?;
            }
            _ => {}
        }

        if person.is_homeroom_teacher() && person.class_ids.len() == 1 {
            for class_id in &person.class_ids {
                let class = store.require::<ClassGroup>(class_id)?;
                if class.homeroom_teacher_id.is_none() {
                    store.update::<ClassGroup, _>(class_id, |c| {
                        c.homeroom_teacher_id = Some(person.id.clone())
                    })?;
                }
            }
        }
    }

    for parent in accounts.iter().filter(|a| a.person.role == Role::Parent) {
        for child_id in &parent.person.child_ids {
            attach_parent_to_student_scope(store, &parent.person.id, child_id, now)?;
        }
    }

    for account in accounts {
        notify(
            store,
            &account.person.id,
            &build_account_created_notification(&account.person.login),
            now,
        )?;
    }
    Ok(())
}

/// Apply a reviewer's decision
pub fn review_registration(
    store: &mut RecordStore,
    hasher: &dyn CredentialHasher,
    reviewer: &Person,
    application_id: &ApplicationId,
    decision: ReviewDecision,
    now: Timestamp,
) -> CoreResult<ReviewOutcome> {
    let application = store.require::<RegistrationApplication>(application_id)?.clone();

    if !application.status.can_transition_to(decision.status) {
        return Err(CoreError::validation(format!(
            "Cannot move application from {} to {}",
            application.status, decision.status
        )));
    }

    let comment = non_empty(decision.comment.as_deref());
    let info_request = non_empty(decision.info_request.as_deref());
    match decision.status {
        ApplicationStatus::NeedMoreInfo if info_request.is_none() => {
            return Err(CoreError::validation("Information request text is required"));
        }
        ApplicationStatus::Rejected if comment.is_none() => {
            return Err(CoreError::validation("A comment is required to reject"));
        }
        _ => {}
    }

    validate_classes(store, &decision.assigned_class_ids)?;
    let class_ids = if decision.assigned_class_ids.is_empty() {
        application.payload.requested_class_ids().clone()
    } else {
        decision.assigned_class_ids.clone()
    };

    let create_accounts =
        decision.status == ApplicationStatus::Approved && !application.accounts_created();
    let accounts = if create_accounts {
        build_accounts(store, hasher, &application.payload, &class_ids, now)?
    } else {
        Vec::new()
    };

    activate_accounts(store, &accounts, now)?;

    let note_text = match (&comment, &info_request) {
        (_, Some(request)) if decision.status == ApplicationStatus::NeedMoreInfo => {
            format!("{}: {}", decision.status, request)
        }
        (Some(comment), _) => format!("{}: {}", decision.status, comment),
        _ => decision.status.to_string(),
    };
    let created_ids: Vec<PersonId> = accounts.iter().map(|a| a.person.id.clone()).collect();

    store.update::<RegistrationApplication, _>(application_id, |app| {
        app.status = decision.status;
        app.reviewer_id = Some(reviewer.id.clone());
        if comment.is_some() {
            app.comment = comment.clone();
        }
        if decision.status == ApplicationStatus::NeedMoreInfo {
            app.info_request = info_request.clone();
            app.applicant_reply = None;
        }
        if create_accounts {
            app.assigned_class_ids = class_ids.clone();
            app.approved_user_ids = created_ids.clone();
        }
        app.review_notes.push(ReviewNote {
            author_id: reviewer.id.clone(),
            text: note_text.clone(),
            at: now,
        });
    })?;

    log_admin(
        store,
        AuditRecord {
            actor_id: &reviewer.id,
            action: &format!("registration.{}", decision.status),
            entity_type: "registration_application",
            entity_id: application_id.to_string(),
            detail: note_text,
        },
        now,
    )?;

    Ok(ReviewOutcome {
        application_id: application_id.clone(),
        status: decision.status,
        credentials: accounts
            .into_iter()
            .map(|a| IssuedCredentials {
                person_id: a.person.id,
                role: a.person.role,
                login: a.person.login,
                password: a.password,
            })
            .collect(),
    })
}
