//! Registration applications and parent-student relation requests
//!
//! Intake and resubmission are open to applicants without an account, so
//! they answer with the bare result instead of a session and snapshot.

use super::{Engine, OperationResponse};
use crate::core_access::require_role;
use crate::core_store::model::*;
use crate::core_workflow::{self, ReviewDecision, ReviewOutcome};
use crate::error::CoreResult;
use crate::telemetry::OperationSpan;

impl Engine {
    /// File a new registration application
    pub async fn submit_registration(&mut self, payload: RegistrationPayload) -> CoreResult<ApplicationId> {
        let op = OperationSpan::start("submit_registration", self.telemetry.clone());
        let now = self.now();
        let result = op
            .span()
            .in_scope(|| core_workflow::submit_registration(&mut self.store, payload, now));
        if result.is_ok() {
            self.persist();
        }
        op.finish(&result);
        result
    }

    /// Answer an information request on `application_id`
    pub async fn resubmit_registration(
        &mut self,
        application_id: &ApplicationId,
        reply: &str,
        payload: Option<RegistrationPayload>,
    ) -> CoreResult<()> {
        let op = OperationSpan::start("resubmit_registration", self.telemetry.clone());
        let result = op.span().in_scope(|| {
            core_workflow::resubmit_registration(&mut self.store, application_id, reply, payload)
        });
        if result.is_ok() {
            self.persist();
        }
        op.finish(&result);
        result
    }

    /// Director or administrator decision; approval returns fresh credentials
    pub async fn review_registration(
        &mut self,
        token: &str,
        application_id: &ApplicationId,
        decision: ReviewDecision,
    ) -> CoreResult<OperationResponse<ReviewOutcome>> {
        let (op, caller) = self.begin("review_registration", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            require_role(&caller.person, &[Role::Director, Role::Administrator])?;
            core_workflow::review_registration(
                &mut self.store,
                self.hasher.as_ref(),
                &caller.person,
                application_id,
                decision,
                now,
            )
        });
        self.commit(op, &caller, result)
    }

    /// A parent asks to be linked with an existing student
    pub async fn request_relation(
        &mut self,
        token: &str,
        student_id: &PersonId,
    ) -> CoreResult<OperationResponse<RelationRequestId>> {
        let (op, caller) = self.begin("request_relation", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            require_role(&caller.person, &[Role::Parent])?;
            core_workflow::submit_relation_request(&mut self.store, &caller.person, student_id, now)
        });
        self.commit(op, &caller, result)
    }

    pub async fn review_relation(
        &mut self,
        token: &str,
        request_id: &RelationRequestId,
        approve: bool,
        comment: Option<String>,
    ) -> CoreResult<OperationResponse<RelationStatus>> {
        let (op, caller) = self.begin("review_relation", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            core_workflow::review_relation_request(
                &mut self.store,
                &caller.person,
                request_id,
                approve,
                comment,
                now,
            )
        });
        self.commit(op, &caller, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_messaging::find_class_thread;
    use crate::test_utils::{assert_unauthorized, assert_validation, SchoolFixture};
    use std::collections::BTreeSet;

    fn family(fixture: &SchoolFixture) -> RegistrationPayload {
        RegistrationPayload::ParentWithStudent {
            parent: ApplicantDetails {
                name: "Marat Parent".to_string(),
                phone: Some("+7 700 000 00 00".to_string()),
                email: None,
                preferred_lang: Lang::Ru,
            },
            student: StudentDetails {
                name: "Dias Student".to_string(),
                birthday: None,
                grade: Some(7),
            },
            requested_class_ids: [fixture.class_7a.clone()].into(),
        }
    }

    #[tokio::test]
    async fn test_registration_without_account_is_persisted() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;

        let id = engine.submit_registration(family(&fixture)).await.unwrap();
        assert!(engine.store().contains::<RegistrationApplication>(&id));
        assert!(engine.last_sync_ticket().is_some());
    }

    #[tokio::test]
    async fn test_invalid_registration_is_rejected_untouched() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;

        let payload = RegistrationPayload::Staff {
            applicant: ApplicantDetails {
                name: "Nurlan".to_string(),
                phone: None,
                email: Some("  ".to_string()),
                preferred_lang: Lang::Kk,
            },
            requested_role: RequestedStaffRole::Teacher,
            requested_class_ids: BTreeSet::new(),
        };
        assert_validation(engine.submit_registration(payload).await, "phone number or email");
        assert!(engine.store().all::<RegistrationApplication>().is_empty());
        assert!(engine.last_sync_ticket().is_none());
    }

    #[tokio::test]
    async fn test_approval_creates_accounts_once() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;
        let id = engine.submit_registration(family(&fixture)).await.unwrap();

        let teacher = fixture.login(&mut engine, "teacher.a").await;
        assert_unauthorized(
            engine
                .review_registration(&teacher, &id, ReviewDecision::new(ApplicationStatus::Approved))
                .await,
        );

        let admin = fixture.login(&mut engine, "admin").await;
        let outcome = engine
            .review_registration(&admin, &id, ReviewDecision::new(ApplicationStatus::Approved))
            .await
            .unwrap()
            .result;
        assert_eq!(outcome.credentials.len(), 2);
        let people = engine.store().all::<Person>().len();

        let again = engine
            .review_registration(&admin, &id, ReviewDecision::new(ApplicationStatus::Approved))
            .await
            .unwrap()
            .result;
        assert!(again.credentials.is_empty());
        assert_eq!(engine.store().all::<Person>().len(), people);

        let student = outcome
            .credentials
            .iter()
            .find(|c| c.role == Role::Student)
            .unwrap();
        let thread = find_class_thread(engine.store(), &fixture.class_7a).unwrap();
        assert!(thread.has_participant(&student.person_id));
        assert!(engine.login(&student.login, &student.password).await.is_ok());
    }

    #[tokio::test]
    async fn test_need_more_info_round_trip() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;
        let id = engine.submit_registration(family(&fixture)).await.unwrap();
        let director = fixture.login(&mut engine, "director").await;

        assert_validation(
            engine
                .review_registration(&director, &id, ReviewDecision::new(ApplicationStatus::NeedMoreInfo))
                .await,
            "Information request",
        );
        engine
            .review_registration(
                &director,
                &id,
                ReviewDecision::new(ApplicationStatus::NeedMoreInfo).with_info_request("Birth certificate?"),
            )
            .await
            .unwrap();
        engine
            .resubmit_registration(&id, "Attached at the office", None)
            .await
            .unwrap();

        let application = engine.store().get::<RegistrationApplication>(&id).unwrap();
        assert_eq!(application.status, ApplicationStatus::InReview);
        assert_eq!(application.applicant_reply.as_deref(), Some("Attached at the office"));
        assert_validation(engine.resubmit_registration(&id, "again", None).await, "not waiting");
    }

    #[tokio::test]
    async fn test_relation_request_lifecycle() {
        let mut fixture = SchoolFixture::new();
        let newcomer = fixture.add_person("parent.new", Role::Parent, &[]);
        let mut engine = fixture.engine().await;
        let parent = fixture.login(&mut engine, "parent.new").await;

        let student = fixture.login(&mut engine, "student.a").await;
        assert_unauthorized(engine.request_relation(&student, &fixture.student_b.id).await);

        let request = engine
            .request_relation(&parent, &fixture.student_a.id)
            .await
            .unwrap()
            .result;
        assert_validation(
            engine.request_relation(&parent, &fixture.student_a.id).await,
            "request already pending",
        );

        let outsider = fixture.login(&mut engine, "teacher.b").await;
        assert_unauthorized(engine.review_relation(&outsider, &request, true, None).await);

        let homeroom = fixture.login(&mut engine, "teacher.a").await;
        let status = engine
            .review_relation(&homeroom, &request, true, None)
            .await
            .unwrap()
            .result;
        assert_eq!(status, RelationStatus::Approved);
        let linked = engine.store().get::<Person>(&newcomer.id).unwrap();
        assert!(linked.is_parent_of(&fixture.student_a.id));
        let class_thread = find_class_thread(engine.store(), &fixture.class_7a).unwrap();
        assert!(class_thread.has_participant(&newcomer.id));

        assert_validation(
            engine
                .review_relation(&homeroom, &request, false, Some("late".to_string()))
                .await,
            "already resolved",
        );
    }
}
