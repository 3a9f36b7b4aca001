/*
    core_workflow - Multi-step approval workflows

    - registration: application intake, information requests, approval with
      account creation
    - relations: parent-student link requests
*/

pub mod registration;
pub mod relations;

pub use registration::{
    resubmit_registration, review_registration, submit_registration, IssuedCredentials,
    ReviewDecision, ReviewOutcome,
};
pub use relations::{require_relation_reviewer, review_relation_request, submit_relation_request};
