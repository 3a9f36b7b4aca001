//! Threads, messages, announcements and feedback

use super::{Engine, OperationResponse};
use crate::core_access::{require_homeroom_of, require_role};
use crate::core_audit::{build_announcement_notification, build_feedback_status_notification, notify, notify_all};
use crate::core_messaging::{
    can_message, create_announcement_thread, find_or_create_direct, find_or_create_parent_teacher,
    mark_thread_read, post_message, PreparedMessage,
};
use crate::core_store::model::*;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::Instrument;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInput {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// `class_id: None` addresses the whole school (director only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementInput {
    pub class_id: Option<ClassId>,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub category: FeedbackCategory,
    pub text: String,
    #[serde(default)]
    pub visibility_roles: BTreeSet<Role>,
    #[serde(default)]
    pub is_private: bool,
    pub class_id: Option<ClassId>,
}

impl Engine {
    pub async fn open_direct_thread(
        &mut self,
        token: &str,
        target_id: &PersonId,
    ) -> CoreResult<OperationResponse<ThreadId>> {
        let (op, caller) = self.begin("open_direct_thread", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let sender = &caller.person;
            let target = self.store.require::<Person>(target_id)?;
            if !can_message(sender, target, &self.store) {
                return Err(CoreError::unauthorized(format!(
                    "{} may not message this {}",
                    sender.role, target.role
                )));
            }
            find_or_create_direct(&mut self.store, &sender.id, target_id, now)
        });
        self.commit(op, &caller, result)
    }

    /// Thread between a teacher and a parent whose child they teach
    ///
    /// Either side may open it.
    pub async fn open_parent_teacher_thread(
        &mut self,
        token: &str,
        other_id: &PersonId,
    ) -> CoreResult<OperationResponse<ThreadId>> {
        let (op, caller) = self.begin("open_parent_teacher_thread", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let me = &caller.person;
            let other = self.store.require::<Person>(other_id)?;
            let (teacher, parent) = match (me.role, other.role) {
                (Role::Teacher, Role::Parent) => (me, other),
                (Role::Parent, Role::Teacher) => (other, me),
                _ => {
                    return Err(CoreError::unauthorized(
                        "Parent-teacher threads join a teacher and a parent",
                    ))
                }
            };
            let teaches_child = parent.child_ids.iter().any(|child_id| {
                self.store
                    .get::<Person>(child_id)
                    .map(|child| child.shares_class_with(teacher))
                    .unwrap_or(false)
            });
            if !teaches_child || !other.can_sign_in() {
                return Err(CoreError::unauthorized("Teacher does not teach this parent's child"));
            }
            let (teacher_id, parent_id) = (teacher.id.clone(), parent.id.clone());
            find_or_create_parent_teacher(&mut self.store, &teacher_id, &parent_id, now)
        });
        self.commit(op, &caller, result)
    }

    pub async fn send_message(
        &mut self,
        token: &str,
        thread_id: &ThreadId,
        input: MessageInput,
    ) -> CoreResult<OperationResponse<MessageId>> {
        let (op, caller) = self.begin("send_message", token)?;
        let now = self.now();
        let result = self
            .send_message_as(&caller.person, thread_id, input, now)
            .instrument(op.span().clone())
            .await;
        self.commit(op, &caller, result)
    }

    async fn send_message_as(
        &mut self,
        sender: &Person,
        thread_id: &ThreadId,
        input: MessageInput,
        now: Timestamp,
    ) -> CoreResult<MessageId> {
        // same checks post_message makes, before any service runs
        let thread = self.store.require::<Thread>(thread_id)?;
        let is_director = sender.role == Role::Director;
        if !thread.has_participant(&sender.id) && !is_director {
            return Err(CoreError::unauthorized("Not a participant of this thread"));
        }
        if thread.kind == ThreadKind::Announcement
            && thread.created_by.as_ref() != Some(&sender.id)
            && !is_director
        {
            return Err(CoreError::unauthorized("Announcements are read-only"));
        }

        let content = self.prepare_text(&input.text, "Message text").await?;
        let attachments = self.persist_attachments(&input.attachments, "messages").await?;
        post_message(
            &mut self.store,
            thread_id,
            sender,
            PreparedMessage { content, attachments },
            now,
        )
    }

    /// Returns how many messages became read
    pub async fn mark_thread_read(
        &mut self,
        token: &str,
        thread_id: &ThreadId,
    ) -> CoreResult<OperationResponse<usize>> {
        let (op, caller) = self.begin("mark_thread_read", token)?;
        let result = op
            .span()
            .in_scope(|| mark_thread_read(&mut self.store, thread_id, &caller.person.id));
        self.commit(op, &caller, result)
    }

    /// Post an announcement and notify its audience
    pub async fn post_announcement(
        &mut self,
        token: &str,
        input: AnnouncementInput,
    ) -> CoreResult<OperationResponse<ThreadId>> {
        let (op, caller) = self.begin("post_announcement", token)?;
        let now = self.now();
        let result = self
            .post_announcement_as(&caller.person, input, now)
            .instrument(op.span().clone())
            .await;
        self.commit(op, &caller, result)
    }

    async fn post_announcement_as(
        &mut self,
        author: &Person,
        input: AnnouncementInput,
        now: Timestamp,
    ) -> CoreResult<ThreadId> {
        match (&input.class_id, author.role) {
            (_, Role::Director) => {}
            (Some(class_id), Role::Teacher) => {
                require_homeroom_of(author, self.store.require::<ClassGroup>(class_id)?)?
            }
            _ => {
                return Err(CoreError::unauthorized(
                    "Only the director or a homeroom teacher may announce",
                ))
            }
        }
        let title = input.title.trim();
        if title.is_empty() {
            return Err(CoreError::validation("Announcement title is required"));
        }

        let content = self.prepare_text(&input.text, "Announcement text").await?;

        let thread_id =
            create_announcement_thread(&mut self.store, &author.id, input.class_id.as_ref(), title, now)?;
        let mut body: LocalizedNames = content.translations.clone();
        body.insert(content.lang, content.text.clone());
        post_message(
            &mut self.store,
            &thread_id,
            author,
            PreparedMessage {
                content,
                attachments: Vec::new(),
            },
            now,
        )?;

        let audience: Vec<PersonId> = self
            .store
            .require::<Thread>(&thread_id)?
            .participant_ids
            .iter()
            .filter(|id| **id != author.id)
            .cloned()
            .collect();
        let notified = notify_all(
            &mut self.store,
            &audience,
            &build_announcement_notification(title, body),
            now,
        )?;
        tracing::info!(thread = %thread_id, notified, "Announcement posted");
        Ok(thread_id)
    }

    pub async fn create_feedback(
        &mut self,
        token: &str,
        input: FeedbackInput,
    ) -> CoreResult<OperationResponse<FeedbackId>> {
        let (op, caller) = self.begin("create_feedback", token)?;
        let now = self.now();
        let result = self
            .create_feedback_as(&caller.person, input, now)
            .instrument(op.span().clone())
            .await;
        self.commit(op, &caller, result)
    }

    async fn create_feedback_as(
        &mut self,
        author: &Person,
        input: FeedbackInput,
        now: Timestamp,
    ) -> CoreResult<FeedbackId> {
        if author.role == Role::Administrator {
            return Err(CoreError::unauthorized("Administrators do not take part in feedback"));
        }
        if let Some(class_id) = &input.class_id {
            self.store.require::<ClassGroup>(class_id)?;
            let own_class = match author.role {
                Role::Director | Role::Staff => true,
                Role::Parent => author.child_ids.iter().any(|child_id| {
                    self.store
                        .get::<Person>(child_id)
                        .map(|child| child.is_in_class(class_id))
                        .unwrap_or(false)
                }),
                _ => author.is_in_class(class_id),
            };
            if !own_class {
                return Err(CoreError::unauthorized(format!("No access to class {}", class_id)));
            }
        }
        let mut visibility_roles = input.visibility_roles;
        visibility_roles.remove(&Role::Administrator);
        if !input.is_private && visibility_roles.is_empty() {
            return Err(CoreError::validation("Choose who may read the feedback"));
        }

        let content = self.prepare_text(&input.text, "Feedback text").await?;

        let feedback = Feedback {
            id: FeedbackId::generate(),
            author_id: author.id.clone(),
            author_role: author.role,
            category: input.category,
            content,
            visibility_roles,
            is_private: input.is_private,
            class_id: input.class_id,
            status: FeedbackStatus::New,
            created_at: now,
        };
        let id = feedback.id.clone();
        self.store.insert(feedback)?;
        Ok(id)
    }

    /// Director moves feedback along and the author hears about it
    pub async fn set_feedback_status(
        &mut self,
        token: &str,
        feedback_id: &FeedbackId,
        status: FeedbackStatus,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("set_feedback_status", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            require_role(&caller.person, &[Role::Director])?;
            let feedback = self.store.require::<Feedback>(feedback_id)?;
            if feedback.status == status {
                return Ok(());
            }
            let author_id = feedback.author_id.clone();
            self.store
                .update::<Feedback, _>(feedback_id, |f| f.status = status)?;
            notify(
                &mut self.store,
                &author_id,
                &build_feedback_status_notification(status),
                now,
            )?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }
}
