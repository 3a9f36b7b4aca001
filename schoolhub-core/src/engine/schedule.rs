//! Timetable and classroom records
//!
//! Lessons, homework, lesson reports, per-student results and absences.
//! Teachers work inside their own classes; the administration everywhere.
//! Canceled lessons stay in the timetable until explicitly deleted, and a
//! changed lesson always points at the canceled lesson it replaces.

use super::{Engine, OperationResponse};
use crate::core_access::{require_class_access, require_parent_of, require_role, require_student_details_access};
use crate::core_store::model::*;
use crate::error::{CoreError, CoreResult};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

const TEACHING: &[Role] = &[Role::Director, Role::Administrator, Role::Teacher];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonInput {
    /// Existing lesson to edit
    pub id: Option<LessonId>,
    pub class_id: ClassId,
    /// Defaults to the caller when a teacher creates the lesson
    pub teacher_id: Option<PersonId>,
    pub subject_id: SubjectId,
    pub room: String,
    pub date: NaiveDate,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
}

/// Where and when the replacement lesson happens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleInput {
    pub date: NaiveDate,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    /// Defaults to the original room
    pub room: Option<String>,
    /// Defaults to the original teacher
    pub teacher_id: Option<PersonId>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeworkInput {
    pub id: Option<HomeworkId>,
    pub lesson_id: LessonId,
    pub text: String,
    pub due_on: NaiveDate,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonResultInput {
    pub lesson_id: LessonId,
    pub student_id: PersonId,
    pub grade: Option<u8>,
    pub present: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceInput {
    pub student_id: PersonId,
    pub lesson_id: Option<LessonId>,
    pub date: NaiveDate,
    pub reason: String,
}

fn check_times(starts_at: NaiveTime, ends_at: NaiveTime) -> CoreResult<()> {
    if starts_at < ends_at {
        Ok(())
    } else {
        Err(CoreError::validation("Start time must be before end time"))
    }
}

fn not_canceled(lesson: &Lesson) -> CoreResult<()> {
    if lesson.is_canceled() {
        Err(CoreError::validation("Canceled lessons cannot be edited"))
    } else {
        Ok(())
    }
}

impl Engine {
    /// Lesson the caller may work on
    fn lesson_for(&self, actor: &Person, lesson_id: &LessonId) -> CoreResult<Lesson> {
        require_role(actor, TEACHING)?;
        let lesson = self.store.require::<Lesson>(lesson_id)?.clone();
        require_class_access(actor, &lesson.class_id)?;
        Ok(lesson)
    }

    /// Teacher of a lesson: explicit, or the calling teacher
    fn lesson_teacher(&self, actor: &Person, teacher_id: Option<&PersonId>, class_id: &ClassId) -> CoreResult<PersonId> {
        let teacher_id = match teacher_id {
            Some(id) => id.clone(),
            None if actor.role == Role::Teacher => actor.id.clone(),
            None => return Err(CoreError::validation("Lesson teacher is required")),
        };
        if actor.role == Role::Teacher && teacher_id != actor.id {
            return Err(CoreError::unauthorized("Teachers schedule only their own lessons"));
        }
        let teacher = self.store.require::<Person>(&teacher_id)?;
        if teacher.role != Role::Teacher || !teacher.can_sign_in() {
            return Err(CoreError::validation("Lesson teacher must be an active teacher"));
        }
        if !teacher.is_in_class(class_id) {
            return Err(CoreError::validation("Teacher does not teach in this class"));
        }
        Ok(teacher_id)
    }

    pub async fn upsert_lesson(
        &mut self,
        token: &str,
        input: LessonInput,
    ) -> CoreResult<OperationResponse<LessonId>> {
        let (op, caller) = self.begin("upsert_lesson", token)?;
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            require_role(actor, TEACHING)?;
            require_class_access(actor, &input.class_id)?;
            let existing = match &input.id {
                Some(id) => Some(self.lesson_for(actor, id)?),
                None => None,
            };

            if let Some(existing) = &existing {
                not_canceled(existing)?;
                if existing.class_id != input.class_id {
                    return Err(CoreError::validation("Lesson cannot move to another class"));
                }
            }
            if self.store.require::<ClassGroup>(&input.class_id)?.archived {
                return Err(CoreError::validation("Class is archived"));
            }
            let subject = self.store.require::<Subject>(&input.subject_id)?;
            let subject_changed = existing
                .as_ref()
                .map(|l| l.subject_id != input.subject_id)
                .unwrap_or(true);
            if subject_changed && !subject.accepts_new_lessons() {
                return Err(CoreError::validation("Subject is archived"));
            }
            check_times(input.starts_at, input.ends_at)?;
            let teacher_id = self.lesson_teacher(actor, input.teacher_id.as_ref(), &input.class_id)?;

            let lesson = Lesson {
                id: input.id.clone().unwrap_or_else(LessonId::generate),
                class_id: input.class_id.clone(),
                teacher_id,
                subject_id: input.subject_id.clone(),
                room: input.room.trim().to_string(),
                date: input.date,
                starts_at: input.starts_at,
                ends_at: input.ends_at,
                status: existing.as_ref().map(|l| l.status).unwrap_or(LessonStatus::Normal),
                original_id: existing.as_ref().and_then(|l| l.original_id.clone()),
                reason: existing.and_then(|l| l.reason),
            };
            let id = lesson.id.clone();
            self.store.upsert(lesson);
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    /// Cancel `lesson_id` and add a changed lesson in its place
    pub async fn reschedule_lesson(
        &mut self,
        token: &str,
        lesson_id: &LessonId,
        input: RescheduleInput,
    ) -> CoreResult<OperationResponse<LessonId>> {
        let (op, caller) = self.begin("reschedule_lesson", token)?;
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            let original = self.lesson_for(actor, lesson_id)?;
            not_canceled(&original)?;
            let reason = input.reason.trim();
            if reason.is_empty() {
                return Err(CoreError::validation("Reason is required"));
            }
            check_times(input.starts_at, input.ends_at)?;
            let teacher_id = match &input.teacher_id {
                Some(id) => self.lesson_teacher(actor, Some(id), &original.class_id)?,
                None => original.teacher_id.clone(),
            };

            self.store.update::<Lesson, _>(lesson_id, |l| {
                l.status = LessonStatus::Canceled;
                l.reason = Some(reason.to_string());
            })?;
            let replacement = Lesson {
                id: LessonId::generate(),
                class_id: original.class_id.clone(),
                teacher_id,
                subject_id: original.subject_id.clone(),
                room: input
                    .room
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or(&original.room)
                    .to_string(),
                date: input.date,
                starts_at: input.starts_at,
                ends_at: input.ends_at,
                status: LessonStatus::Changed,
                original_id: Some(original.id.clone()),
                reason: Some(reason.to_string()),
            };
            let id = replacement.id.clone();
            self.store.insert(replacement)?;

            // homework is still due, so it moves with the lesson
            let moved: Vec<HomeworkId> = self
                .store
                .filter::<Homework, _>(|h| &h.lesson_id == lesson_id)
                .into_iter()
                .map(|h| h.id.clone())
                .collect();
            for hw in &moved {
                self.store.update::<Homework, _>(hw, |h| h.lesson_id = id.clone())?;
            }
            tracing::info!(original = %lesson_id, replacement = %id, homework = moved.len(), "Lesson rescheduled");
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    pub async fn cancel_lesson(
        &mut self,
        token: &str,
        lesson_id: &LessonId,
        reason: Option<String>,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("cancel_lesson", token)?;
        let result = op.span().in_scope(|| {
            let lesson = self.lesson_for(&caller.person, lesson_id)?;
            if lesson.is_canceled() {
                return Err(CoreError::validation("Lesson is already canceled"));
            }
            let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
            self.store.update::<Lesson, _>(lesson_id, |l| {
                l.status = LessonStatus::Canceled;
                l.reason = reason;
            })?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Hard delete with everything hanging off the lesson
    pub async fn delete_lesson(&mut self, token: &str, lesson_id: &LessonId) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("delete_lesson", token)?;
        let result = op.span().in_scope(|| {
            self.lesson_for(&caller.person, lesson_id)?;
            let replaced = self.store.find::<Lesson, _>(|l| {
                l.status == LessonStatus::Changed && l.original_id.as_ref() == Some(lesson_id)
            });
            if replaced.is_some() {
                return Err(CoreError::validation(
                    "Lesson is referenced by its replacement; delete that first",
                ));
            }

            self.store.remove::<Lesson>(lesson_id);
            let homework = self.store.remove_where::<Homework, _>(|h| &h.lesson_id == lesson_id);
            let reports = self.store.remove_where::<LessonReport, _>(|r| &r.lesson_id == lesson_id);
            let records = self
                .store
                .remove_where::<StudentLessonRecord, _>(|r| &r.lesson_id == lesson_id);
            let absences = self
                .store
                .remove_where::<Absence, _>(|a| a.lesson_id.as_ref() == Some(lesson_id));
            tracing::info!(lesson = %lesson_id, homework, reports, records, absences, "Lesson deleted");
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    pub async fn upsert_homework(
        &mut self,
        token: &str,
        input: HomeworkInput,
    ) -> CoreResult<OperationResponse<HomeworkId>> {
        let (op, caller) = self.begin("upsert_homework", token)?;
        let result = self
            .upsert_homework_as(&caller.person, input)
            .instrument(op.span().clone())
            .await;
        self.commit(op, &caller, result)
    }

    async fn upsert_homework_as(
        &mut self,
        actor: &Person,
        input: HomeworkInput,
    ) -> CoreResult<HomeworkId> {
        let lesson = self.lesson_for(actor, &input.lesson_id)?;
        let existing = match &input.id {
            Some(id) => Some(self.store.require::<Homework>(id)?.clone()),
            None => None,
        };
        if let Some(existing) = &existing {
            require_class_access(actor, &existing.class_id)?;
        }
        not_canceled(&lesson)?;
        if input.due_on < lesson.date {
            return Err(CoreError::validation("Due date cannot be before the lesson"));
        }

        let content = self.prepare_text(&input.text, "Homework text").await?;
        let attachments = self.persist_attachments(&input.attachments, "homework").await?;

        let (student_confirmed_ids, parent_confirmed_ids) = existing
            .map(|h| (h.student_confirmed_ids, h.parent_confirmed_ids))
            .unwrap_or_default();
        let homework = Homework {
            id: input.id.unwrap_or_else(HomeworkId::generate),
            lesson_id: lesson.id.clone(),
            class_id: lesson.class_id.clone(),
            teacher_id: if actor.role == Role::Teacher {
                actor.id.clone()
            } else {
                lesson.teacher_id.clone()
            },
            content,
            assigned_on: lesson.date,
            due_on: input.due_on,
            attachments,
            student_confirmed_ids,
            parent_confirmed_ids,
        };
        let id = homework.id.clone();
        self.store.upsert(homework);
        Ok(id)
    }

    pub async fn delete_homework(&mut self, token: &str, homework_id: &HomeworkId) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("delete_homework", token)?;
        let result = op.span().in_scope(|| {
            require_role(&caller.person, TEACHING)?;
            let class_id = self.store.require::<Homework>(homework_id)?.class_id.clone();
            require_class_access(&caller.person, &class_id)?;
            self.store.remove::<Homework>(homework_id);
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// A student marks homework done or not done
    pub async fn set_homework_done(
        &mut self,
        token: &str,
        homework_id: &HomeworkId,
        done: bool,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("set_homework_done", token)?;
        let result = op.span().in_scope(|| {
            let student = &caller.person;
            require_role(student, &[Role::Student])?;
            let homework = self.store.require::<Homework>(homework_id)?;
            if !student.is_in_class(&homework.class_id) {
                return Err(CoreError::unauthorized("Homework is not for your class"));
            }
            self.store.update::<Homework, _>(homework_id, |h| {
                if done {
                    h.student_confirmed_ids.insert(student.id.clone());
                } else {
                    h.student_confirmed_ids.remove(&student.id);
                }
            })?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// A parent confirms homework on behalf of their child
    pub async fn confirm_homework(
        &mut self,
        token: &str,
        homework_id: &HomeworkId,
        student_id: &PersonId,
        confirmed: bool,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("confirm_homework", token)?;
        let result = op.span().in_scope(|| {
            let parent = &caller.person;
            require_parent_of(parent, student_id)?;
            let class_id = self.store.require::<Homework>(homework_id)?.class_id.clone();
            if !self.store.require::<Person>(student_id)?.is_in_class(&class_id) {
                return Err(CoreError::validation("Homework is not for this student's class"));
            }
            self.store.update::<Homework, _>(homework_id, |h| {
                if confirmed {
                    h.parent_confirmed_ids.insert(parent.id.clone());
                } else {
                    h.parent_confirmed_ids.remove(&parent.id);
                }
            })?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// One report per lesson; a second call replaces the topic
    pub async fn upsert_lesson_report(
        &mut self,
        token: &str,
        lesson_id: &LessonId,
        topic: &str,
    ) -> CoreResult<OperationResponse<LessonReportId>> {
        let (op, caller) = self.begin("upsert_lesson_report", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            let lesson = self.lesson_for(actor, lesson_id)?;
            not_canceled(&lesson)?;
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(CoreError::validation("Topic is required"));
            }

            let existing = self
                .store
                .find::<LessonReport, _>(|r| &r.lesson_id == lesson_id)
                .map(|r| r.id.clone());
            let id = match existing {
                Some(id) => {
                    self.store.update::<LessonReport, _>(&id, |r| {
                        r.topic = topic.to_string();
                        r.teacher_id = actor.id.clone();
                    })?;
                    id
                }
                None => {
                    let report = LessonReport {
                        id: LessonReportId::generate(),
                        lesson_id: lesson.id.clone(),
                        class_id: lesson.class_id.clone(),
                        teacher_id: actor.id.clone(),
                        topic: topic.to_string(),
                        created_at: now,
                    };
                    let id = report.id.clone();
                    self.store.insert(report)?;
                    id
                }
            };
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    /// Grade and attendance of one student in one lesson
    pub async fn record_student_result(
        &mut self,
        token: &str,
        input: LessonResultInput,
    ) -> CoreResult<OperationResponse<LessonRecordId>> {
        let (op, caller) = self.begin("record_student_result", token)?;
        let result = op.span().in_scope(|| {
            let lesson = self.lesson_for(&caller.person, &input.lesson_id)?;
            not_canceled(&lesson)?;
            let student = self.store.require::<Person>(&input.student_id)?;
            if student.role != Role::Student || !student.is_in_class(&lesson.class_id) {
                return Err(CoreError::validation("Student is not in this lesson's class"));
            }
            if let Some(grade) = input.grade {
                if !(1..=5).contains(&grade) {
                    return Err(CoreError::validation("Grade must be between 1 and 5"));
                }
            }
            let comment = input
                .comment
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty());

            let existing = self
                .store
                .find::<StudentLessonRecord, _>(|r| {
                    r.lesson_id == input.lesson_id && r.student_id == input.student_id
                })
                .map(|r| r.id.clone());
            let record = StudentLessonRecord {
                id: existing.unwrap_or_else(LessonRecordId::generate),
                lesson_id: lesson.id,
                class_id: lesson.class_id,
                student_id: input.student_id,
                grade: input.grade,
                present: input.present,
                comment,
            };
            let id = record.id.clone();
            self.store.upsert(record);
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    /// Parents report their children; staff and teachers report students
    /// they may see in detail
    pub async fn report_absence(
        &mut self,
        token: &str,
        input: AbsenceInput,
    ) -> CoreResult<OperationResponse<AbsenceId>> {
        let (op, caller) = self.begin("report_absence", token)?;
        let result = op.span().in_scope(|| {
            let actor = &caller.person;
            let student = self.store.require::<Person>(&input.student_id)?.clone();
            if actor.role == Role::Parent {
                require_parent_of(actor, &student.id)?;
            } else {
                require_student_details_access(actor, &student)?;
            }
            if student.role != Role::Student {
                return Err(CoreError::validation("Absences are recorded for students"));
            }
            let reason = input.reason.trim();
            if reason.is_empty() {
                return Err(CoreError::validation("Reason is required"));
            }
            let date = match &input.lesson_id {
                Some(lesson_id) => {
                    let lesson = self.store.require::<Lesson>(lesson_id)?;
                    if !student.is_in_class(&lesson.class_id) {
                        return Err(CoreError::validation("Student is not in this lesson's class"));
                    }
                    lesson.date
                }
                None => input.date,
            };

            let absence = Absence {
                id: AbsenceId::generate(),
                student_id: student.id.clone(),
                lesson_id: input.lesson_id.clone(),
                date,
                reason: reason.to_string(),
                reported_by: actor.id.clone(),
            };
            let id = absence.id.clone();
            self.store.insert(absence)?;
            Ok(id)
        });
        self.commit(op, &caller, result)
    }
}
