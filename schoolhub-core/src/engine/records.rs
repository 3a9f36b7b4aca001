use super::{Engine, OperationResponse};
use crate::core_store::model::*;
use crate::error::{CoreError, CoreResult};
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Roles that keep working hours
const SCHEDULED_ROLES: &[Role] = &[Role::Director, Role::Administrator, Role::Teacher, Role::Staff];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInput {
    /// Existing entry to replace
    pub id: Option<ScheduleId>,
    /// Defaults to the caller
    pub owner_id: Option<PersonId>,
    pub weekday: Weekday,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleExceptionInput {
    pub owner_id: Option<PersonId>,
    pub date: NaiveDate,
    pub available: bool,
    pub note: Option<String>,
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

impl Engine {
    /// Resolve whose schedule `caller` is editing
    ///
    /// Everyone with working hours edits their own; the administration edits
    /// anyone's.
    fn schedule_owner(&self, caller: &Person, owner_id: Option<&PersonId>) -> CoreResult<PersonId> {
        let owner_id = owner_id.unwrap_or(&caller.id);
        if owner_id != &caller.id && !caller.role.is_elevated() {
            return Err(CoreError::unauthorized("Cannot edit another person's schedule"));
        }
        let owner = self.store.require::<Person>(owner_id)?;
        if !SCHEDULED_ROLES.contains(&owner.role) {
            return Err(CoreError::unauthorized(format!(
                "Role {} has no working schedule",
                owner.role
            )));
        }
        Ok(owner_id.clone())
    }

    pub async fn upsert_staff_schedule(
        &mut self,
        token: &str,
        input: ScheduleInput,
    ) -> CoreResult<OperationResponse<ScheduleId>> {
        let (op, caller) = self.begin("upsert_staff_schedule", token)?;
        let result = op.span().in_scope(|| {
            let owner_id = self.schedule_owner(&caller.person, input.owner_id.as_ref())?;
            if let Some(id) = &input.id {
                let existing = self.store.require::<StaffSchedule>(id)?;
                if existing.owner_id != owner_id {
                    return Err(CoreError::validation("Schedule entry belongs to someone else"));
                }
            }
            if input.starts_at >= input.ends_at {
                return Err(CoreError::validation("Start time must be before end time"));
            }

            let entry = StaffSchedule {
                id: input.id.unwrap_or_else(ScheduleId::generate),
                owner_id,
                weekday: input.weekday,
                starts_at: input.starts_at,
                ends_at: input.ends_at,
                note: clean_note(input.note),
            };
            let id = entry.id.clone();
            self.store.upsert(entry);
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    pub async fn delete_staff_schedule(
        &mut self,
        token: &str,
        schedule_id: &ScheduleId,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("delete_staff_schedule", token)?;
        let result = op.span().in_scope(|| {
            let owner_id = self.store.require::<StaffSchedule>(schedule_id)?.owner_id.clone();
            self.schedule_owner(&caller.person, Some(&owner_id))?;
            self.store.remove::<StaffSchedule>(schedule_id);
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Record a day off or an extra working day
    pub async fn add_schedule_exception(
        &mut self,
        token: &str,
        input: ScheduleExceptionInput,
    ) -> CoreResult<OperationResponse<ScheduleId>> {
        let (op, caller) = self.begin("add_schedule_exception", token)?;
        let result = op.span().in_scope(|| {
            let owner_id = self.schedule_owner(&caller.person, input.owner_id.as_ref())?;
            // one exception per owner and day; a new one replaces the old
            self.store.remove_where::<StaffScheduleException, _>(|e| {
                e.owner_id == owner_id && e.date == input.date
            });

            let exception = StaffScheduleException {
                id: ScheduleId::generate(),
                owner_id,
                date: input.date,
                available: input.available,
                note: clean_note(input.note),
            };
            let id = exception.id.clone();
            self.store.insert(exception)?;
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    pub async fn delete_schedule_exception(
        &mut self,
        token: &str,
        exception_id: &ScheduleId,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("delete_schedule_exception", token)?;
        let result = op.span().in_scope(|| {
            let owner_id = self
                .store
                .require::<StaffScheduleException>(exception_id)?
                .owner_id
                .clone();
            self.schedule_owner(&caller.person, Some(&owner_id))?;
            self.store.remove::<StaffScheduleException>(exception_id);
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Register a push token for the caller
    ///
    /// A token already known moves to the caller instead of being duplicated.
    pub async fn register_device(
        &mut self,
        token: &str,
        push_token: &str,
        platform: DevicePlatform,
    ) -> CoreResult<OperationResponse<DeviceId>> {
        let (op, caller) = self.begin("register_device", token)?;
        let now = self.now();
        let result = op.span().in_scope(|| {
            let push_token = push_token.trim();
            if push_token.is_empty() {
                return Err(CoreError::validation("Push token is required"));
            }

            let existing = self
                .store
                .find::<Device, _>(|d| d.push_token == push_token)
                .map(|d| d.id.clone());
            let id = match existing {
                Some(id) => {
                    self.store.update::<Device, _>(&id, |d| {
                        d.owner_id = caller.person.id.clone();
                        d.platform = platform;
                        d.registered_at = now;
                    })?;
                    id
                }
                None => {
                    let device = Device {
                        id: DeviceId::generate(),
                        owner_id: caller.person.id.clone(),
                        push_token: push_token.to_string(),
                        platform,
                        registered_at: now,
                    };
                    let id = device.id.clone();
                    self.store.insert(device)?;
                    id
                }
            };
            tracing::debug!(device = %id, platform = ?platform, "Device registered");
            Ok(id)
        });
        self.commit(op, &caller, result)
    }

    pub async fn unregister_device(
        &mut self,
        token: &str,
        device_id: &DeviceId,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("unregister_device", token)?;
        let result = op.span().in_scope(|| {
            let device = self.store.require::<Device>(device_id)?;
            if device.owner_id != caller.person.id {
                return Err(CoreError::not_found(format!("Device {}", device_id)));
            }
            self.store.remove::<Device>(device_id);
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Someone else's notification answers NotFound
    pub async fn mark_notification_read(
        &mut self,
        token: &str,
        notification_id: &NotificationId,
    ) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("mark_notification_read", token)?;
        let result = op.span().in_scope(|| {
            let owned = self
                .store
                .get::<Notification>(notification_id)
                .map(|n| n.recipient_id == caller.person.id)
                .unwrap_or(false);
            if !owned {
                return Err(CoreError::not_found(format!("Notification {}", notification_id)));
            }
            self.store
                .update::<Notification, _>(notification_id, |n| n.read = true)?;
            Ok(())
        });
        self.commit(op, &caller, result)
    }

    /// Returns how many notifications changed
    pub async fn mark_all_notifications_read(&mut self, token: &str) -> CoreResult<OperationResponse<usize>> {
        let (op, caller) = self.begin("mark_all_notifications_read", token)?;
        let result = op.span().in_scope(|| {
            let unread: Vec<NotificationId> = self
                .store
                .filter::<Notification, _>(|n| n.recipient_id == caller.person.id && !n.read)
                .into_iter()
                .map(|n| n.id.clone())
                .collect();
            for id in &unread {
                self.store.update::<Notification, _>(id, |n| n.read = true)?;
            }
            Ok(unread.len())
        });
        self.commit(op, &caller, result)
    }
}
