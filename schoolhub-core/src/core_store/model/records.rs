/*
    records.rs - Owner-scoped side records

    Staff schedules, devices, notifications and the admin log. None of these
    carry invariants beyond their owner reference.
*/

use super::types::{DeviceId, LogEntryId, NotificationId, PersonId, ScheduleId, Timestamp};
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Recurring weekly working hours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffSchedule {
    pub id: ScheduleId,
    pub owner_id: PersonId,
    pub weekday: Weekday,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub note: Option<String>,
}

/// One-off deviation from the weekly schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffScheduleException {
    pub id: ScheduleId,
    pub owner_id: PersonId,
    pub date: NaiveDate,
    pub available: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePlatform {
    Android,
    Ios,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub owner_id: PersonId,
    pub push_token: String,
    pub platform: DevicePlatform,
    pub registered_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AccountCreated,
    RegistrationUpdate,
    RelationApproved,
    RelationRejected,
    FeedbackStatus,
    Announcement,
}

/// Message to a single user, already localized for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: PersonId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminLogEntry {
    pub id: LogEntryId,
    pub actor_id: PersonId,
    /// Short machine-readable code, e.g. "registration.approved"
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub detail: String,
    pub created_at: Timestamp,
}
