/*
    emitter.rs - Append-only notification and admin logs

    Both logs are stored newest first. Notifications are rendered in the
    recipient's preferred language at emission time; admin log entries are
    mirrored to the tracing log.
*/

use super::builders::NotificationBody;
use crate::core_store::model::*;
use crate::core_store::{RecordStore, StoreResult};

/// Store one notification for `recipient_id`
pub fn notify(
    store: &mut RecordStore,
    recipient_id: &PersonId,
    message: &NotificationBody,
    now: Timestamp,
) -> StoreResult<NotificationId> {
    let lang = store
        .get::<Person>(recipient_id)
        .map(|p| p.preferred_lang)
        .unwrap_or_default();
    let (title, body) = message.render(lang);

    let notification = Notification {
        id: NotificationId::generate(),
        recipient_id: recipient_id.clone(),
        kind: message.kind,
        title,
        body,
        created_at: now,
        read: false,
    };
    let id = notification.id.clone();
    store.prepend(notification)?;

    tracing::debug!(recipient = %recipient_id, kind = ?message.kind, "Notification emitted");
    Ok(id)
}

/// Notify several recipients, skipping duplicates
pub fn notify_all<'a, I>(
    store: &mut RecordStore,
    recipients: I,
    message: &NotificationBody,
    now: Timestamp,
) -> StoreResult<usize>
where
    I: IntoIterator<Item = &'a PersonId>,
{
    let mut seen = std::collections::BTreeSet::new();
    for recipient in recipients {
        if seen.insert(recipient.clone()) {
            notify(store, recipient, message, now)?;
        }
    }
    Ok(seen.len())
}

/// Admin log entry under construction
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub actor_id: &'a PersonId,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: String,
    pub detail: String,
}

pub fn log_admin(store: &mut RecordStore, record: AuditRecord<'_>, now: Timestamp) -> StoreResult<()> {
    tracing::info!(
        actor = %record.actor_id,
        action = record.action,
        entity_type = record.entity_type,
        entity_id = %record.entity_id,
        "{}",
        record.detail
    );

    store.prepend(AdminLogEntry {
        id: LogEntryId::generate(),
        actor_id: record.actor_id.clone(),
        action: record.action.to_string(),
        entity_type: record.entity_type.to_string(),
        entity_id: record.entity_id,
        detail: record.detail,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_audit::builders::build_account_created_notification;

    #[test]
    fn test_notification_localized_for_recipient() {
        let mut store = RecordStore::new();
        let mut person = Person::new("A", "a", "h", Role::Parent);
        person.preferred_lang = Lang::Kk;
        let id = person.id.clone();
        store.insert(person).unwrap();

        notify(&mut store, &id, &build_account_created_notification("a"), Timestamp::now()).unwrap();

        let stored = &store.all::<Notification>()[0];
        assert_eq!(stored.title, "Қош келдіңіз");
        assert_eq!(stored.kind, NotificationKind::AccountCreated);
        assert!(!stored.read);
    }

    #[test]
    fn test_notify_all_deduplicates() {
        let mut store = RecordStore::new();
        let a = PersonId::new("a");
        let b = PersonId::new("b");
        let sent = notify_all(
            &mut store,
            [&a, &b, &a],
            &build_account_created_notification("x"),
            Timestamp::now(),
        )
        .unwrap();
        assert_eq!(sent, 2);
        assert_eq!(store.all::<Notification>().len(), 2);
    }

    #[test]
    fn test_admin_log_newest_first() {
        let mut store = RecordStore::new();
        let actor = PersonId::new("dir");
        for action in ["first", "second"] {
            log_admin(
                &mut store,
                AuditRecord {
                    actor_id: &actor,
                    action,
                    entity_type: "class",
                    entity_id: "c1".to_string(),
                    detail: String::new(),
                },
                Timestamp::now(),
            )
            .unwrap();
        }
        let log = store.all::<AdminLogEntry>();
        assert_eq!(log[0].action, "second");
        assert_eq!(log[1].action, "first");
    }
}
