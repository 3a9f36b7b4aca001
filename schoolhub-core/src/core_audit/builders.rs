//! Builders for the notifications the engine sends
//!
//! Each builder returns the text in every supported language; the emitter
//! picks the recipient's language when storing.

use crate::core_store::model::{
    ApplicationStatus, FeedbackStatus, Lang, LocalizedNames, NotificationKind,
};

/// Title and body in every language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBody {
    pub kind: NotificationKind,
    pub title: LocalizedNames,
    pub body: LocalizedNames,
}

impl NotificationBody {
    fn new(kind: NotificationKind, title: [&str; 3], body: [String; 3]) -> Self {
        let [en_b, ru_b, kk_b] = body;
        NotificationBody {
            kind,
            title: [
                (Lang::En, title[0].to_string()),
                (Lang::Ru, title[1].to_string()),
                (Lang::Kk, title[2].to_string()),
            ]
            .into(),
            body: [(Lang::En, en_b), (Lang::Ru, ru_b), (Lang::Kk, kk_b)].into(),
        }
    }

    /// Title and body for `lang`, falling back to English
    pub fn render(&self, lang: Lang) -> (String, String) {
        (pick(&self.title, lang), pick(&self.body, lang))
    }
}

fn pick(names: &LocalizedNames, lang: Lang) -> String {
    names
        .get(&lang)
        .or_else(|| names.get(&Lang::En))
        .or_else(|| names.values().next())
        .cloned()
        .unwrap_or_default()
}

fn status_label(status: ApplicationStatus, lang: Lang) -> &'static str {
    use ApplicationStatus::*;
    match (lang, status) {
        (Lang::En, New) => "new",
        (Lang::En, InReview) => "in review",
        (Lang::En, NeedMoreInfo) => "more information needed",
        (Lang::En, Approved) => "approved",
        (Lang::En, Rejected) => "rejected",
        (Lang::Ru, New) => "новая",
        (Lang::Ru, InReview) => "на рассмотрении",
        (Lang::Ru, NeedMoreInfo) => "нужна дополнительная информация",
        (Lang::Ru, Approved) => "одобрена",
        (Lang::Ru, Rejected) => "отклонена",
        (Lang::Kk, New) => "жаңа",
        (Lang::Kk, InReview) => "қаралуда",
        (Lang::Kk, NeedMoreInfo) => "қосымша ақпарат қажет",
        (Lang::Kk, Approved) => "мақұлданды",
        (Lang::Kk, Rejected) => "қабылданбады",
    }
}

fn feedback_label(status: FeedbackStatus, lang: Lang) -> &'static str {
    use FeedbackStatus::*;
    match (lang, status) {
        (Lang::En, New) => "new",
        (Lang::En, Reviewed) => "reviewed",
        (Lang::En, Planned) => "planned",
        (Lang::En, Done) => "done",
        (Lang::Ru, New) => "новый",
        (Lang::Ru, Reviewed) => "рассмотрен",
        (Lang::Ru, Planned) => "запланирован",
        (Lang::Ru, Done) => "выполнен",
        (Lang::Kk, New) => "жаңа",
        (Lang::Kk, Reviewed) => "қаралды",
        (Lang::Kk, Planned) => "жоспарланды",
        (Lang::Kk, Done) => "орындалды",
    }
}

/// Sent to every account created by an approved application
pub fn build_account_created_notification(login: &str) -> NotificationBody {
    NotificationBody::new(
        NotificationKind::AccountCreated,
        ["Welcome", "Добро пожаловать", "Қош келдіңіз"],
        [
            format!("Your account is ready. Login: {}", login),
            format!("Ваш аккаунт создан. Логин: {}", login),
            format!("Аккаунтыңыз дайын. Логин: {}", login),
        ],
    )
}

/// Sent to existing users affected by an application review
pub fn build_registration_update_notification(
    status: ApplicationStatus,
    comment: Option<&str>,
) -> NotificationBody {
    let body = |lang: Lang, prefix: &str| match comment {
        Some(c) if !c.trim().is_empty() => format!("{}: {}. {}", prefix, status_label(status, lang), c.trim()),
        _ => format!("{}: {}", prefix, status_label(status, lang)),
    };
    NotificationBody::new(
        NotificationKind::RegistrationUpdate,
        ["Application update", "Обновление заявки", "Өтінім жаңартылды"],
        [
            body(Lang::En, "Application status"),
            body(Lang::Ru, "Статус заявки"),
            body(Lang::Kk, "Өтінім мәртебесі"),
        ],
    )
}

pub fn build_relation_approved_notification(student_name: &str) -> NotificationBody {
    NotificationBody::new(
        NotificationKind::RelationApproved,
        ["Request approved", "Запрос одобрен", "Сұраныс мақұлданды"],
        [
            format!("You are now linked to {}", student_name),
            format!("Вы привязаны к ученику {}", student_name),
            format!("Сіз {} оқушысымен байланыстырылдыңыз", student_name),
        ],
    )
}

pub fn build_relation_rejected_notification(comment: Option<&str>) -> NotificationBody {
    let reason = comment.map(str::trim).unwrap_or_default().to_string();
    NotificationBody::new(
        NotificationKind::RelationRejected,
        ["Request rejected", "Запрос отклонён", "Сұраныс қабылданбады"],
        [reason.clone(), reason.clone(), reason],
    )
}

pub fn build_feedback_status_notification(status: FeedbackStatus) -> NotificationBody {
    NotificationBody::new(
        NotificationKind::FeedbackStatus,
        ["Feedback update", "Обновление отзыва", "Пікір жаңартылды"],
        [
            format!("Your feedback is now {}", feedback_label(status, Lang::En)),
            format!("Статус вашего отзыва: {}", feedback_label(status, Lang::Ru)),
            format!("Пікіріңіздің мәртебесі: {}", feedback_label(status, Lang::Kk)),
        ],
    )
}

/// Announcement text is already localized per language by the caller
pub fn build_announcement_notification(title: &str, body: LocalizedNames) -> NotificationBody {
    NotificationBody {
        kind: NotificationKind::Announcement,
        title: [
            (Lang::En, title.to_string()),
            (Lang::Ru, title.to_string()),
            (Lang::Kk, title.to_string()),
        ]
        .into(),
        body,
    }
}
