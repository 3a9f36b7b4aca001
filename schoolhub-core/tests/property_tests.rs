//! Property tests over random operation sequences
//!
//! Each case replays a generated list of engine calls against the school
//! fixture. Most calls are refused by the guards; the properties must hold
//! whatever mix gets through.

use chrono::NaiveDate;
use proptest::prelude::*;
use schoolhub_core::core_access::FilteredSnapshot;
use schoolhub_core::core_messaging::{attach_parent_to_student_scope, ensure_class_thread};
use schoolhub_core::core_store::model::*;
use schoolhub_core::core_store::RecordStore;
use schoolhub_core::engine::{HomeworkInput, MessageInput};
use schoolhub_core::test_utils::{assert_no_leakage, SchoolFixture};
use std::collections::BTreeSet;

const LOGINS: &[&str] = &[
    "director",
    "admin",
    "teacher.a",
    "teacher.b",
    "student.a",
    "student.b",
    "parent.a",
    "staff",
];

#[derive(Debug, Clone)]
enum Op {
    OpenDirect { from: usize, to: usize },
    OpenParentTeacher { from: usize, to: usize },
    PostInClassThread { from: usize, class_b: bool },
    ToggleHomework { from: usize, done: bool },
    RequestRelation { student_b: bool },
    ReviewRelation { from: usize, approve: bool },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..LOGINS.len();
    prop_oneof![
        (who.clone(), who.clone()).prop_map(|(from, to)| Op::OpenDirect { from, to }),
        (who.clone(), who.clone()).prop_map(|(from, to)| Op::OpenParentTeacher { from, to }),
        (who.clone(), any::<bool>()).prop_map(|(from, class_b)| Op::PostInClassThread { from, class_b }),
        (who.clone(), any::<bool>()).prop_map(|(from, done)| Op::ToggleHomework { from, done }),
        any::<bool>().prop_map(|student_b| Op::RequestRelation { student_b }),
        (who, any::<bool>()).prop_map(|(from, approve)| Op::ReviewRelation { from, approve }),
    ]
}

fn person_of<'a>(fixture: &'a SchoolFixture, index: usize) -> &'a Person {
    match LOGINS[index] {
        "director" => &fixture.director,
        "admin" => &fixture.administrator,
        "teacher.a" => &fixture.teacher_a,
        "teacher.b" => &fixture.teacher_b,
        "student.a" => &fixture.student_a,
        "student.b" => &fixture.student_b,
        "parent.a" => &fixture.parent_a,
        _ => &fixture.staff,
    }
}

/// Replay `ops` and return the final store
fn replay(ops: &[Op]) -> (SchoolFixture, RecordStore, Vec<FilteredSnapshot>) {
    let mut fixture = SchoolFixture::new();
    let newcomer = fixture.add_person("parent.new", Role::Parent, &[]);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let (store, views) = runtime.block_on(async {
        let mut engine = fixture.engine().await;
        let mut tokens = Vec::new();
        for login in LOGINS {
            tokens.push(fixture.login(&mut engine, login).await);
        }
        let newcomer_token = fixture.login(&mut engine, &newcomer.login).await;

        let homework = engine
            .upsert_homework(
                &tokens[2],
                HomeworkInput {
                    id: None,
                    lesson_id: fixture.lesson_7a.clone(),
                    text: "Read chapter 3".to_string(),
                    due_on: NaiveDate::from_ymd_opt(2026, 9, 10).unwrap(),
                    attachments: vec![],
                },
            )
            .await
            .unwrap()
            .result;

        let mut requests = Vec::new();
        for op in ops {
            match op {
                Op::OpenDirect { from, to } => {
                    let _ = engine
                        .open_direct_thread(&tokens[*from], &person_of(&fixture, *to).id)
                        .await;
                }
                Op::OpenParentTeacher { from, to } => {
                    let _ = engine
                        .open_parent_teacher_thread(&tokens[*from], &person_of(&fixture, *to).id)
                        .await;
                }
                Op::PostInClassThread { from, class_b } => {
                    let class_id = if *class_b { &fixture.class_8b } else { &fixture.class_7a };
                    let thread = engine
                        .store()
                        .find::<Thread, _>(|t| t.kind == ThreadKind::Class && t.class_id.as_ref() == Some(class_id))
                        .map(|t| t.id.clone());
                    if let Some(thread) = thread {
                        let input = MessageInput {
                            text: "hello".to_string(),
                            attachments: vec![],
                        };
                        let _ = engine.send_message(&tokens[*from], &thread, input).await;
                    }
                }
                Op::ToggleHomework { from, done } => {
                    let _ = engine.set_homework_done(&tokens[*from], &homework, *done).await;
                }
                Op::RequestRelation { student_b } => {
                    let student = if *student_b { &fixture.student_b } else { &fixture.student_a };
                    if let Ok(response) = engine.request_relation(&newcomer_token, &student.id).await {
                        requests.push(response.result);
                    }
                }
                Op::ReviewRelation { from, approve } => {
                    if let Some(request) = requests.last() {
                        let _ = engine.review_relation(&tokens[*from], request, *approve, None).await;
                    }
                }
            }
        }

        let mut views = Vec::new();
        for token in &tokens {
            views.push(engine.state(token).await.unwrap().snapshot);
        }
        let store = engine.store().clone();
        engine.shutdown().await;
        (store, views)
    });
    (fixture, store, views)
}

fn pair(thread: &Thread) -> BTreeSet<PersonId> {
    thread.participant_ids.iter().cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_threads_stay_unique(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (fixture, store, _) = replay(&ops);

        let direct: Vec<BTreeSet<PersonId>> = store
            .filter::<Thread, _>(|t| t.kind == ThreadKind::Direct)
            .into_iter()
            .map(pair)
            .collect();
        let unique: BTreeSet<_> = direct.iter().cloned().collect();
        prop_assert_eq!(direct.len(), unique.len());

        for class_id in [&fixture.class_7a, &fixture.class_8b] {
            let count = store
                .filter::<Thread, _>(|t| t.kind == ThreadKind::Class && t.class_id.as_ref() == Some(class_id))
                .len();
            prop_assert_eq!(count, 1);
        }
    }

    #[test]
    fn prop_no_leakage_after_any_sequence(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (_, _, views) = replay(&ops);
        for view in &views {
            assert_no_leakage(view);
        }
    }

    #[test]
    fn prop_store_survives_serialization(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (_, store, _) = replay(&ops);
        let text = store.to_serialized().unwrap();
        let loaded = RecordStore::from_serialized(&text).unwrap();
        prop_assert_eq!(loaded.snapshot(), store.snapshot());
    }

    #[test]
    fn prop_homework_confirmations_have_no_duplicates(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let (fixture, store, _) = replay(&ops);
        for homework in store.all::<Homework>() {
            // Only students of the homework's class can ever confirm it
            prop_assert!(homework
                .student_confirmed_ids
                .iter()
                .all(|id| id == &fixture.student_a.id));
        }
    }

    #[test]
    fn prop_parent_scope_attach_is_idempotent(times in 1usize..5) {
        let mut fixture = SchoolFixture::new();
        let parent = fixture.add_person("parent.extra", Role::Parent, &[]);
        let store = &mut fixture.store;
        let now = Timestamp::now();

        attach_parent_to_student_scope(store, &parent.id, &fixture.student_b.id, now).unwrap();
        let once = store.clone_snapshot();
        for _ in 0..times {
            attach_parent_to_student_scope(store, &parent.id, &fixture.student_b.id, now).unwrap();
            ensure_class_thread(store, &fixture.class_8b, now).unwrap();
        }
        prop_assert_eq!(store.clone_snapshot(), once);
    }
}
