//! A small populated school for tests
//!
//! Layout:
//! - class 7A (homeroom: teacher.a) with student.a, whose parent is parent.a
//! - class 8B taught by teacher.b with student.b
//! - director, admin and staff outside any class
//! - one math lesson in 7A
//!
//! Everyone signs in with `FIXTURE_PASSWORD`.

use super::memory::MemoryBlobStore;
use crate::core_messaging::{attach_parent_to_student_scope, ensure_class_thread};
use crate::core_store::model::*;
use crate::core_store::RecordStore;
use crate::engine::{Engine, EngineBuilder};
use crate::services::{Argon2Hasher, CredentialHasher};
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;

/// Password of every fixture account
pub const FIXTURE_PASSWORD: &str = "correct-horse";

/// Argon2 with minimal costs so tests stay fast
pub fn fast_hasher() -> Argon2Hasher {
    Argon2Hasher::with_params(8, 1, 1).expect("minimal argon2 params are valid")
}

fn names(en: &str) -> LocalizedNames {
    [(Lang::En, en.to_string())].into()
}

pub struct SchoolFixture {
    pub store: RecordStore,
    pub blobs: Arc<MemoryBlobStore>,
    password_hash: String,

    pub director: Person,
    pub administrator: Person,
    pub teacher_a: Person,
    pub teacher_b: Person,
    pub student_a: Person,
    pub student_b: Person,
    pub parent_a: Person,
    pub staff: Person,

    pub class_7a: ClassId,
    pub class_8b: ClassId,
    pub math: SubjectId,
    pub lesson_7a: LessonId,
}

impl Default for SchoolFixture {
    fn default() -> Self {
        SchoolFixture::new()
    }
}

impl SchoolFixture {
    pub fn new() -> Self {
        let password_hash = fast_hasher()
            .hash(FIXTURE_PASSWORD)
            .expect("hashing the fixture password");
        let mut store = RecordStore::new();

        let math = Subject::new(names("Mathematics"));
        let math_id = math.id.clone();
        store.upsert(math);

        let mut class_7a = ClassGroup::new(7, names("7A"));
        class_7a.subject_ids.insert(math_id.clone());
        let mut class_8b = ClassGroup::new(8, names("8B"));
        class_8b.subject_ids.insert(math_id.clone());
        let (id_7a, id_8b) = (class_7a.id.clone(), class_8b.id.clone());

        let person = |name: &str, login: &str, role: Role, classes: &[&ClassId]| {
            let mut p = Person::new(name, login, password_hash.clone(), role);
            p.class_ids = classes.iter().map(|c| (*c).clone()).collect();
            p
        };

        let director = person("Dana Director", "director", Role::Director, &[]);
        let administrator = person("Adil Admin", "admin", Role::Administrator, &[]);
        let mut teacher_a = person("Aigul Teacher", "teacher.a", Role::Teacher, &[&id_7a]);
        teacher_a.is_homeroom = true;
        let teacher_b = person("Boris Teacher", "teacher.b", Role::Teacher, &[&id_8b]);
        let student_a = person("Arman Student", "student.a", Role::Student, &[&id_7a]);
        let student_b = person("Bota Student", "student.b", Role::Student, &[&id_8b]);
        let mut parent_a = person("Asel Parent", "parent.a", Role::Parent, &[]);
        parent_a.child_ids.insert(student_a.id.clone());
        let staff = person("Saule Staff", "staff", Role::Staff, &[]);

        class_7a.homeroom_teacher_id = Some(teacher_a.id.clone());
        store.upsert(class_7a);
        store.upsert(class_8b);

        for p in [
            &director,
            &administrator,
            &teacher_a,
            &teacher_b,
            &student_a,
            &student_b,
            &parent_a,
            &staff,
        ] {
            store.upsert(p.clone());
        }

        let lesson = Lesson {
            id: LessonId::generate(),
            class_id: id_7a.clone(),
            teacher_id: teacher_a.id.clone(),
            subject_id: math_id.clone(),
            room: "101".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 9, 7).expect("valid date"),
            starts_at: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            ends_at: NaiveTime::from_hms_opt(9, 45, 0).expect("valid time"),
            status: LessonStatus::Normal,
            original_id: None,
            reason: None,
        };
        let lesson_id = lesson.id.clone();
        store.upsert(lesson);

        let now = Timestamp::now();
        for class_id in [&id_7a, &id_8b] {
            let _ = ensure_class_thread(&mut store, class_id, now);
        }
        let _ = attach_parent_to_student_scope(&mut store, &parent_a.id, &student_a.id, now);

        SchoolFixture {
            store,
            blobs: Arc::new(MemoryBlobStore::new()),
            password_hash,
            director,
            administrator,
            teacher_a,
            teacher_b,
            student_a,
            student_b,
            parent_a,
            staff,
            class_7a: id_7a,
            class_8b: id_8b,
            math: math_id,
            lesson_7a: lesson_id,
        }
    }

    /// Add another account that signs in with `FIXTURE_PASSWORD`
    pub fn add_person(&mut self, login: &str, role: Role, class_ids: &[ClassId]) -> Person {
        let mut person = Person::new(login, login, self.password_hash.clone(), role);
        person.class_ids = class_ids.iter().cloned().collect();
        self.store.upsert(person.clone());
        person
    }

    pub fn block(&mut self, person_id: &PersonId) {
        if let Some(person) = self.store.get_mut::<Person>(person_id) {
            person.blocked = true;
        }
    }

    /// Builder over a copy of the fixture store with test services
    pub fn engine_builder(&self) -> EngineBuilder {
        Engine::builder()
            .with_store(self.store.clone())
            .with_hasher(Arc::new(fast_hasher()))
            .with_blob_store(self.blobs.clone())
    }

    pub async fn engine(&self) -> Engine {
        self.engine_builder().build().await
    }

    /// Session token for `login`; panics if the login fails
    pub async fn login(&self, engine: &mut Engine, login: &str) -> String {
        match engine.login(login, FIXTURE_PASSWORD).await {
            Ok(response) => response.session.token,
            Err(e) => panic!("fixture login {} failed: {}", login, e),
        }
    }
}
