//! End-to-end school workflows through the public engine API and the binary
//!
//! Each actor signs in against one shared engine whose store is cached in
//! a temporary directory, so a test can restart the engine and check that
//! everything came back from disk.

use anyhow::{anyhow, Context, Result};
use schoolhub_core::core_store::model::*;
use schoolhub_core::engine::{ClassInput, MessageInput, PersonInput};
use schoolhub_core::test_utils::fixtures::fast_hasher;
use schoolhub_core::{Config, CoreError, Engine};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

/// A signed-in member of the school
struct TestActor {
    name: String,
    login: String,
    password: String,
    token: String,
    person_id: PersonId,
}

impl TestActor {
    async fn sign_in(engine: &mut Engine, name: &str, login: &str, password: &str) -> Result<Self> {
        let response = engine
            .login(login, password)
            .await
            .map_err(|e| anyhow!("{} could not sign in: {}", name, e))?;
        Ok(Self {
            name: name.to_string(),
            login: login.to_string(),
            password: password.to_string(),
            token: response.session.token,
            person_id: response.person.id,
        })
    }

    async fn create(&self, engine: &mut Engine, name: &str, role: Role, classes: &[&ClassId]) -> Result<TestActor> {
        let input = PersonInput {
            name: name.to_string(),
            role,
            is_homeroom: false,
            preferred_lang: Lang::En,
            class_ids: classes.iter().map(|c| (*c).clone()).collect(),
            child_ids: Default::default(),
            profile: Profile::default(),
        };
        let credentials = engine
            .create_person(&self.token, input)
            .await
            .map_err(|e| anyhow!("{} could not create {}: {}", self.name, name, e))?
            .result;
        TestActor::sign_in(engine, name, &credentials.login, &credentials.password).await
    }

    async fn visible_messages(&self, engine: &mut Engine, thread_id: &ThreadId) -> Result<Vec<String>> {
        let response = engine.state(&self.token).await?;
        Ok(response
            .snapshot
            .messages_in(thread_id)
            .into_iter()
            .map(|m| m.content.text.clone())
            .collect())
    }
}

struct School {
    _dir: TempDir,
    cache: PathBuf,
}

impl School {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let cache = dir.path().join("schoolhub.json");
        Ok(Self { _dir: dir, cache })
    }

    async fn engine(&self) -> Engine {
        Engine::builder()
            .with_hasher(Arc::new(fast_hasher()))
            .with_cache_file(self.cache.clone())
            .build()
            .await
    }
}

fn class_input(grade: u8, name: &str) -> ClassInput {
    ClassInput {
        grade,
        names: [(Lang::En, name.to_string())].into(),
        homeroom_teacher_id: None,
        subject_ids: Default::default(),
    }
}

#[tokio::test]
async fn test_class_conversation_workflow() -> Result<()> {
    let school = School::new()?;
    let mut engine = school.engine().await;

    println!("\n=== Seeding the director ===");
    let seeded = engine.seed_director("Dana Director").await?;
    let director = TestActor::sign_in(&mut engine, "Director", &seeded.login, &seeded.password).await?;
    println!("✅ {} signed in as {}", director.name, director.login);

    println!("\n=== Building class 7A ===");
    let class_id = engine.create_class(&director.token, class_input(7, "7A")).await?.result;
    let teacher = director.create(&mut engine, "Aigul Teacher", Role::Teacher, &[&class_id]).await?;
    let student = director.create(&mut engine, "Arman Student", Role::Student, &[&class_id]).await?;
    println!("✅ {} and {} joined 7A", teacher.name, student.name);

    let state = engine.state(&teacher.token).await?;
    let class_thread = state
        .snapshot
        .data
        .threads
        .iter()
        .find(|t| t.class_id.as_ref() == Some(&class_id))
        .map(|t| t.id.clone())
        .context("class thread should be visible to its teacher")?;

    println!("\n=== Talking in the class thread ===");
    engine
        .send_message(
            &teacher.token,
            &class_thread,
            MessageInput {
                text: "Bring your atlases tomorrow".to_string(),
                attachments: vec![],
            },
        )
        .await?;
    engine
        .send_message(
            &student.token,
            &class_thread,
            MessageInput {
                text: "Will do".to_string(),
                attachments: vec![],
            },
        )
        .await?;

    let seen = student.visible_messages(&mut engine, &class_thread).await?;
    assert!(seen.iter().any(|t| t == "Bring your atlases tomorrow"));
    assert!(seen.iter().any(|t| t == "Will do"));
    println!("✅ {} sees {} messages", student.name, seen.len());

    println!("\n=== Restarting from the cache ===");
    engine.flush().await;
    engine.shutdown().await;

    let mut engine = school.engine().await;
    assert!(engine.bootstrap_report().loaded_local);

    let student = TestActor::sign_in(&mut engine, "Arman Student", &student.login, &student.password).await?;
    let seen = student.visible_messages(&mut engine, &class_thread).await?;
    assert_eq!(seen.len(), 2, "messages should survive a restart");
    println!("✅ {} still sees the conversation after restart", student.name);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_student_cannot_reach_another_class() -> Result<()> {
    let school = School::new()?;
    let mut engine = school.engine().await;

    let seeded = engine.seed_director("Dana Director").await?;
    let director = TestActor::sign_in(&mut engine, "Director", &seeded.login, &seeded.password).await?;
    let class_7a = engine.create_class(&director.token, class_input(7, "7A")).await?.result;
    let class_8b = engine.create_class(&director.token, class_input(8, "8B")).await?.result;
    let student_a = director.create(&mut engine, "Arman Student", Role::Student, &[&class_7a]).await?;
    let student_b = director.create(&mut engine, "Bota Student", Role::Student, &[&class_8b]).await?;

    let state = engine.state(&student_a.token).await?;
    assert!(!state.snapshot.contains_person(&student_b.person_id));
    assert!(state
        .snapshot
        .data
        .threads
        .iter()
        .all(|t| t.class_id.as_ref() != Some(&class_8b)));
    println!("✅ 8B is invisible to a 7A student");

    // Students cannot open direct threads with one another
    let outcome = engine.open_direct_thread(&student_a.token, &student_b.person_id).await;
    assert!(matches!(outcome, Err(CoreError::Unauthorized(_))), "got {:?}", outcome.map(|r| r.result));

    // Nor can they manage the directory
    let outcome = engine.create_class(&student_a.token, class_input(9, "9C")).await;
    assert!(matches!(outcome, Err(CoreError::Unauthorized(_))));
    println!("✅ student actions outside their scope are refused");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_second_director_cannot_be_seeded() -> Result<()> {
    let school = School::new()?;
    let mut engine = school.engine().await;

    engine.seed_director("Dana Director").await?;
    let again = engine.seed_director("Eve Impostor").await;
    assert!(matches!(again, Err(CoreError::Validation(_))));

    engine.shutdown().await;
    Ok(())
}

/// Run the built binary with quiet logs so stdout carries only JSON
fn schoolhub(config: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new(env!("CARGO_BIN_EXE_schoolhub"))
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .context("running schoolhub")
}

fn write_config(dir: &Path) -> Result<PathBuf> {
    let mut config = Config::default();
    config.store.cache_path = Some(dir.join("schoolhub.json"));
    config.blobs.root_dir = dir.join("blobs");
    config.auth.password_hash.m_cost = 8;
    config.auth.password_hash.t_cost = 1;

    let path = dir.join("config.toml");
    config.save_to_file(&path)?;
    Ok(path)
}

#[test]
fn test_cli_seed_login_snapshot() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(dir.path())?;

    let output = schoolhub(&config, &["seed-director", "Dana Director"])?;
    assert!(output.status.success(), "seed-director failed: {:?}", output);
    let credentials: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let login = credentials["login"].as_str().context("login in output")?.to_string();
    let password = credentials["password"].as_str().context("password in output")?.to_string();
    println!("✅ seeded {}", login);

    let output = schoolhub(&config, &["login", &login, &password])?;
    assert!(output.status.success(), "login failed: {:?}", output);
    let session: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let token = session["token"].as_str().context("token in output")?.to_string();
    assert_eq!(session["person"]["role"], "director");
    assert_eq!(session["person"]["password_hash"], "");

    let output = schoolhub(&config, &["snapshot", &token])?;
    assert!(output.status.success(), "snapshot failed: {:?}", output);
    let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let persons = snapshot["persons"].as_array().context("persons in snapshot")?;
    assert_eq!(persons.len(), 1);
    println!("✅ snapshot lists the director");

    let output = schoolhub(&config, &["login", &login, "not-the-password"])?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_cli_push_without_remote_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_config(dir.path())?;

    let output = schoolhub(&config, &["push"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No remote authority configured"), "stderr: {}", stderr);
    Ok(())
}
