/*
    engine - Public operations over the shared record store

    The Engine owns the store, the external services and the persistence
    queue. Every operation follows the same shape:
    1. start an OperationSpan and authenticate the caller
    2. run guards, then field validation, then any external service calls
    3. mutate the store (no suspension points from here on)
    4. enqueue the serialized store and answer with the caller's session,
       their own record and the snapshot they may see

    Operations take `&mut self`, so one mutation always finishes before the
    next begins.
*/

mod conversations;
mod directory;
mod records;
mod schedule;
mod workflows;

pub use conversations::{AnnouncementInput, FeedbackInput, MessageInput};
pub use directory::{ClassInput, PersonInput, PersonUpdate};
pub use records::{ScheduleExceptionInput, ScheduleInput};
pub use schedule::{AbsenceInput, HomeworkInput, LessonInput, LessonResultInput, RescheduleInput};

use crate::config::{Config, ConfigError};
use crate::core_access::{
    require_auth, resolve_snapshot, Authenticated, FilteredSnapshot, Session, SessionCodec,
};
use crate::core_store::model::{LocalizedText, Person, Timestamp};
use crate::core_store::{RecordStore, SnapshotFile};
use crate::core_sync::{
    BootstrapReport, HttpRemoteAuthority, RemoteAuthority, SyncCoordinator, SyncTicket, SyncWorker,
    DEFAULT_REMOTE_TIMEOUT,
};
use crate::error::{CoreError, CoreResult};
use crate::services::{
    Argon2Hasher, BlobStore, CredentialHasher, LocalBlobStore, Localizer, ScriptLocalizer,
};
use crate::telemetry::{OperationSpan, TelemetryCollector, TelemetrySnapshot};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Source of "now" for sessions and record timestamps
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// What every operation hands back
#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse<T = ()> {
    pub session: Session,
    /// The caller's own record, password hash blanked
    pub person: Person,
    pub snapshot: FilteredSnapshot,
    /// Operation-specific value (created id, issued credentials, ...)
    pub result: T,
}

/// Assembles an Engine and runs startup reconciliation
pub struct EngineBuilder {
    store: RecordStore,
    session_ttl: Duration,
    localizer: Arc<dyn Localizer>,
    blobs: Arc<dyn BlobStore>,
    hasher: Arc<dyn CredentialHasher>,
    cache: Option<SnapshotFile>,
    remote: Option<Arc<dyn RemoteAuthority>>,
    remote_timeout: Duration,
    telemetry: Arc<TelemetryCollector>,
    clock: Clock,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        EngineBuilder::new()
    }
}

impl EngineBuilder {
    /// In-memory engine with the default services and no persistence
    pub fn new() -> Self {
        EngineBuilder {
            store: RecordStore::new(),
            session_ttl: crate::core_access::DEFAULT_SESSION_TTL,
            localizer: Arc::new(ScriptLocalizer),
            blobs: Arc::new(LocalBlobStore::new(PathBuf::from("./data/blobs"))),
            hasher: Arc::new(Argon2Hasher::new()),
            cache: None,
            remote: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            telemetry: Arc::new(TelemetryCollector::new()),
            clock: Arc::new(Timestamp::now),
        }
    }

    /// Builder wired from application configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let costs = config.auth.password_hash;
        let hasher = Argon2Hasher::with_params(costs.m_cost, costs.t_cost, costs.p_cost)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let mut builder = EngineBuilder::new()
            .with_session_ttl(config.auth.session_ttl)
            .with_hasher(Arc::new(hasher))
            .with_blob_store(Arc::new(LocalBlobStore::new(config.blobs.root_dir.clone())))
            .with_remote_timeout(config.sync.timeout);

        if let Some(path) = &config.store.cache_path {
            builder = builder.with_cache_file(path.clone());
        }
        if let Some(url) = &config.sync.remote_url {
            builder = builder.with_remote(Arc::new(HttpRemoteAuthority::new(url.clone())));
        }
        Ok(builder)
    }

    /// Initial contents, replaced by the cache or the remote if they answer
    pub fn with_store(mut self, store: RecordStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache = Some(SnapshotFile::new(path));
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteAuthority>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Load the cache, reconcile with the remote and start the sync worker
    pub async fn build(self) -> Engine {
        let mut store = self.store;
        let mut worker = SyncWorker::new(
            self.cache,
            self.remote,
            self.remote_timeout,
            self.telemetry.clone(),
        );
        let bootstrap = worker.bootstrap(&mut store).await;
        info!(
            loaded_local = bootstrap.loaded_local,
            pulled_remote = bootstrap.pulled_remote,
            records = store.stats().record_count,
            "Engine started"
        );

        Engine {
            store,
            sessions: SessionCodec::new(self.session_ttl),
            localizer: self.localizer,
            blobs: self.blobs,
            hasher: self.hasher,
            sync: worker.spawn(),
            telemetry: self.telemetry,
            clock: self.clock,
            bootstrap,
            last_ticket: None,
        }
    }
}

/// The authorization-aware data engine
pub struct Engine {
    store: RecordStore,
    sessions: SessionCodec,
    localizer: Arc<dyn Localizer>,
    blobs: Arc<dyn BlobStore>,
    hasher: Arc<dyn CredentialHasher>,
    sync: SyncCoordinator,
    telemetry: Arc<TelemetryCollector>,
    clock: Clock,
    bootstrap: BootstrapReport,
    last_ticket: Option<SyncTicket>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine configured from `config`, after startup reconciliation
    pub async fn open(config: &Config) -> Result<Engine, ConfigError> {
        Ok(EngineBuilder::from_config(config)?.build().await)
    }

    /// Read access to the live store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn bootstrap_report(&self) -> BootstrapReport {
        self.bootstrap
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Ticket of the most recent persistence step
    pub fn last_sync_ticket(&self) -> Option<SyncTicket> {
        self.last_ticket.clone()
    }

    /// Where a stored attachment can be read from
    pub fn attachment_url(&self, uri: &str) -> String {
        self.blobs.public_url(uri)
    }

    /// Text of `original` as `viewer` should read it
    pub async fn localize(&self, original: &LocalizedText, viewer: &Person, show_original: bool) -> String {
        self.localizer
            .localize(original, viewer.preferred_lang, show_original)
            .await
    }

    /// Wait until every queued persistence step has been applied
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    /// Queue the current store without a mutation, e.g. to refresh a remote
    pub fn sync_now(&mut self) -> Option<SyncTicket> {
        self.persist();
        self.last_ticket.clone()
    }

    /// Drain the persistence queue and stop the worker
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
        info!("Engine stopped");
    }

    /// Exchange a login and password for a session
    pub async fn login(&mut self, login: &str, password: &str) -> CoreResult<OperationResponse> {
        let op = OperationSpan::start("login", self.telemetry.clone());
        let response = op
            .span()
            .in_scope(|| self.check_credentials(login, password))
            .and_then(|caller| {
                op.record_actor(&caller.person.id, caller.person.role);
                self.respond(&caller, ())
            });
        op.finish(&response);
        response
    }

    fn check_credentials(&self, login: &str, password: &str) -> CoreResult<Authenticated> {
        let invalid = || CoreError::validation("Invalid login or password");
        let person = self.store.person_by_login(login).ok_or_else(invalid)?;
        if !self.hasher.verify(password, &person.password_hash) {
            return Err(invalid());
        }
        if !person.can_sign_in() {
            return Err(CoreError::unauthorized("Account is inactive or blocked"));
        }

        let session = self.sessions.issue(&person.id, person.role, self.now());
        info!(person = %person.id, role = %person.role, "Signed in");
        Ok(Authenticated {
            person: person.clone(),
            session,
        })
    }

    /// Current view of the store for the caller
    pub async fn state(&mut self, token: &str) -> CoreResult<OperationResponse> {
        let (op, caller) = self.begin("state", token)?;
        let response = self.respond(&caller, ());
        op.finish(&response);
        response
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Start an operation for an authenticated caller
    ///
    /// An authentication failure closes the span before returning.
    fn begin(&self, name: &'static str, token: &str) -> CoreResult<(OperationSpan, Authenticated)> {
        let op = OperationSpan::start(name, self.telemetry.clone());
        match require_auth(&self.store, &self.sessions, token, self.now()) {
            Ok(caller) => {
                op.record_actor(&caller.person.id, caller.person.role);
                Ok((op, caller))
            }
            Err(err) => {
                let failed: CoreResult<()> = Err(err.clone());
                op.finish(&failed);
                Err(err)
            }
        }
    }

    /// Persist the mutation and answer the caller
    fn commit<T>(
        &mut self,
        op: OperationSpan,
        caller: &Authenticated,
        result: CoreResult<T>,
    ) -> CoreResult<OperationResponse<T>> {
        let response = result.and_then(|value| {
            self.persist();
            self.respond(caller, value)
        });
        op.finish(&response);
        response
    }

    /// Queue the current state on the persistence worker
    fn persist(&mut self) {
        match self.store.to_serialized() {
            Ok(text) => self.last_ticket = Some(self.sync.enqueue(text)),
            Err(e) => warn!(error = %e, "Failed to serialize store, skipping persistence"),
        }
    }

    fn respond<T>(&self, caller: &Authenticated, result: T) -> CoreResult<OperationResponse<T>> {
        let mut person = self.store.require::<Person>(&caller.person.id)?.clone();
        let snapshot = resolve_snapshot(&person, &self.store);
        person.password_hash.clear();
        Ok(OperationResponse {
            session: caller.session.clone(),
            person,
            snapshot,
            result,
        })
    }

    /// Trimmed text stamped with its detected language
    async fn prepare_text(&self, text: &str, field: &str) -> CoreResult<LocalizedText> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::validation(format!("{} is required", field)));
        }
        let lang = self.localizer.detect_language(text).await;
        Ok(LocalizedText::new(text, lang))
    }

    /// Persist attachment uris under `prefix`, in order
    async fn persist_attachments(&self, uris: &[String], prefix: &str) -> CoreResult<Vec<String>> {
        let mut stored = Vec::with_capacity(uris.len());
        for uri in uris {
            let durable = self
                .blobs
                .persist(uri, prefix)
                .await
                .map_err(|e| CoreError::validation(e.to_string()))?;
            stored.push(durable);
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::SyncStatus;
    use crate::test_utils::{
        assert_no_leakage, assert_unauthorized, assert_validation, SchoolFixture, FIXTURE_PASSWORD,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_login_issues_session_and_snapshot() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;

        let response = engine.login("teacher.a", FIXTURE_PASSWORD).await.unwrap();
        assert_eq!(response.person.id, fixture.teacher_a.id);
        assert!(response.person.password_hash.is_empty());
        assert_eq!(response.session.person_id, fixture.teacher_a.id);
        assert_no_leakage(&response.snapshot);
    }

    #[tokio::test]
    async fn test_wrong_password_is_validation_error() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;

        assert_validation(engine.login("teacher.a", "nope").await, "Invalid login or password");
        assert_validation(engine.login("nobody", FIXTURE_PASSWORD).await, "Invalid login or password");
        assert_eq!(engine.telemetry().operation_errors, 2);
    }

    #[tokio::test]
    async fn test_blocked_person_cannot_login() {
        let mut fixture = SchoolFixture::new();
        let student_b = fixture.student_b.id.clone();
        fixture.block(&student_b);
        let mut engine = fixture.engine().await;

        assert_unauthorized(engine.login("student.b", FIXTURE_PASSWORD).await);
    }

    #[tokio::test]
    async fn test_expired_session_is_unauthorized() {
        let fixture = SchoolFixture::new();
        let millis = Arc::new(AtomicU64::new(1_000));
        let clock_source = millis.clone();
        let mut engine = fixture
            .engine_builder()
            .with_session_ttl(Duration::from_secs(60))
            .with_clock(Arc::new(move || {
                Timestamp::from_millis(clock_source.load(Ordering::SeqCst))
            }))
            .build()
            .await;

        let token = engine.login("director", FIXTURE_PASSWORD).await.unwrap().session.token;
        assert!(engine.state(&token).await.is_ok());

        millis.store(61_000 + 1_000, Ordering::SeqCst);
        assert_unauthorized(engine.state(&token).await);
    }

    #[tokio::test]
    async fn test_state_is_read_only() {
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine().await;
        let token = fixture.login(&mut engine, "student.a").await;

        engine.state(&token).await.unwrap();
        assert!(engine.last_sync_ticket().is_none());
    }

    #[tokio::test]
    async fn test_mutation_enqueues_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache.json");
        let fixture = SchoolFixture::new();
        let mut engine = fixture.engine_builder().with_cache_file(&cache).build().await;
        let token = fixture.login(&mut engine, "director").await;

        engine.mark_all_notifications_read(&token).await.unwrap();
        let ticket = engine.last_sync_ticket().unwrap();
        assert_eq!(ticket.wait().await, SyncStatus::Succeeded);

        let cached = tokio::fs::read_to_string(&cache).await.unwrap();
        assert_eq!(cached, engine.store().to_serialized().unwrap());
    }
}
