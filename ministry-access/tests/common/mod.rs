//! Test helpers for ministry-access integration tests.
//!
//! Every `TestApp` is one installation: its own local key-value store and
//! therefore its own device id. Installations created with
//! [`TestApp::second_device`] share the remote document stores.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ministry_access::models::{
    Event, EventCategory, EventDetails, InviteCode, Role, UserInfo, UserProfile, UserSession,
};
use ministry_access::services::{
    Document, DocumentStore, KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore,
    PlatformInfo, StaticPlatform, StoreError, TransactionPolicy, Versioned,
};
use ministry_access::startup::{Application, Backends, Settings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const APP_ID: &str = "org.campus.ministry";

pub struct TestApp {
    pub app: Application,
    pub backends: Backends,
    settings: Settings,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::with_backends(Backends::in_memory(platform()), settings)
    }

    pub fn with_backends(backends: Backends, settings: Settings) -> Self {
        let app = Application::with_backends(backends.clone(), settings);
        Self {
            app,
            backends,
            settings,
        }
    }

    /// A retry budget large enough that `contenders` concurrent writers to
    /// one document always finish.
    pub fn for_contention(contenders: u32) -> Self {
        Self::with_settings(Settings {
            transactions: TransactionPolicy {
                max_attempts: contenders + 1,
            },
            ..Settings::default()
        })
    }

    /// Another installation against the same remote stores.
    pub fn second_device(&self) -> Self {
        let backends = Backends {
            local: Arc::new(MemoryKeyValueStore::new()),
            ..self.backends.clone()
        };
        Self::with_backends(backends, self.settings)
    }

    /// The same installation after an app restart.
    pub fn restarted(&self) -> Self {
        Self::with_backends(self.backends.clone(), self.settings)
    }

    pub async fn sign_in(&self, user_id: &str, role: Role) -> UserSession {
        self.app
            .sessions
            .sign_in(user(user_id), role)
            .await
            .expect("sign in")
    }

    pub async fn sign_in_admin(&self) -> UserSession {
        self.sign_in("admin-1", Role::Admin).await
    }

    pub async fn device_id(&self) -> String {
        self.app.devices.current().await.expect("device").device_id
    }

    pub async fn stored_code(&self, code: &str) -> InviteCode {
        self.backends
            .codes
            .get(code)
            .await
            .expect("read code")
            .expect("code exists")
            .document
    }

    pub async fn stored_profile(&self, user_id: &str) -> Option<UserProfile> {
        self.backends
            .users
            .get(user_id)
            .await
            .expect("read profile")
            .map(|v| v.document)
    }

    pub async fn stored_event(&self, id: &str) -> Event {
        self.backends
            .events
            .get(id)
            .await
            .expect("read event")
            .expect("event exists")
            .document
    }
}

/// An admin installation and a fresh code for `role` issued from it.
pub async fn issue_code(admin: &TestApp, role: Role) -> String {
    admin.sign_in_admin().await;
    admin
        .app
        .invites
        .generate(role, "welcome team", Some("fall retreat".to_string()))
        .await
        .expect("generate code")
        .code
}

pub fn platform() -> Arc<dyn PlatformInfo> {
    Arc::new(StaticPlatform {
        brand: "Apple".to_string(),
        model: "iPhone 15".to_string(),
        os_version: "17.4".to_string(),
        app_id: APP_ID.to_string(),
    })
}

pub fn user(user_id: &str) -> UserInfo {
    UserInfo {
        user_id: user_id.to_string(),
        name: format!("User {}", user_id),
        campus: "Main".to_string(),
        email: format!("{}@example.edu", user_id),
    }
}

pub fn event_details(title: &str, capacity: Option<u32>) -> EventDetails {
    let starts_at = Utc::now() + Duration::days(7);
    EventDetails {
        title: title.to_string(),
        description: "Weekly gathering".to_string(),
        location: "Chapel".to_string(),
        category: EventCategory::Worship,
        starts_at,
        ends_at: starts_at + Duration::hours(2),
        max_attendees: capacity,
        is_published: true,
    }
}

/// Document store whose reads or writes can be made to fail on demand.
pub struct FlakyStore<T> {
    pub inner: MemoryDocumentStore<T>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl<T> FlakyStore<T> {
    pub fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Internal(anyhow::anyhow!(
                "injected {} failure",
                what
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for FlakyStore<T> {
    async fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get(id).await
    }

    async fn insert(&self, document: &T) -> Result<bool, StoreError> {
        self.check(&self.fail_writes, "write")?;
        self.inner.insert(document).await
    }

    async fn replace_if_version(
        &self,
        id: &str,
        expected_version: u64,
        document: &T,
    ) -> Result<bool, StoreError> {
        self.check(&self.fail_writes, "write")?;
        self.inner
            .replace_if_version(id, expected_version, document)
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.check(&self.fail_writes, "write")?;
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.check(&self.fail_reads, "read")?;
        self.inner.list().await
    }
}

/// In-memory backends with a flaky `users` store.
pub fn backends_with_flaky_users() -> (Backends, Arc<FlakyStore<UserProfile>>) {
    let users = Arc::new(FlakyStore::<UserProfile>::new());
    let backends = Backends {
        users: users.clone(),
        ..Backends::in_memory(platform())
    };
    (backends, users)
}

/// In-memory backends with a flaky `invite_codes` store.
pub fn backends_with_flaky_codes() -> (Backends, Arc<FlakyStore<InviteCode>>) {
    let codes = Arc::new(FlakyStore::<InviteCode>::new());
    let backends = Backends {
        codes: codes.clone(),
        ..Backends::in_memory(platform())
    };
    (backends, codes)
}

pub async fn local_session_raw(store: &Arc<dyn KeyValueStore>) -> Option<String> {
    store
        .get(ministry_access::services::SESSION_KEY)
        .await
        .expect("read local store")
}

/// Local key-value store whose writes can be made to fail on demand.
pub struct FlakyKeyValueStore {
    pub inner: MemoryKeyValueStore,
    pub fail_writes: AtomicBool,
}

impl FlakyKeyValueStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal(anyhow::anyhow!("injected write failure")));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }
}
