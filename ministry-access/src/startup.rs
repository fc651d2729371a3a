//! Composition root. Every component is built here and handed its
//! collaborators explicitly.

use chrono::Duration;
use std::sync::Arc;

use crate::config::{AccessConfig, SessionBackend};
use crate::models::{Event, InviteCode, UserProfile, UserSession};
use crate::services::{
    AccessError, DeviceFingerprintService, DocumentStore, EventRegistry, FileKeyValueStore,
    InviteCodeRegistry, KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore, MongoDb,
    PlatformInfo, RedisKeyValueStore, RegistrationCoordinator, RoleEscalation, SessionStore,
    StaticPlatform, TransactionPolicy,
};
use service_core::error::AppError;

/// Storage seams the application runs against.
#[derive(Clone)]
pub struct Backends {
    pub codes: Arc<dyn DocumentStore<InviteCode>>,
    pub events: Arc<dyn DocumentStore<Event>>,
    pub users: Arc<dyn DocumentStore<UserProfile>>,
    pub local: Arc<dyn KeyValueStore>,
    pub platform: Arc<dyn PlatformInfo>,
}

impl Backends {
    /// Everything in process. Used by tests and offline runs.
    pub fn in_memory(platform: Arc<dyn PlatformInfo>) -> Self {
        Self {
            codes: Arc::new(MemoryDocumentStore::<InviteCode>::new()),
            events: Arc::new(MemoryDocumentStore::<Event>::new()),
            users: Arc::new(MemoryDocumentStore::<UserProfile>::new()),
            local: Arc::new(MemoryKeyValueStore::new()),
            platform,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub invite_validity: Duration,
    pub transactions: TransactionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            invite_validity: Duration::days(365),
            transactions: TransactionPolicy::default(),
        }
    }
}

impl From<&AccessConfig> for Settings {
    fn from(config: &AccessConfig) -> Self {
        Self {
            invite_validity: Duration::days(config.invite.validity_days),
            transactions: TransactionPolicy {
                max_attempts: config.store.tx_max_attempts,
            },
        }
    }
}

pub struct Application {
    pub devices: Arc<DeviceFingerprintService>,
    pub sessions: Arc<SessionStore>,
    pub invites: Arc<InviteCodeRegistry>,
    pub escalation: Arc<RoleEscalation>,
    pub registrations: Arc<RegistrationCoordinator>,
    pub events: Arc<EventRegistry>,
    db: Option<MongoDb>,
}

impl Application {
    /// Connect to MongoDB and the configured local store.
    pub async fn build(config: &AccessConfig) -> Result<Self, AppError> {
        let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        db.initialize_indexes()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let local: Arc<dyn KeyValueStore> = match config.session.backend {
            SessionBackend::File => {
                tracing::info!(dir = %config.session.dir, "Using file-backed local store");
                Arc::new(
                    FileKeyValueStore::new(&config.session.dir)
                        .await
                        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?,
                )
            }
            SessionBackend::Redis => {
                let url = config.session.redis_url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("REDIS_URL is required for the redis backend"))
                })?;
                Arc::new(
                    RedisKeyValueStore::new(url)
                        .await
                        .map_err(|e| AppError::ServiceUnavailable(anyhow::anyhow!(e)))?,
                )
            }
        };

        let platform: Arc<dyn PlatformInfo> = Arc::new(StaticPlatform {
            brand: config.device.brand.clone(),
            model: config.device.model.clone(),
            os_version: config.device.os_version.clone(),
            app_id: config.device.app_id.clone(),
        });

        let backends = Backends {
            codes: Arc::new(db.invite_codes()),
            events: Arc::new(db.events()),
            users: Arc::new(db.users()),
            local,
            platform,
        };

        let mut app = Self::with_backends(backends, Settings::from(config));
        app.db = Some(db);
        Ok(app)
    }

    pub fn with_backends(backends: Backends, settings: Settings) -> Self {
        let devices = Arc::new(DeviceFingerprintService::new(
            backends.local.clone(),
            backends.platform.clone(),
        ));
        let sessions = Arc::new(SessionStore::new(
            backends.local.clone(),
            devices.clone(),
            backends.codes.clone(),
        ));
        let invites = Arc::new(InviteCodeRegistry::new(
            backends.codes.clone(),
            backends.users.clone(),
            sessions.clone(),
            devices.clone(),
            settings.invite_validity,
            settings.transactions,
        ));
        let escalation = Arc::new(RoleEscalation::new(
            sessions.clone(),
            invites.clone(),
            backends.users.clone(),
            settings.transactions,
        ));
        let registrations = Arc::new(RegistrationCoordinator::new(
            backends.events.clone(),
            settings.transactions,
        ));
        let events = Arc::new(EventRegistry::new(
            backends.events,
            sessions.clone(),
            registrations.clone(),
            settings.transactions,
        ));

        Self {
            devices,
            sessions,
            invites,
            escalation,
            registrations,
            events,
            db: None,
        }
    }

    /// App-resume check; see [`SessionStore::resume`].
    pub async fn resume(&self) -> Result<Option<UserSession>, AccessError> {
        self.sessions.resume().await
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        match &self.db {
            Some(db) => db
                .health_check()
                .await
                .map_err(|e| AppError::ServiceUnavailable(anyhow::anyhow!(e))),
            None => Ok(()),
        }
    }
}
