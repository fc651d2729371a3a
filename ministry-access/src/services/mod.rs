pub mod database;
pub mod device;
pub mod document_store;
pub mod error;
pub mod escalation;
pub mod events;
pub mod invite;
pub mod policy;
pub mod redis;
pub mod registration;
pub mod session;
pub mod storage;
pub mod transaction;

pub use database::{MongoDb, MongoStore};
pub use device::{DeviceFingerprintService, PlatformInfo, StaticPlatform, DEVICE_ID_KEY};
pub use document_store::{Document, DocumentStore, MemoryDocumentStore, Versioned};
pub use error::{AccessError, StoreError};
pub use escalation::RoleEscalation;
pub use events::EventRegistry;
pub use invite::{GenerateOptions, InviteCodeRegistry};
pub use policy::{Capability, RoleEscalationPolicy};
pub use self::redis::RedisKeyValueStore;
pub use registration::RegistrationCoordinator;
pub use session::{SessionStore, SESSION_KEY};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use transaction::{run_transaction, Commit, TransactionPolicy};
