//! service-core: Shared infrastructure for the ministry services.
pub mod config;
pub mod error;
pub mod observability;

pub use mongodb;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
