use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::models::DeviceFingerprint;

use super::error::AccessError;
use super::storage::KeyValueStore;

pub const DEVICE_ID_KEY: &str = "ministry.device.id";

/// Live platform metadata for the running installation.
pub trait PlatformInfo: Send + Sync {
    fn brand(&self) -> String;
    fn model(&self) -> String;
    fn os_version(&self) -> String;
    fn app_id(&self) -> String;
}

/// Platform values fixed at startup, typically from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPlatform {
    pub brand: String,
    pub model: String,
    pub os_version: String,
    pub app_id: String,
}

impl PlatformInfo for StaticPlatform {
    fn brand(&self) -> String {
        self.brand.clone()
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn os_version(&self) -> String {
        self.os_version.clone()
    }

    fn app_id(&self) -> String {
        self.app_id.clone()
    }
}

pub struct DeviceFingerprintService {
    store: Arc<dyn KeyValueStore>,
    platform: Arc<dyn PlatformInfo>,
    device_id: OnceCell<String>,
}

impl DeviceFingerprintService {
    pub fn new(store: Arc<dyn KeyValueStore>, platform: Arc<dyn PlatformInfo>) -> Self {
        Self {
            store,
            platform,
            device_id: OnceCell::new(),
        }
    }

    /// Fingerprint of this installation. The device id is created and
    /// persisted on first call; concurrent first callers share one id.
    pub async fn current(&self) -> Result<DeviceFingerprint, AccessError> {
        let device_id = self
            .device_id
            .get_or_try_init(|| self.load_or_create_id())
            .await?;

        Ok(DeviceFingerprint {
            device_id: device_id.clone(),
            brand: self.platform.brand(),
            model: self.platform.model(),
            os_version: self.platform.os_version(),
            app_id: self.platform.app_id(),
        })
    }

    /// True when `bound` names this installation.
    pub async fn verify(&self, bound: &DeviceFingerprint) -> Result<bool, AccessError> {
        let current = self.current().await?;
        let matches = current.same_installation(bound);
        if !matches {
            tracing::warn!(
                bound = %bound.digest(),
                current = %current.digest(),
                "Device fingerprint mismatch"
            );
        }
        Ok(matches)
    }

    async fn load_or_create_id(&self) -> Result<String, AccessError> {
        if let Some(existing) = self.store.get(DEVICE_ID_KEY).await? {
            let existing = existing.trim().to_string();
            if !existing.is_empty() {
                return Ok(existing);
            }
        }

        let device_id = Uuid::new_v4().to_string();
        self.store.set(DEVICE_ID_KEY, &device_id).await?;
        tracing::info!("Generated new device id for this installation");
        Ok(device_id)
    }
}
