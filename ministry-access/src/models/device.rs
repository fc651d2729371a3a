//! Device fingerprint - a per-installation identity label.
//!
//! The id is generated locally on first launch and regenerated on reinstall,
//! so it deters casual code sharing but is not hardware-rooted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub device_id: String,
    pub brand: String,
    pub model: String,
    pub os_version: String,
    pub app_id: String,
}

impl DeviceFingerprint {
    /// True when both fingerprints name the same installation of the same app.
    /// Brand/model/OS are informational and may drift with updates.
    pub fn same_installation(&self, other: &DeviceFingerprint) -> bool {
        self.device_id == other.device_id && self.app_id == other.app_id
    }

    /// SHA-256 of the identifying fields, hex encoded. Used in logs in place
    /// of the raw device id.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.device_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.app_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(device_id: &str, os_version: &str) -> DeviceFingerprint {
        DeviceFingerprint {
            device_id: device_id.to_string(),
            brand: "Pixel".to_string(),
            model: "8a".to_string(),
            os_version: os_version.to_string(),
            app_id: "org.campus.ministry".to_string(),
        }
    }

    #[test]
    fn test_os_update_keeps_installation() {
        let before = fingerprint("dev-1", "14");
        let after = fingerprint("dev-1", "15");
        assert!(before.same_installation(&after));
        assert_eq!(before.digest(), after.digest());
    }

    #[test]
    fn test_reinstall_is_a_new_installation() {
        let before = fingerprint("dev-1", "14");
        let after = fingerprint("dev-2", "14");
        assert!(!before.same_installation(&after));
        assert_ne!(before.digest(), after.digest());
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let digest = fingerprint("dev-1", "14").digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
