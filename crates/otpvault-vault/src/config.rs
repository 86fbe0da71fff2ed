//! Vault settings, stored as plain JSON next to the data.
//!
//! These are the names the vault writes into exports and backups. Nothing
//! secret lives here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Vault settings.
///
/// Persisted to `{data_dir}/otpvault.json`. Missing keys take their
/// defaults, so older files keep loading as fields are added.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Issuer written into `otpauth://` export URIs.
    #[serde(default = "default_export_issuer")]
    pub export_issuer: String,

    /// File name of the snapshot inside a backup blob.
    #[serde(default = "default_backup_file_name")]
    pub backup_file_name: String,

    /// Description given to newly created backup blobs.
    #[serde(default = "default_backup_description")]
    pub backup_description: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            export_issuer: default_export_issuer(),
            backup_file_name: default_backup_file_name(),
            backup_description: default_backup_description(),
        }
    }
}

fn default_export_issuer() -> String {
    "TOTPTokenManager".into()
}
fn default_backup_file_name() -> String {
    "totp_secret_backup.json".into()
}
fn default_backup_description() -> String {
    "TOTP Backup".into()
}

const CONFIG_FILE: &str = "otpvault.json";
const CONFIG_TMP_FILE: &str = ".otpvault.json.tmp";

impl VaultConfig {
    /// Load settings from `{data_dir}/otpvault.json`.
    ///
    /// A missing or unreadable file yields [`VaultConfig::default`].
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        let Ok(contents) = fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt config file");
            Self::default()
        })
    }

    /// Write settings to `{data_dir}/otpvault.json`.
    ///
    /// The file is written to a temporary name and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the write or
    /// rename fails.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let tmp = data_dir.join(CONFIG_TMP_FILE);

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)
    }
}
