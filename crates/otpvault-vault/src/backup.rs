//! Remote backup of the account list.
//!
//! A backup is a blob in some remote object store holding one file, named
//! after [`VaultConfig::backup_file_name`], whose content is the JSON array
//! of every [`Credential`]. The store itself sits behind [`BlobStore`];
//! authentication and transport belong to the implementation.
//!
//! ```text
//! BlobStore (trait)
//! └── MemoryBlobStore  (process-local, used by tests and embedders)
//! ```

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use crate::entries::{generate_uuid, now_iso8601, Credential, CredentialStore};
use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Blob store abstraction
// ---------------------------------------------------------------------------

/// Listing metadata for one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    pub id: String,
    pub description: String,
    /// Name of the single file the blob holds.
    pub file_name: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the last write.
    pub updated_at: String,
}

/// A blob with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub meta: BlobMeta,
    pub content: String,
}

/// Remote object store holding backup blobs.
pub trait BlobStore: Send + Sync {
    /// Every blob visible to the caller, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backup`] if the store cannot be reached.
    fn list(&self) -> Result<Vec<BlobMeta>, VaultError>;

    /// Fetch one blob.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backup`] if the blob does not exist or the
    /// store fails.
    fn read(&self, id: &str) -> Result<Blob, VaultError>;

    /// Create a blob holding `file_name` with `content`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backup`] if the store rejects the blob.
    fn create(
        &self,
        description: &str,
        file_name: &str,
        content: &str,
    ) -> Result<BlobMeta, VaultError>;

    /// Replace the content of an existing blob.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backup`] if the blob does not exist or the
    /// store fails.
    fn write(&self, id: &str, content: &str) -> Result<BlobMeta, VaultError>;

    /// Remove a blob.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backup`] if the blob does not exist or the
    /// store fails.
    fn delete(&self, id: &str) -> Result<(), VaultError>;
}

/// Process-local [`BlobStore`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<Vec<Blob>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Blob>>, VaultError> {
        self.blobs
            .lock()
            .map_err(|_| VaultError::Backup("blob store lock poisoned".to_string()))
    }
}

fn no_such_blob(id: &str) -> VaultError {
    VaultError::Backup(format!("no blob with id {id}"))
}

impl BlobStore for MemoryBlobStore {
    fn list(&self) -> Result<Vec<BlobMeta>, VaultError> {
        Ok(self.lock()?.iter().map(|blob| blob.meta.clone()).collect())
    }

    fn read(&self, id: &str) -> Result<Blob, VaultError> {
        self.lock()?
            .iter()
            .find(|blob| blob.meta.id == id)
            .cloned()
            .ok_or_else(|| no_such_blob(id))
    }

    fn create(
        &self,
        description: &str,
        file_name: &str,
        content: &str,
    ) -> Result<BlobMeta, VaultError> {
        let now = now_iso8601();
        let meta = BlobMeta {
            id: generate_uuid(),
            description: description.to_string(),
            file_name: file_name.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.lock()?.push(Blob {
            meta: meta.clone(),
            content: content.to_string(),
        });
        Ok(meta)
    }

    fn write(&self, id: &str, content: &str) -> Result<BlobMeta, VaultError> {
        let mut blobs = self.lock()?;
        let blob = blobs
            .iter_mut()
            .find(|blob| blob.meta.id == id)
            .ok_or_else(|| no_such_blob(id))?;
        blob.content = content.to_string();
        blob.meta.updated_at = now_iso8601();
        Ok(blob.meta.clone())
    }

    fn delete(&self, id: &str) -> Result<(), VaultError> {
        let mut blobs = self.lock()?;
        let before = blobs.len();
        blobs.retain(|blob| blob.meta.id != id);
        if blobs.len() == before {
            return Err(no_such_blob(id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backup operations
// ---------------------------------------------------------------------------

/// Where [`upload_backup`] writes the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Overwrite the oldest existing backup, creating one if there is none.
    #[default]
    Update,
    /// Always create a new backup blob.
    Create,
}

/// Snapshot every account into a backup blob.
///
/// # Errors
///
/// Returns [`VaultError::Backup`] on store failure, or
/// [`VaultError::Storage`] if the credential store is unusable.
pub fn upload_backup(
    store: &CredentialStore,
    blobs: &dyn BlobStore,
    config: &VaultConfig,
    mode: UploadMode,
) -> Result<BlobMeta, VaultError> {
    let credentials = store.list()?;
    let snapshot = serde_json::to_string(&credentials)?;

    let existing = match mode {
        UploadMode::Update => list_backups(blobs, config)?.into_iter().next(),
        UploadMode::Create => None,
    };
    let meta = match existing {
        Some(meta) => blobs.write(&meta.id, &snapshot)?,
        None => blobs.create(&config.backup_description, &config.backup_file_name, &snapshot)?,
    };

    tracing::info!(
        blob = %meta.id,
        accounts = credentials.len(),
        ?mode,
        "backup uploaded"
    );
    Ok(meta)
}

/// Read backup `id` and merge its accounts into `store`. Accounts whose id
/// is already present are left alone. Returns how many were added.
///
/// # Errors
///
/// Returns [`VaultError::Backup`] if the blob is missing, is not a backup,
/// or does not hold a valid snapshot.
pub fn restore_backup(
    store: &CredentialStore,
    blobs: &dyn BlobStore,
    config: &VaultConfig,
    id: &str,
) -> Result<usize, VaultError> {
    let credentials = read_snapshot(blobs, config, id)?;
    let total = credentials.len();
    let added = store.merge(credentials)?;
    tracing::info!(blob = %id, total, added, "backup restored");
    Ok(added)
}

/// Blobs that hold a backup file, oldest first.
///
/// # Errors
///
/// Returns [`VaultError::Backup`] if the store cannot be listed.
pub fn list_backups(
    blobs: &dyn BlobStore,
    config: &VaultConfig,
) -> Result<Vec<BlobMeta>, VaultError> {
    Ok(blobs
        .list()?
        .into_iter()
        .filter(|meta| meta.file_name == config.backup_file_name)
        .collect())
}

/// Delete backup `id`. Blobs that are not backups, or whose content is not
/// a valid snapshot, are refused and left in place.
///
/// # Errors
///
/// Returns [`VaultError::Backup`] for a refused or missing blob or a store
/// failure.
pub fn delete_backup(
    blobs: &dyn BlobStore,
    config: &VaultConfig,
    id: &str,
) -> Result<(), VaultError> {
    read_snapshot(blobs, config, id)?;
    blobs.delete(id)?;
    tracing::info!(blob = %id, "backup deleted");
    Ok(())
}

fn read_snapshot(
    blobs: &dyn BlobStore,
    config: &VaultConfig,
    id: &str,
) -> Result<Vec<Credential>, VaultError> {
    let blob = blobs.read(id)?;
    if blob.meta.file_name != config.backup_file_name {
        tracing::warn!(blob = %id, file = %blob.meta.file_name, "blob is not a backup");
        return Err(VaultError::Backup(format!("blob {id} is not a backup")));
    }
    serde_json::from_str(&blob.content).map_err(|e| {
        tracing::warn!(blob = %id, error = %e, "backup content is not a valid snapshot");
        VaultError::Backup(format!("invalid backup content in blob {id}: {e}"))
    })
}
