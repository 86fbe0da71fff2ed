//! Account storage for the vault.
//!
//! A [`Credential`] is one stored TOTP account. The [`CredentialStore`]
//! keeps them in a single mutex-guarded map keyed by id. Share it behind an
//! `Arc`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use otpvault_core::totp::{self, TotpParams};

use crate::error::VaultError;
use crate::import::AccountRecord;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A stored account.
///
/// The camelCase JSON form is also the element format of backup
/// snapshots, so field names are part of the backup format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// UUID v4 assigned on insert.
    pub id: String,
    /// Display label, e.g. `"alice@example.com (GitHub)"`.
    pub user_info: String,
    /// Base32 secret, spaces removed.
    pub secret: String,
    /// Insert time, `YYYY-MM-DDTHH:MM:SSZ`.
    pub created: String,
}

impl Credential {
    /// TOTP code for `unix_time`, using SHA1 / 6 digits / 30 s.
    ///
    /// # Errors
    ///
    /// - [`VaultError::EmptySecret`] if the secret has been cleared
    /// - [`VaultError::Core`] if the secret is not valid Base32
    pub fn generate_token(&self, unix_time: u64) -> Result<String, VaultError> {
        let key = self.key()?;
        Ok(totp::generate_totp(&key, unix_time, &TotpParams::default())?)
    }

    /// TOTP code for the current system time.
    ///
    /// # Errors
    ///
    /// Same as [`Credential::generate_token`].
    pub fn current_token(&self) -> Result<String, VaultError> {
        self.generate_token(unix_now())
    }

    /// Check `code` against `unix_time`, allowing one step of clock drift.
    ///
    /// # Errors
    ///
    /// Same as [`Credential::generate_token`].
    pub fn validate_token(&self, code: &str, unix_time: u64) -> Result<bool, VaultError> {
        let key = self.key()?;
        Ok(totp::validate_totp(
            &key,
            unix_time,
            code,
            &TotpParams::default(),
        )?)
    }

    fn key(&self) -> Result<zeroize::Zeroizing<Vec<u8>>, VaultError> {
        if self.secret.trim().is_empty() {
            return Err(VaultError::EmptySecret);
        }
        Ok(zeroize::Zeroizing::new(totp::decode_secret(&self.secret)?))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    seq: u64,
    credential: Credential,
}

#[derive(Debug, Default)]
struct Entries {
    next_seq: u64,
    by_id: HashMap<String, Slot>,
}

impl Entries {
    fn insert(&mut self, credential: Credential) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.by_id
            .insert(credential.id.clone(), Slot { seq, credential });
    }
}

/// In-memory account store.
///
/// All methods take `&self`; the map sits behind one `Mutex`. `list`
/// returns accounts in insertion order.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: Mutex<Entries>,
}

impl CredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an imported record under a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn add(&self, record: &AccountRecord) -> Result<Credential, VaultError> {
        self.add_manual(&record.display_label(), &record.secret)
    }

    /// Store an account typed in by hand. Spaces in the secret are
    /// removed, since secrets are usually shown in groups of four.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn add_manual(&self, user_info: &str, secret: &str) -> Result<Credential, VaultError> {
        let credential = Credential {
            id: generate_uuid(),
            user_info: user_info.to_string(),
            secret: secret.replace(' ', ""),
            created: now_iso8601(),
        };
        self.lock()?.insert(credential.clone());
        tracing::debug!(id = %credential.id, "account added");
        Ok(credential)
    }

    /// Fetch one account.
    ///
    /// # Errors
    ///
    /// - [`VaultError::EntryNotFound`] if no account has this id
    /// - [`VaultError::Storage`] if the store lock is poisoned
    pub fn get(&self, id: &str) -> Result<Credential, VaultError> {
        self.lock()?
            .by_id
            .get(id)
            .map(|slot| slot.credential.clone())
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))
    }

    /// All accounts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn list(&self) -> Result<Vec<Credential>, VaultError> {
        let entries = self.lock()?;
        let mut slots: Vec<&Slot> = entries.by_id.values().collect();
        slots.sort_unstable_by_key(|slot| slot.seq);
        Ok(slots.into_iter().map(|slot| slot.credential.clone()).collect())
    }

    /// Number of stored accounts.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, VaultError> {
        Ok(self.lock()?.by_id.len())
    }

    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, VaultError> {
        Ok(self.lock()?.by_id.is_empty())
    }

    /// Remove one account. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn delete(&self, id: &str) -> Result<bool, VaultError> {
        Ok(self.lock()?.by_id.remove(id).is_some())
    }

    /// Remove every account.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn clear(&self) -> Result<(), VaultError> {
        self.lock()?.by_id.clear();
        Ok(())
    }

    /// Insert restored accounts whose id is not already present, keeping
    /// their id and creation time. Returns how many were inserted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the store lock is poisoned.
    pub fn merge(&self, credentials: Vec<Credential>) -> Result<usize, VaultError> {
        let mut entries = self.lock()?;
        let mut inserted = 0usize;
        for credential in credentials {
            if entries.by_id.contains_key(&credential.id) {
                continue;
            }
            entries.insert(credential);
            inserted = inserted.saturating_add(1);
        }
        Ok(inserted)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, VaultError> {
        self.entries
            .lock()
            .map_err(|_| VaultError::Storage("credential store lock poisoned".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Ids and timestamps
// ---------------------------------------------------------------------------

/// Random RFC 4122 version 4 UUID, lowercase hex.
pub(crate) fn generate_uuid() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    let hex = data_encoding::HEXLOWER.encode(&bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Seconds since the Unix epoch (0 if the clock is before it).
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub(crate) fn now_iso8601() -> String {
    format_utc(unix_now())
}

/// Format Unix seconds as `YYYY-MM-DDTHH:MM:SSZ` (proleptic Gregorian).
#[allow(clippy::arithmetic_side_effects)]
pub(crate) fn format_utc(secs: u64) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    // Hinnant's civil_from_days, with days counted from 0000-03-01.
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}
