//! `otpvault-vault` — account store, QR import and backup for otpvault.
//!
//! Imports accounts from `otpauth-migration://` batch exports and
//! `otpauth://` URIs, keeps them in a [`CredentialStore`], produces TOTP
//! codes through `otpvault-core`, and snapshots the store to a remote
//! [`BlobStore`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod backup;
pub mod config;
pub mod entries;
pub mod error;
pub mod export;

pub mod import;

pub use backup::{
    delete_backup, list_backups, restore_backup, upload_backup, Blob, BlobMeta, BlobStore,
    MemoryBlobStore, UploadMode,
};
pub use config::VaultConfig;
pub use entries::{Credential, CredentialStore};
pub use error::VaultError;
pub use export::{export_uri, path_escape, query_escape};
pub use import::google_auth::{extract_records, parse_migration_uri, Extraction};
pub use import::otpauth::parse_otpauth_uri;
pub use import::wire::{for_each_field, DecodedField, FieldValue, WireError, WireType};
pub use import::{
    import_qr, parse_qr_data, AccountRecord, ImportError, ImportSummary, MalformedInfo,
    ParsedImport,
};
