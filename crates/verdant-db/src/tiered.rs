// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use time::OffsetDateTime;
use verdant_app::{PlantRecord, SettingKey, SettingValue, SyncState};

use crate::blob::BlobStore;
use crate::{Store, default_fallback_path, format_datetime, parse_datetime};

/// Which backend actually served a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    Primary,
    Fallback,
}

/// The local store the rest of the system talks to: SQLite first, flat-JSON
/// blob second. Writes fail only when both tiers fail; reads never fail.
pub struct TieredStore {
    primary: Option<Store>,
    primary_error: Option<String>,
    fallback: BlobStore,
}

impl TieredStore {
    /// Open the primary tier at `db_path`, degrading to fallback-only when
    /// the database cannot be opened or bootstrapped.
    pub fn open(db_path: &Path) -> Self {
        Self::with_paths(db_path, &default_fallback_path(db_path))
    }

    pub fn with_paths(db_path: &Path, fallback_path: &Path) -> Self {
        let fallback = BlobStore::new(fallback_path);
        match Store::open(db_path).and_then(|store| {
            store.bootstrap()?;
            Ok(store)
        }) {
            Ok(store) => Self {
                primary: Some(store),
                primary_error: None,
                fallback,
            },
            Err(error) => Self {
                primary: None,
                primary_error: Some(format!("{error:#}")),
                fallback,
            },
        }
    }

    /// Fallback-only store; used when the primary tier is known to be gone.
    pub fn degraded(fallback: BlobStore) -> Self {
        Self {
            primary: None,
            primary_error: Some("primary storage unavailable".to_owned()),
            fallback,
        }
    }

    pub fn primary_available(&self) -> bool {
        self.primary.is_some()
    }

    pub fn primary_error(&self) -> Option<&str> {
        self.primary_error.as_deref()
    }

    pub fn primary(&self) -> Option<&Store> {
        self.primary.as_ref()
    }

    pub fn fallback(&self) -> &BlobStore {
        &self.fallback
    }

    /// Atomically replace the persisted collection. Reports which tier took
    /// the write; errors only when both tiers refuse it.
    pub fn save_collection(&mut self, records: &[PlantRecord]) -> Result<StorageTier> {
        let primary_failure = match self.primary.as_mut() {
            Some(store) => match store.save_collection(records) {
                Ok(()) => return Ok(StorageTier::Primary),
                Err(error) => format!("{error:#}"),
            },
            None => self
                .primary_error
                .clone()
                .unwrap_or_else(|| "primary storage unavailable".to_owned()),
        };

        self.fallback
            .save_records(records)
            .map(|()| StorageTier::Fallback)
            .map_err(|fallback_error| {
                anyhow!(
                    "your changes were not saved: primary storage failed ({primary_failure}) and fallback storage failed ({fallback_error:#})"
                )
            })
    }

    /// Never fails: primary, else fallback, else empty.
    pub fn load_collection(&self) -> Vec<PlantRecord> {
        if let Some(store) = &self.primary
            && let Ok(records) = store.load_collection()
        {
            return records;
        }
        self.fallback.load_records().unwrap_or_default()
    }

    pub fn get_setting_raw(&self, key: &str) -> Option<String> {
        if let Some(store) = &self.primary
            && let Ok(value) = store.get_setting_raw(key)
        {
            return value;
        }
        self.fallback.get_setting(key).unwrap_or_default()
    }

    pub fn put_setting_raw(&mut self, key: &str, value: &str) -> Result<StorageTier> {
        let primary_failure = match self.primary.as_ref() {
            Some(store) => match store.put_setting_raw(key, value) {
                Ok(()) => return Ok(StorageTier::Primary),
                Err(error) => format!("{error:#}"),
            },
            None => self
                .primary_error
                .clone()
                .unwrap_or_else(|| "primary storage unavailable".to_owned()),
        };

        self.fallback
            .put_setting(key, value)
            .map(|()| StorageTier::Fallback)
            .map_err(|fallback_error| {
                anyhow!(
                    "setting `{key}` was not saved: primary storage failed ({primary_failure}) and fallback storage failed ({fallback_error:#})"
                )
            })
    }

    pub fn get_setting(&self, key: SettingKey) -> Result<Option<SettingValue>> {
        match self.get_setting_raw(key.as_str()) {
            Some(raw) => SettingValue::parse_for_key(key, &raw)
                .map(Some)
                .ok_or_else(|| {
                    anyhow!(
                        "setting `{}` has invalid value `{raw}`; store a valid value and retry",
                        key.as_str()
                    )
                }),
            None => Ok(None),
        }
    }

    pub fn put_setting(&mut self, key: SettingKey, value: SettingValue) -> Result<StorageTier> {
        let raw = value.to_storage(key).ok_or_else(|| {
            anyhow!(
                "setting `{}` expected {:?} value",
                key.as_str(),
                key.expected_value_kind()
            )
        })?;
        self.put_setting_raw(key.as_str(), &raw)
    }

    pub fn sync_state(&self) -> Result<SyncState> {
        Ok(SyncState {
            last_local_update_at: self.setting_timestamp(SettingKey::SyncLastLocalUpdate)?,
            last_synced_at: self.setting_timestamp(SettingKey::SyncLastSynced)?,
        })
    }

    pub fn put_last_local_update(&mut self, at: OffsetDateTime) -> Result<()> {
        self.put_setting_raw(
            SettingKey::SyncLastLocalUpdate.as_str(),
            &format_datetime(at)?,
        )
        .map(|_| ())
    }

    pub fn put_last_synced(&mut self, at: OffsetDateTime) -> Result<()> {
        self.put_setting_raw(SettingKey::SyncLastSynced.as_str(), &format_datetime(at)?)
            .map(|_| ())
    }

    fn setting_timestamp(&self, key: SettingKey) -> Result<Option<OffsetDateTime>> {
        match self.get_setting_raw(key.as_str()) {
            Some(raw) if !raw.trim().is_empty() => parse_datetime(&raw)
                .map(Some)
                .with_context(|| format!("setting `{}` holds a malformed timestamp", key.as_str())),
            Some(_) | None => Ok(None),
        }
    }
}
