// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use verdant_app::PlantRecord;

/// Fallback tier: one JSON document mirroring the two logical tables of the
/// primary store. Used only while the SQLite tier is unavailable.
#[derive(Debug, Clone)]
pub struct BlobStore {
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDocument {
    #[serde(default)]
    pub records: Vec<PlantRecord>,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl BlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<BlobDocument> {
        if !self.path.exists() {
            return Ok(BlobDocument::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read fallback store {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("decode fallback store {}", self.path.display()))
    }

    pub fn save_records(&self, records: &[PlantRecord]) -> Result<()> {
        let mut document = self.load().unwrap_or_default();
        document.records = records.to_vec();
        self.write(&document)
    }

    pub fn load_records(&self) -> Result<Vec<PlantRecord>> {
        Ok(self.load()?.records)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.settings.get(key).cloned())
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut document = self.load().unwrap_or_default();
        document.settings.insert(key.to_owned(), value.to_owned());
        self.write(&document)
    }

    /// Temp-file-then-rename so a crash mid-write never leaves a torn blob.
    fn write(&self, document: &BlobDocument) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create fallback directory {}", parent.display()))?;
        }

        let encoded = serde_json::to_string_pretty(document).context("encode fallback store")?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, encoded)
            .with_context(|| format!("write fallback staging file {}", staging.display()))?;
        fs::rename(&staging, &self.path).with_context(|| {
            format!(
                "replace fallback store {} with staged copy",
                self.path.display()
            )
        })
    }
}
