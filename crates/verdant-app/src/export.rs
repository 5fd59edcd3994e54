// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::PlantRecord;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-initiated download of the whole garden. There is no import path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(with = "time::serde::rfc3339")]
    pub export_date: OffsetDateTime,
    pub app_version: String,
    pub garden_data: Vec<PlantRecord>,
}

pub fn export_garden(records: &[PlantRecord], now: OffsetDateTime) -> ExportDocument {
    ExportDocument {
        export_date: now,
        app_version: APP_VERSION.to_owned(),
        garden_data: records.to_vec(),
    }
}

pub fn export_garden_json(records: &[PlantRecord], now: OffsetDateTime) -> Result<String> {
    serde_json::to_string_pretty(&export_garden(records, now)).context("encode garden export")
}
