// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::PlantId;
use crate::schedule::{self, ValidationError};

/// One tracked plant. Field names follow the wire format shared with the
/// remote collection store, which is camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRecord {
    pub id: PlantId,
    pub common_name: String,
    pub scientific_name: String,
    pub info: String,
    pub image: String,
    #[serde(default)]
    pub image_sha256: String,
    pub water_interval_days: i64,
    pub sunlight_hours: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_watered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub next_water_at: OffsetDateTime,
}

/// Input for a record about to enter the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlant {
    pub common_name: String,
    pub scientific_name: String,
    pub info: String,
    pub image: String,
    pub image_sha256: String,
    pub water_interval_days: i64,
    pub sunlight_hours: f64,
}

impl PlantRecord {
    /// Build a record at `now`. A freshly added plant counts as just watered,
    /// so the first due date is one full interval out.
    pub fn create(new_plant: &NewPlant, now: OffsetDateTime) -> Result<Self, ValidationError> {
        if new_plant.sunlight_hours <= 0.0 || !new_plant.sunlight_hours.is_finite() {
            return Err(ValidationError::InvalidSunlight);
        }
        let next_water_at = schedule::compute_next_water(now, new_plant.water_interval_days)?;

        Ok(Self {
            id: PlantId::generate(),
            common_name: new_plant.common_name.clone(),
            scientific_name: new_plant.scientific_name.clone(),
            info: new_plant.info.clone(),
            image: new_plant.image.clone(),
            image_sha256: new_plant.image_sha256.clone(),
            water_interval_days: new_plant.water_interval_days,
            sunlight_hours: new_plant.sunlight_hours,
            added_at: now,
            last_watered_at: now,
            next_water_at,
        })
    }

    /// The water-now action: the only way `last_watered_at` moves.
    pub fn record_watering(&mut self, now: OffsetDateTime) -> Result<(), ValidationError> {
        self.next_water_at = schedule::compute_next_water(now, self.water_interval_days)?;
        self.last_watered_at = now;
        Ok(())
    }

    /// User edit of the base interval; the due date follows immediately.
    pub fn set_water_interval(&mut self, interval_days: i64) -> Result<(), ValidationError> {
        self.next_water_at = schedule::compute_next_water(self.last_watered_at, interval_days)?;
        self.water_interval_days = interval_days;
        Ok(())
    }
}

/// Scalar timestamps driving the merge direction during sync. Absent on a
/// fresh install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    pub last_local_update_at: Option<OffsetDateTime>,
    pub last_synced_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingKey {
    SyncLastLocalUpdate,
    SyncLastSynced,
    VisionApiKey,
    WeatherAdjust,
}

impl SettingKey {
    pub const ALL: [Self; 4] = [
        Self::SyncLastLocalUpdate,
        Self::SyncLastSynced,
        Self::VisionApiKey,
        Self::WeatherAdjust,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncLastLocalUpdate => "sync.last_local_update",
            Self::SyncLastSynced => "sync.last_synced",
            Self::VisionApiKey => "vision.api_key",
            Self::WeatherAdjust => "care.weather_adjust",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sync.last_local_update" => Some(Self::SyncLastLocalUpdate),
            "sync.last_synced" => Some(Self::SyncLastSynced),
            "vision.api_key" => Some(Self::VisionApiKey),
            "care.weather_adjust" => Some(Self::WeatherAdjust),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SyncLastLocalUpdate => "last local change",
            Self::SyncLastSynced => "last sync",
            Self::VisionApiKey => "vision api key",
            Self::WeatherAdjust => "weather adjustment",
        }
    }

    pub const fn expected_value_kind(self) -> SettingValueKind {
        match self {
            Self::SyncLastLocalUpdate | Self::SyncLastSynced | Self::VisionApiKey => {
                SettingValueKind::Text
            }
            Self::WeatherAdjust => SettingValueKind::Bool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValueKind {
    Bool,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl SettingValue {
    pub fn parse_for_key(key: SettingKey, raw: &str) -> Option<Self> {
        match key.expected_value_kind() {
            SettingValueKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Some(Self::Bool(true)),
                "0" | "false" | "off" | "no" => Some(Self::Bool(false)),
                _ => None,
            },
            SettingValueKind::Text => Some(Self::Text(raw.to_owned())),
        }
    }

    pub fn to_storage(&self, key: SettingKey) -> Option<String> {
        match (key.expected_value_kind(), self) {
            (SettingValueKind::Bool, Self::Bool(value)) => {
                Some(if *value { "true" } else { "false" }.to_owned())
            }
            (SettingValueKind::Text, Self::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Bool(true) => "on".to_owned(),
            Self::Bool(false) => "off".to_owned(),
            Self::Text(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: SettingKey,
    pub value: SettingValue,
}

#[cfg(test)]
mod tests {
    use super::{NewPlant, PlantRecord, SettingKey, SettingValue};
    use time::macros::datetime;

    fn fern_input() -> NewPlant {
        NewPlant {
            common_name: "Boston Fern".to_owned(),
            scientific_name: "Nephrolepis exaltata".to_owned(),
            info: "Likes humidity".to_owned(),
            image: "data:image/jpeg;base64,Zm9v".to_owned(),
            image_sha256: String::new(),
            water_interval_days: 7,
            sunlight_hours: 4.0,
        }
    }

    #[test]
    fn create_sets_first_due_date_one_interval_out() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let record = PlantRecord::create(&fern_input(), now).expect("create record");
        assert_eq!(record.added_at, now);
        assert_eq!(record.last_watered_at, now);
        assert_eq!(record.next_water_at, datetime!(2026-03-08 12:00 UTC));
    }

    #[test]
    fn create_rejects_non_positive_interval() {
        let mut input = fern_input();
        input.water_interval_days = 0;
        let now = datetime!(2026-03-01 12:00 UTC);
        assert!(PlantRecord::create(&input, now).is_err());
    }

    #[test]
    fn watering_resets_the_schedule_from_now() {
        let added = datetime!(2026-03-01 12:00 UTC);
        let mut record = PlantRecord::create(&fern_input(), added).expect("create record");

        let watered = datetime!(2026-03-09 12:00 UTC);
        record.record_watering(watered).expect("water");
        assert_eq!(record.last_watered_at, watered);
        assert_eq!(record.next_water_at, datetime!(2026-03-16 12:00 UTC));
    }

    #[test]
    fn interval_edit_recomputes_due_date_without_touching_last_watered() {
        let added = datetime!(2026-03-01 12:00 UTC);
        let mut record = PlantRecord::create(&fern_input(), added).expect("create record");

        record.set_water_interval(3).expect("set interval");
        assert_eq!(record.water_interval_days, 3);
        assert_eq!(record.last_watered_at, added);
        assert_eq!(record.next_water_at, datetime!(2026-03-04 12:00 UTC));
    }

    #[test]
    fn record_round_trips_through_camel_case_json() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let record = PlantRecord::create(&fern_input(), now).expect("create record");

        let encoded = serde_json::to_string(&record).expect("serialize record");
        assert!(encoded.contains("\"commonName\""));
        assert!(encoded.contains("\"waterIntervalDays\""));
        assert!(encoded.contains("\"nextWaterAt\""));

        let decoded: PlantRecord = serde_json::from_str(&encoded).expect("deserialize record");
        assert_eq!(decoded, record);
    }

    #[test]
    fn bool_setting_parse_and_storage_round_trip() {
        let parsed = SettingValue::parse_for_key(SettingKey::WeatherAdjust, "on")
            .expect("parse bool setting");
        assert_eq!(parsed, SettingValue::Bool(true));
        assert_eq!(
            parsed.to_storage(SettingKey::WeatherAdjust),
            Some("true".to_owned())
        );
    }

    #[test]
    fn mismatched_setting_value_type_rejected() {
        let text = SettingValue::Text("maybe".to_owned());
        assert!(text.to_storage(SettingKey::WeatherAdjust).is_none());
    }
}
