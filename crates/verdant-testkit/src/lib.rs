// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::path::PathBuf;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use verdant_app::{NewPlant, PlantRecord};

/// (common name, scientific name, base watering interval in days, hours of
/// light per day)
const SPECIES: [(&str, &str, i64, f64); 16] = [
    ("Boston Fern", "Nephrolepis exaltata", 4, 3.0),
    ("Peace Lily", "Spathiphyllum wallisii", 6, 4.0),
    ("Pothos", "Epipremnum aureum", 8, 5.0),
    ("Snake Plant", "Dracaena trifasciata", 14, 5.0),
    ("Spider Plant", "Chlorophytum comosum", 7, 5.0),
    ("Monstera", "Monstera deliciosa", 9, 6.0),
    ("Rubber Plant", "Ficus elastica", 10, 6.0),
    ("Aloe Vera", "Aloe barbadensis", 18, 7.0),
    ("Jade Plant", "Crassula ovata", 21, 6.0),
    ("English Ivy", "Hedera helix", 7, 4.0),
    ("Basil", "Ocimum basilicum", 3, 7.0),
    ("Rosemary", "Salvia rosmarinus", 10, 8.0),
    ("Fiddle Leaf Fig", "Ficus lyrata", 8, 6.0),
    ("ZZ Plant", "Zamioculcas zamiifolia", 16, 4.0),
    ("Calathea", "Goeppertia orbifolia", 5, 4.0),
    ("String of Pearls", "Curio rowleyanus", 14, 6.0),
];

const INFO_SNIPPETS: [&str; 8] = [
    "Prefers indirect light and steady humidity.",
    "Let the top inch of soil dry between waterings.",
    "Sensitive to overwatering; err on the dry side.",
    "Thrives near an east-facing window.",
    "Mist occasionally during heating season.",
    "Rotate weekly for even growth.",
    "Toxic to pets if ingested.",
    "Feed monthly during the growing season.",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Deterministic plant fixtures: the same seed always yields the same
/// garden, so assertions stay stable across runs.
#[derive(Debug, Clone)]
pub struct GardenFaker {
    rng: DeterministicRng,
}

impl GardenFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn plant(&mut self) -> PlantRecord {
        let (common, scientific, interval, sunlight) = SPECIES[self.rng.int_n(SPECIES.len())];
        let info = INFO_SNIPPETS[self.rng.int_n(INFO_SNIPPETS.len())];
        let added_at = self.datetime_between(
            reference_now() - Duration::days(365),
            reference_now() - Duration::days(1),
        );

        let mut record = PlantRecord::create(
            &NewPlant {
                common_name: common.to_owned(),
                scientific_name: scientific.to_owned(),
                info: info.to_owned(),
                image: format!(
                    "data:image/jpeg;base64,{}",
                    common.to_ascii_lowercase().replace(' ', "")
                ),
                image_sha256: String::new(),
                water_interval_days: interval,
                sunlight_hours: sunlight,
            },
            added_at,
        )
        .expect("species table holds valid intervals");

        // Most plants have been watered since they were added.
        if self.rng.int_n(10) < 8 {
            let watered_at =
                self.datetime_between(added_at, reference_now().min(added_at + Duration::days(60)));
            record
                .record_watering(watered_at)
                .expect("species table holds valid intervals");
        }
        record
    }

    fn datetime_between(&mut self, start: OffsetDateTime, end: OffsetDateTime) -> OffsetDateTime {
        if end <= start {
            return start;
        }
        let span_seconds = (end - start).whole_seconds().max(1) as u64;
        start + Duration::seconds((self.rng.next_u64() % span_seconds) as i64)
    }
}

/// Fixed "now" for fixtures; tests that care about the clock pass their own.
pub fn reference_now() -> OffsetDateTime {
    datetime!(2026-03-01 12:00 UTC)
}

/// Temp directory plus database and fallback paths inside it.
pub fn temp_store_paths() -> Result<(tempfile::TempDir, PathBuf, PathBuf)> {
    let temp = tempfile::tempdir()?;
    let db_path = temp.path().join("verdant.db");
    let fallback_path = temp.path().join("verdant.fallback.json");
    Ok((temp, db_path, fallback_path))
}
