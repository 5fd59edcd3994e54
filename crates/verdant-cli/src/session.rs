// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use time::OffsetDateTime;
use verdant_app::{
    EnvironmentalFactors, NewPlant, PlantId, PlantRecord, SettingKey, SettingValue, schedule,
};
use verdant_db::TieredStore;
use verdant_sync::{CollectionRemote, Reconciler, SyncError, SyncOutcome};
use verdant_vision::{Diagnosis, Identification};

/// One user's live session: the in-memory collection, its durable store,
/// and the optional external collaborators. All mutations flow through
/// here so `sync.last_local_update` is stamped with every persist. Callers
/// issue operations one at a time; nothing here queues overlapping work.
pub struct Session {
    store: TieredStore,
    collection: Vec<PlantRecord>,
    vision: Option<verdant_vision::Client>,
    remote: Option<Box<dyn CollectionRemote>>,
    user_id: Option<String>,
    reconciler: Reconciler,
}

impl Session {
    pub fn open(
        store: TieredStore,
        vision: Option<verdant_vision::Client>,
        remote: Option<Box<dyn CollectionRemote>>,
        user_id: Option<String>,
    ) -> Self {
        let collection = store.load_collection();
        Self {
            store,
            collection,
            vision,
            remote,
            user_id,
            reconciler: Reconciler::new(),
        }
    }

    pub fn collection(&self) -> &[PlantRecord] {
        &self.collection
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    pub fn add_to_garden(&mut self, new_plant: &NewPlant, now: OffsetDateTime) -> Result<PlantId> {
        let record = PlantRecord::create(new_plant, now)
            .with_context(|| format!("add {} to the garden", new_plant.common_name))?;
        let id = record.id.clone();
        self.collection.push(record);
        self.persist_mutation(now)?;
        Ok(id)
    }

    /// Identify the photo through the vision client and add the result.
    pub fn identify_and_add(
        &mut self,
        image: String,
        image_sha256: String,
        now: OffsetDateTime,
    ) -> Result<(Identification, PlantId)> {
        let Some(vision) = &self.vision else {
            bail!("vision is disabled; enable [vision] in the config to identify plants");
        };

        let identified = vision
            .identify(&image)
            .context("identify plant from photo")?;
        let id = self.add_to_garden(
            &NewPlant {
                common_name: identified.common_name.clone(),
                scientific_name: identified.scientific_name.clone(),
                info: identified.description.clone(),
                image,
                image_sha256,
                water_interval_days: identified.water_days,
                sunlight_hours: identified.sunlight_hours,
            },
            now,
        )?;
        Ok((identified, id))
    }

    pub fn diagnose(&self, image: &str) -> Result<Diagnosis> {
        let Some(vision) = &self.vision else {
            bail!("vision is disabled; enable [vision] in the config to diagnose plants");
        };
        vision.diagnose(image).context("diagnose plant from photo")
    }

    pub fn water_plant(&mut self, id: &str, now: OffsetDateTime) -> Result<&PlantRecord> {
        let index = self.find_plant(id)?;
        self.collection[index]
            .record_watering(now)
            .context("record watering")?;
        self.persist_mutation(now)?;
        Ok(&self.collection[index])
    }

    pub fn remove_plant(&mut self, id: &str, now: OffsetDateTime) -> Result<PlantRecord> {
        let index = self.find_plant(id)?;
        let removed = self.collection.remove(index);
        self.persist_mutation(now)?;
        Ok(removed)
    }

    /// Recompute every due date from the composite weather factor. Returns
    /// how many records actually moved; inside the dead-band that is zero
    /// and nothing is persisted.
    pub fn apply_weather_adjustment(
        &mut self,
        factors: EnvironmentalFactors,
        now: OffsetDateTime,
    ) -> Result<usize> {
        if let Some(SettingValue::Bool(false)) = self.store.get_setting(SettingKey::WeatherAdjust)?
        {
            bail!("weather adjustment is turned off; set `care.weather_adjust` to on first");
        }

        let factor = factors.composite();
        let mut moved = 0usize;
        let mut adjusted = Vec::with_capacity(self.collection.len());
        for record in &self.collection {
            let next = schedule::apply_environmental_adjustment(record, factor)
                .with_context(|| format!("adjust schedule for {}", record.common_name))?;
            if next.next_water_at != record.next_water_at {
                moved += 1;
            }
            adjusted.push(next);
        }

        if moved > 0 {
            self.collection = adjusted;
            self.persist_mutation(now)?;
        }
        Ok(moved)
    }

    pub fn due_soon(&self, now: OffsetDateTime, horizon_days: i64) -> Vec<&PlantRecord> {
        schedule::due_for_care(&self.collection, now, horizon_days)
    }

    pub fn sync(&mut self) -> std::result::Result<SyncOutcome, SyncError> {
        let Some(remote) = &self.remote else {
            return Err(SyncError::NotAuthenticated);
        };
        let Some(user_id) = &self.user_id else {
            return Err(SyncError::NotAuthenticated);
        };

        let outcome = self
            .reconciler
            .sync(&mut self.store, &**remote, user_id)?;
        if let SyncOutcome::Downloaded { .. } = outcome {
            self.collection = self.store.load_collection();
        }
        Ok(outcome)
    }

    pub fn export_json(&self, now: OffsetDateTime) -> Result<String> {
        verdant_app::export_garden_json(&self.collection, now)
    }

    /// Accepts a full id or an unambiguous prefix.
    fn find_plant(&self, id: &str) -> Result<usize> {
        let exact = self
            .collection
            .iter()
            .position(|record| record.id.as_str() == id);
        if let Some(index) = exact {
            return Ok(index);
        }

        let matches: Vec<usize> = self
            .collection
            .iter()
            .enumerate()
            .filter(|(_, record)| record.id.as_str().starts_with(id))
            .map(|(index, _)| index)
            .collect();
        match matches.as_slice() {
            [index] => Ok(*index),
            [] => bail!("no plant with id {id:?}; run `verdant list` to see ids"),
            _ => bail!("id prefix {id:?} is ambiguous; use more characters"),
        }
    }

    fn persist_mutation(&mut self, now: OffsetDateTime) -> Result<()> {
        self.store
            .put_last_local_update(now)
            .context("stamp local update time")?;
        self.store
            .save_collection(&self.collection)
            .context("persist collection")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use anyhow::Result;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};
    use verdant_app::{CareStatus, EnvironmentalFactors, NewPlant, schedule};
    use verdant_db::{BlobStore, TieredStore};

    fn blank_session(temp: &tempfile::TempDir) -> Session {
        let store = TieredStore::with_paths(
            &temp.path().join("verdant.db"),
            &temp.path().join("verdant.fallback.json"),
        );
        Session::open(store, None, None, None)
    }

    fn fern(interval_days: i64) -> NewPlant {
        NewPlant {
            common_name: "Boston Fern".to_owned(),
            scientific_name: "Nephrolepis exaltata".to_owned(),
            info: String::new(),
            image: String::new(),
            image_sha256: String::new(),
            water_interval_days: interval_days,
            sunlight_hours: 4.0,
        }
    }

    #[test]
    fn watering_timeline_end_to_end() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);

        let t0 = datetime!(2026-03-01 09:00 UTC);
        let id = session.add_to_garden(&fern(7), t0)?;

        let record = |session: &Session| session.collection()[0].clone();

        // Day 6: one day to go.
        assert_eq!(
            schedule::care_status(record(&session).next_water_at, t0 + Duration::days(6)),
            CareStatus::DueIn(1)
        );

        // Day 8: one day late.
        let t8 = t0 + Duration::days(8);
        assert_eq!(
            schedule::care_status(record(&session).next_water_at, t8),
            CareStatus::Overdue(1)
        );

        // Watering at day 8 resets the schedule from there.
        session.water_plant(id.as_str(), t8)?;
        let watered = record(&session);
        assert_eq!(watered.last_watered_at, t8);
        assert_eq!(watered.next_water_at, t0 + Duration::days(15));
        Ok(())
    }

    #[test]
    fn mutations_stamp_the_local_update_marker() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);

        let t0 = datetime!(2026-03-01 09:00 UTC);
        assert!(session.store().sync_state()?.last_local_update_at.is_none());

        let id = session.add_to_garden(&fern(7), t0)?;
        assert_eq!(
            session.store().sync_state()?.last_local_update_at,
            Some(t0)
        );

        let t1 = t0 + Duration::days(2);
        session.water_plant(id.as_str(), t1)?;
        assert_eq!(
            session.store().sync_state()?.last_local_update_at,
            Some(t1)
        );

        let t2 = t1 + Duration::days(1);
        session.remove_plant(id.as_str(), t2)?;
        assert_eq!(
            session.store().sync_state()?.last_local_update_at,
            Some(t2)
        );
        assert!(session.collection().is_empty());
        Ok(())
    }

    #[test]
    fn collection_survives_a_reopen() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let t0 = datetime!(2026-03-01 09:00 UTC);

        let id = {
            let mut session = blank_session(&temp);
            session.add_to_garden(&fern(7), t0)?
        };

        let session = blank_session(&temp);
        assert_eq!(session.collection().len(), 1);
        assert_eq!(session.collection()[0].id, id);
        Ok(())
    }

    #[test]
    fn weather_adjustment_moves_dates_outside_the_dead_band_only() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);

        let t0 = datetime!(2026-06-01 09:00 UTC);
        session.add_to_garden(&fern(10), t0)?;
        let baseline = session.collection()[0].next_water_at;

        // Mild weather: inside the dead-band, nothing moves.
        let moved = session.apply_weather_adjustment(
            EnvironmentalFactors {
                temperature: 1.05,
                humidity: 1.0,
                precipitation: 1.0,
            },
            t0,
        )?;
        assert_eq!(moved, 0);
        assert_eq!(session.collection()[0].next_water_at, baseline);

        // A heat wave pulls the date in.
        let moved = session.apply_weather_adjustment(
            EnvironmentalFactors {
                temperature: 1.4,
                humidity: 1.0,
                precipitation: 1.0,
            },
            t0,
        )?;
        assert_eq!(moved, 1);
        assert!(session.collection()[0].next_water_at < baseline);

        // Applying the same weather again does not compound.
        let after_first = session.collection()[0].next_water_at;
        session.apply_weather_adjustment(
            EnvironmentalFactors {
                temperature: 1.4,
                humidity: 1.0,
                precipitation: 1.0,
            },
            t0,
        )?;
        assert_eq!(session.collection()[0].next_water_at, after_first);
        Ok(())
    }

    #[test]
    fn weather_adjustment_respects_the_feature_toggle() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);
        let t0 = datetime!(2026-06-01 09:00 UTC);
        session.add_to_garden(&fern(10), t0)?;

        session
            .store
            .put_setting_raw("care.weather_adjust", "false")?;
        let error = session
            .apply_weather_adjustment(
                EnvironmentalFactors {
                    temperature: 1.4,
                    humidity: 1.0,
                    precipitation: 1.0,
                },
                t0,
            )
            .expect_err("disabled toggle should refuse");
        assert!(error.to_string().contains("care.weather_adjust"));
        Ok(())
    }

    #[test]
    fn sync_without_an_account_is_a_typed_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = blank_session(&temp);
        let error = session.sync().expect_err("no account configured");
        assert!(matches!(error, verdant_sync::SyncError::NotAuthenticated));
    }

    #[test]
    fn ambiguous_and_unknown_ids_are_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);
        let t0 = datetime!(2026-03-01 09:00 UTC);
        session.add_to_garden(&fern(7), t0)?;

        let error = session
            .water_plant("missing-id", t0)
            .expect_err("unknown id should fail");
        assert!(error.to_string().contains("no plant with id"));

        // Every v4 UUID shares this empty prefix with every other, so two
        // plants make the empty string ambiguous.
        session.add_to_garden(&fern(7), t0)?;
        let error = session
            .water_plant("", t0)
            .expect_err("empty prefix is ambiguous");
        assert!(error.to_string().contains("ambiguous"));
        Ok(())
    }

    #[test]
    fn export_contains_every_record() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);
        let t0 = datetime!(2026-03-01 09:00 UTC);
        session.add_to_garden(&fern(7), t0)?;

        let exported = session.export_json(t0 + Duration::days(1))?;
        assert!(exported.contains("\"gardenData\""));
        assert!(exported.contains("Boston Fern"));
        Ok(())
    }

    #[test]
    fn degraded_store_still_supports_the_whole_flow() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store =
            TieredStore::degraded(BlobStore::new(temp.path().join("verdant.fallback.json")));
        let mut session = Session::open(store, None, None, None);

        let t0 = datetime!(2026-03-01 09:00 UTC);
        let id = session.add_to_garden(&fern(7), t0)?;
        session.water_plant(id.as_str(), t0 + Duration::days(7))?;
        assert_eq!(session.collection().len(), 1);

        // Reopen from the fallback blob alone.
        let store =
            TieredStore::degraded(BlobStore::new(temp.path().join("verdant.fallback.json")));
        let reopened = Session::open(store, None, None, None);
        assert_eq!(reopened.collection().len(), 1);
        Ok(())
    }

    #[test]
    fn due_soon_orders_by_urgency() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = blank_session(&temp);

        let t0 = datetime!(2026-03-01 09:00 UTC);
        session.add_to_garden(&fern(3), t0)?; // due +3d
        session.add_to_garden(
            &NewPlant {
                common_name: "Cactus".to_owned(),
                water_interval_days: 30,
                ..fern(30)
            },
            t0,
        )?; // due +30d

        let now: OffsetDateTime = t0 + Duration::days(5);
        let due = session.due_soon(now, 3);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].common_name, "Boston Fern");
        Ok(())
    }
}
