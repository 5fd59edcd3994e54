// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::model::PlantRecord;

pub const MS_PER_DAY: i64 = 86_400_000;

/// Environmental multipliers below this distance from 1.0 are ignored so
/// noisy weather inputs do not jitter the schedule.
pub const ADJUSTMENT_DEAD_BAND: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    InvalidTimestamp,
    InvalidInterval,
    InvalidFactor,
    InvalidSunlight,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimestamp => f.write_str("invalid timestamp value"),
            Self::InvalidInterval => f.write_str("invalid watering interval"),
            Self::InvalidFactor => f.write_str("invalid adjustment factor"),
            Self::InvalidSunlight => f.write_str("invalid sunlight hours"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ScheduleResult<T> = std::result::Result<T, ValidationError>;

/// Classification of one record against `now`, truncated to whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CareStatus {
    Overdue(i64),
    DueToday,
    DueIn(i64),
}

impl CareStatus {
    pub fn display(self) -> String {
        match self {
            Self::Overdue(days) => format!("overdue by {days}d"),
            Self::DueToday => "due today".to_owned(),
            Self::DueIn(days) => format!("due in {days}d"),
        }
    }
}

/// Independent weather multipliers, each centered at 1.0. Values above 1.0
/// mean the plant dries out faster and waterings move closer together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentalFactors {
    pub temperature: f64,
    pub humidity: f64,
    pub precipitation: f64,
}

impl Default for EnvironmentalFactors {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            humidity: 1.0,
            precipitation: 1.0,
        }
    }
}

impl EnvironmentalFactors {
    pub fn composite(&self) -> f64 {
        self.temperature * self.humidity * self.precipitation
    }
}

pub fn parse_timestamp(raw: &str) -> ScheduleResult<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|_| ValidationError::InvalidTimestamp)
}

/// `last_watered_at + interval_days * 86_400_000 ms`. Pure.
pub fn compute_next_water(
    last_watered_at: OffsetDateTime,
    interval_days: i64,
) -> ScheduleResult<OffsetDateTime> {
    if interval_days <= 0 {
        return Err(ValidationError::InvalidInterval);
    }
    Ok(last_watered_at + Duration::milliseconds(interval_days * MS_PER_DAY))
}

/// Whole-day distance between `now` and the due date. Anything under one
/// whole day away, on either side, reads as due today.
pub fn care_status(next_water_at: OffsetDateTime, now: OffsetDateTime) -> CareStatus {
    let until = next_water_at - now;
    if until.is_negative() {
        let days_late = (-until).whole_days();
        if days_late == 0 {
            CareStatus::DueToday
        } else {
            CareStatus::Overdue(days_late)
        }
    } else {
        let days = until.whole_days();
        if days == 0 {
            CareStatus::DueToday
        } else {
            CareStatus::DueIn(days)
        }
    }
}

/// Elapsed fraction of the current watering interval, clamped to [0, 1]
/// so clock skew and long-overdue records still render sanely.
pub fn water_progress_fraction(
    last_watered_at: OffsetDateTime,
    interval_days: i64,
    now: OffsetDateTime,
) -> ScheduleResult<f64> {
    if interval_days <= 0 {
        return Err(ValidationError::InvalidInterval);
    }
    let elapsed_ms = (now - last_watered_at).whole_milliseconds() as f64;
    let interval_ms = (interval_days * MS_PER_DAY) as f64;
    Ok((elapsed_ms / interval_ms).clamp(0.0, 1.0))
}

/// Shift `next_water_at` by the composite factor, always measured from the
/// last actual watering so repeated refreshes never compound. The base
/// interval is untouched. Factors inside the dead-band leave the record
/// exactly as it was.
pub fn apply_environmental_adjustment(
    record: &PlantRecord,
    factor: f64,
) -> ScheduleResult<PlantRecord> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ValidationError::InvalidFactor);
    }
    if record.water_interval_days <= 0 {
        return Err(ValidationError::InvalidInterval);
    }

    let mut adjusted = record.clone();
    if (factor - 1.0).abs() <= ADJUSTMENT_DEAD_BAND {
        return Ok(adjusted);
    }

    let base_ms = (record.water_interval_days * MS_PER_DAY) as f64;
    let shifted_ms = (base_ms / factor).round() as i64;
    adjusted.next_water_at = record.last_watered_at + Duration::milliseconds(shifted_ms);
    Ok(adjusted)
}

/// Records due within `horizon_days` (overdue included), most urgent first.
/// Ties keep the input order.
pub fn due_for_care<'a>(
    collection: &'a [PlantRecord],
    now: OffsetDateTime,
    horizon_days: i64,
) -> Vec<&'a PlantRecord> {
    let mut due: Vec<(i64, &PlantRecord)> = collection
        .iter()
        .filter_map(|record| {
            let days_until = match care_status(record.next_water_at, now) {
                CareStatus::Overdue(days) => -days,
                CareStatus::DueToday => 0,
                CareStatus::DueIn(days) => days,
            };
            (days_until <= horizon_days).then_some((days_until, record))
        })
        .collect();

    due.sort_by_key(|(days_until, _)| *days_until);
    due.into_iter().map(|(_, record)| record).collect()
}

#[cfg(test)]
mod tests {
    use super::{
        ADJUSTMENT_DEAD_BAND, CareStatus, EnvironmentalFactors, ValidationError,
        apply_environmental_adjustment, care_status, compute_next_water, due_for_care,
        parse_timestamp, water_progress_fraction,
    };
    use crate::ids::PlantId;
    use crate::model::PlantRecord;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    fn record_at(name: &str, last_watered_at: OffsetDateTime, interval_days: i64) -> PlantRecord {
        PlantRecord {
            id: PlantId::generate(),
            common_name: name.to_owned(),
            scientific_name: String::new(),
            info: String::new(),
            image: String::new(),
            image_sha256: String::new(),
            water_interval_days: interval_days,
            sunlight_hours: 6.0,
            added_at: last_watered_at,
            last_watered_at,
            next_water_at: compute_next_water(last_watered_at, interval_days)
                .expect("valid interval"),
        }
    }

    #[test]
    fn next_water_never_precedes_last_watering() {
        let last = datetime!(2026-01-05 08:00 UTC);
        for interval in [1, 7, 30, 365] {
            let next = compute_next_water(last, interval).expect("valid interval");
            assert!(next >= last);
            assert_eq!(next - last, Duration::days(interval));
        }
    }

    #[test]
    fn non_positive_intervals_are_rejected() {
        let last = datetime!(2026-01-05 08:00 UTC);
        assert_eq!(
            compute_next_water(last, 0),
            Err(ValidationError::InvalidInterval)
        );
        assert_eq!(
            compute_next_water(last, -3),
            Err(ValidationError::InvalidInterval)
        );
    }

    #[test]
    fn parse_timestamp_rejects_garbage_instead_of_coercing() {
        assert!(parse_timestamp("2026-01-05T08:00:00Z").is_ok());
        assert_eq!(
            parse_timestamp("not-a-date"),
            Err(ValidationError::InvalidTimestamp)
        );
        assert_eq!(
            parse_timestamp("2026-13-99T99:00:00Z"),
            Err(ValidationError::InvalidTimestamp)
        );
    }

    #[test]
    fn due_in_exactly_zero_days_is_due_today() {
        let now = datetime!(2026-02-10 09:00 UTC);
        assert_eq!(care_status(now, now), CareStatus::DueToday);
        assert_eq!(
            care_status(now + Duration::hours(20), now),
            CareStatus::DueToday
        );
    }

    #[test]
    fn two_days_past_due_is_overdue_two() {
        let now = datetime!(2026-02-10 09:00 UTC);
        assert_eq!(
            care_status(now - Duration::days(2), now),
            CareStatus::Overdue(2)
        );
    }

    #[test]
    fn future_due_dates_count_whole_days() {
        let now = datetime!(2026-02-10 09:00 UTC);
        assert_eq!(
            care_status(now + Duration::days(6), now),
            CareStatus::DueIn(6)
        );
    }

    #[test]
    fn progress_fraction_is_clamped_both_ways() {
        let last = datetime!(2026-02-01 00:00 UTC);

        // Clock skew: now before the last watering.
        let skewed = water_progress_fraction(last, 7, last - Duration::days(3)).expect("fraction");
        assert_eq!(skewed, 0.0);

        // Interval exceeded many times over.
        let overdue =
            water_progress_fraction(last, 7, last + Duration::days(90)).expect("fraction");
        assert_eq!(overdue, 1.0);

        let halfway =
            water_progress_fraction(last, 8, last + Duration::days(4)).expect("fraction");
        assert!((halfway - 0.5).abs() < 1e-9);
    }

    #[test]
    fn adjustment_is_a_no_op_inside_the_dead_band() {
        let record = record_at("Pothos", datetime!(2026-02-01 00:00 UTC), 10);
        for factor in [0.86, 0.95, 1.0, 1.1, 1.0 + ADJUSTMENT_DEAD_BAND] {
            let adjusted = apply_environmental_adjustment(&record, factor).expect("adjust");
            assert_eq!(adjusted, record, "factor {factor} should not move the date");
        }
    }

    #[test]
    fn strong_factors_shift_the_due_date_in_the_right_direction() {
        let record = record_at("Pothos", datetime!(2026-02-01 00:00 UTC), 10);

        let hotter = apply_environmental_adjustment(&record, 1.25).expect("adjust");
        assert!(hotter.next_water_at < record.next_water_at);
        assert!(hotter.next_water_at >= hotter.last_watered_at);
        assert_eq!(hotter.water_interval_days, record.water_interval_days);

        let rainy = apply_environmental_adjustment(&record, 0.8).expect("adjust");
        assert!(rainy.next_water_at > record.next_water_at);
        assert_eq!(rainy.water_interval_days, record.water_interval_days);
    }

    #[test]
    fn repeated_adjustment_with_the_same_factor_does_not_compound() {
        let record = record_at("Monstera", datetime!(2026-02-01 00:00 UTC), 14);
        let once = apply_environmental_adjustment(&record, 1.3).expect("adjust");
        let twice = apply_environmental_adjustment(&once, 1.3).expect("adjust");
        assert_eq!(once.next_water_at, twice.next_water_at);
    }

    #[test]
    fn bad_factors_are_rejected() {
        let record = record_at("Monstera", datetime!(2026-02-01 00:00 UTC), 14);
        assert!(apply_environmental_adjustment(&record, 0.0).is_err());
        assert!(apply_environmental_adjustment(&record, -1.2).is_err());
        assert!(apply_environmental_adjustment(&record, f64::NAN).is_err());
    }

    #[test]
    fn composite_factor_is_the_product_of_the_multipliers() {
        let factors = EnvironmentalFactors {
            temperature: 1.2,
            humidity: 0.9,
            precipitation: 1.1,
        };
        assert!((factors.composite() - 1.188).abs() < 1e-9);
        assert_eq!(EnvironmentalFactors::default().composite(), 1.0);
    }

    #[test]
    fn due_list_is_sorted_most_overdue_first_with_stable_ties() {
        let now = datetime!(2026-02-10 00:00 UTC);
        let overdue = record_at("Fern", now - Duration::days(9), 7); // 2 days late
        let today_a = record_at("Basil", now - Duration::days(7), 7);
        let today_b = record_at("Mint", now - Duration::days(7), 7);
        let soon = record_at("Aloe", now - Duration::days(5), 7); // due in 2
        let later = record_at("Cactus", now - Duration::days(1), 30); // due in 29

        let collection = vec![
            today_a.clone(),
            soon.clone(),
            overdue.clone(),
            today_b.clone(),
            later,
        ];
        let due = due_for_care(&collection, now, 3);

        let names: Vec<&str> = due.iter().map(|r| r.common_name.as_str()).collect();
        assert_eq!(names, vec!["Fern", "Basil", "Mint", "Aloe"]);
    }
}
