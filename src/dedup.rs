use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{HealthSample, WearableSource};

/// Keeps only device readings for this client and metric. Sources are
/// compared after normalisation, so `Manual` or ` manual ` rows written by
/// other integrations never count as verified progress.
pub fn retain_wearable(samples: &mut Vec<HealthSample>, client_id: Uuid, data_type: &str) {
    samples.retain(|sample| {
        sample.client_id == client_id
            && sample.data_type == data_type
            && sample.source != WearableSource::Manual
    });
}

/// Picks one value per calendar day: the sample from the highest-priority
/// source wins outright, the other same-day samples are dropped.
pub fn daily_values(samples: &[HealthSample]) -> Vec<(NaiveDate, f64)> {
    let mut days: HashMap<NaiveDate, &HealthSample> = HashMap::new();

    for sample in samples {
        days.entry(sample.recorded_at)
            .and_modify(|best| {
                if outranks(sample, *best) {
                    *best = sample;
                }
            })
            .or_insert(sample);
    }

    let mut values: Vec<(NaiveDate, f64)> = days
        .into_iter()
        .map(|(day, sample)| (day, sample.value))
        .collect();
    values.sort_by_key(|(day, _)| *day);
    values
}

pub fn total_progress(samples: &[HealthSample]) -> f64 {
    daily_values(samples).iter().map(|(_, value)| value).sum()
}

// Two samples from the same source on one day resolve to the larger
// reading so the outcome never depends on row order.
fn outranks(candidate: &HealthSample, current: &HealthSample) -> bool {
    let (candidate_rank, current_rank) = (candidate.source.rank(), current.source.rank());
    candidate_rank < current_rank
        || (candidate_rank == current_rank && candidate.value > current.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + chrono::Duration::days(offset as i64)
    }

    fn sample(offset: u32, source: &str, value: f64) -> HealthSample {
        HealthSample {
            client_id: Uuid::nil(),
            data_type: "steps".to_string(),
            value,
            source: WearableSource::parse(source),
            recorded_at: day(offset),
        }
    }

    #[test]
    fn single_sample_days_count_as_is() {
        let samples = vec![
            sample(0, "garmin", 4200.0),
            sample(1, "fitbit", 8100.0),
            sample(2, "apple_health", 600.5),
        ];
        assert_eq!(total_progress(&samples), 12900.5);
    }

    #[test]
    fn higher_priority_source_wins_regardless_of_order() {
        let forward = vec![sample(0, "apple_health", 9000.0), sample(0, "fitbit", 12000.0)];
        let reversed = vec![sample(0, "fitbit", 12000.0), sample(0, "apple_health", 9000.0)];

        assert_eq!(total_progress(&forward), 9000.0);
        assert_eq!(total_progress(&reversed), 9000.0);
    }

    #[test]
    fn recognised_source_beats_unknown_source() {
        let samples = vec![sample(0, "polar", 20000.0), sample(0, "garmin", 3000.0)];
        assert_eq!(total_progress(&samples), 3000.0);
        assert_eq!(WearableSource::parse("polar").rank(), WearableSource::PRIORITY.len());
    }

    #[test]
    fn duplicate_lower_priority_samples_are_discarded() {
        let mut samples = Vec::new();
        for offset in 0..7 {
            samples.push(sample(offset, "health_connect", 5000.0));
            samples.push(sample(offset, "apple_health", 10000.0));
        }
        assert_eq!(total_progress(&samples), 70000.0);
        assert_eq!(daily_values(&samples).len(), 7);
    }

    #[test]
    fn same_source_twice_keeps_larger_reading() {
        let samples = vec![sample(0, "fitbit", 3000.0), sample(0, "fitbit", 7500.0)];
        assert_eq!(total_progress(&samples), 7500.0);
    }

    #[test]
    fn priority_table_follows_declared_order() {
        let ranks: Vec<usize> = ["apple_health", "health_connect", "fitbit", "garmin", "manual"]
            .iter()
            .map(|name| WearableSource::parse(name).rank())
            .collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn manual_rows_in_any_spelling_are_not_counted() {
        let mut samples = vec![
            sample(0, "polar", 4000.0),
            sample(0, "Manual", 50000.0),
            sample(1, " MANUAL ", 9000.0),
        ];
        assert_eq!(samples[1].source, WearableSource::Manual);

        retain_wearable(&mut samples, Uuid::nil(), "steps");

        assert_eq!(samples.len(), 1);
        assert_eq!(total_progress(&samples), 4000.0);
    }

    #[test]
    fn foreign_client_and_metric_rows_are_dropped() {
        let mut other_metric = sample(0, "garmin", 45.0);
        other_metric.data_type = "active_minutes".to_string();
        let mut other_client = sample(1, "garmin", 8000.0);
        other_client.client_id = Uuid::max();
        let mut samples = vec![sample(0, "fitbit", 6000.0), other_metric, other_client];

        retain_wearable(&mut samples, Uuid::nil(), "steps");

        assert_eq!(total_progress(&samples), 6000.0);
    }

    #[test]
    fn empty_input_totals_zero() {
        assert_eq!(total_progress(&[]), 0.0);
        assert!(daily_values(&[]).is_empty());
    }
}
