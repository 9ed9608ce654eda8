use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a health sample came from. Declaration order is priority order,
/// highest first; unrecognised sources rank below everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WearableSource {
    AppleHealth,
    HealthConnect,
    Fitbit,
    Garmin,
    Manual,
    Other(String),
}

impl WearableSource {
    pub const PRIORITY: [WearableSource; 5] = [
        WearableSource::AppleHealth,
        WearableSource::HealthConnect,
        WearableSource::Fitbit,
        WearableSource::Garmin,
        WearableSource::Manual,
    ];

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "apple_health" => WearableSource::AppleHealth,
            "health_connect" => WearableSource::HealthConnect,
            "fitbit" => WearableSource::Fitbit,
            "garmin" => WearableSource::Garmin,
            "manual" => WearableSource::Manual,
            _ => WearableSource::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WearableSource::AppleHealth => "apple_health",
            WearableSource::HealthConnect => "health_connect",
            WearableSource::Fitbit => "fitbit",
            WearableSource::Garmin => "garmin",
            WearableSource::Manual => "manual",
            WearableSource::Other(name) => name,
        }
    }

    /// Lower rank wins.
    pub fn rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|known| known == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl fmt::Display for WearableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Active,
    Completed,
    Abandoned,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Active => "active",
            ParticipantStatus::Completed => "completed",
            ParticipantStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ParticipantStatus::Active),
            "completed" => Some(ParticipantStatus::Completed),
            "abandoned" => Some(ParticipantStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthSample {
    pub client_id: Uuid,
    pub data_type: String,
    pub value: f64,
    pub source: WearableSource,
    pub recorded_at: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: Uuid,
    pub title: String,
    pub data_source: String,
    pub wearable_data_type: Option<String>,
    pub target_value: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub requires_verification: bool,
}

impl Challenge {
    /// The metric to reconcile, or `None` when the challenge is not fed by
    /// wearable data.
    pub fn wearable_metric(&self) -> Option<&str> {
        if self.data_source != "wearable" {
            return None;
        }
        self.wearable_data_type.as_deref()
    }
}

/// An active enrollment joined to the challenge it belongs to.
#[derive(Debug, Clone)]
pub struct ActiveParticipation {
    pub client_id: Uuid,
    pub current_progress: i64,
    pub verified_progress: Option<i64>,
    pub status: ParticipantStatus,
    pub challenge: Challenge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub challenge_id: Uuid,
    pub client_id: Uuid,
    pub previous_progress: i64,
    pub verified_progress: i64,
    pub current_progress: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressUpdate {
    pub fn completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResult {
    pub challenge_id: Uuid,
    pub previous_progress: i64,
    pub new_progress: i64,
    pub completed: bool,
}

impl From<&ProgressUpdate> for ChallengeResult {
    fn from(update: &ProgressUpdate) -> Self {
        ChallengeResult {
            challenge_id: update.challenge_id,
            previous_progress: update.previous_progress,
            new_progress: update.current_progress,
            completed: update.completed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub updated: usize,
    pub failed: usize,
    pub results: Vec<ChallengeResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub client_id: Uuid,
    pub current_progress: i64,
    pub verified_progress: Option<i64>,
    pub status: ParticipantStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_are_normalised() {
        assert_eq!(WearableSource::parse(" Apple_Health "), WearableSource::AppleHealth);
        assert_eq!(WearableSource::parse("MANUAL"), WearableSource::Manual);
        assert_eq!(WearableSource::parse("  polar "), WearableSource::Other("polar".to_string()));
        assert_eq!(WearableSource::parse(" polar ").as_str(), "polar");
    }

    #[test]
    fn status_round_trips_through_its_column_value() {
        for status in [
            ParticipantStatus::Active,
            ParticipantStatus::Completed,
            ParticipantStatus::Abandoned,
        ] {
            assert_eq!(ParticipantStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ParticipantStatus::parse("paused"), None);
    }
}
