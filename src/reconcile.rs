use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dedup;
use crate::models::{
    ActiveParticipation, ChallengeResult, HealthSample, ParticipantStatus, ProgressUpdate,
    ReconcileResponse,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    Decode(String),
}

/// Per-challenge failure. The run logs it and moves on to the next
/// participation.
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("failed to fetch samples for challenge {challenge_id}: {source}")]
    FetchSamples {
        challenge_id: Uuid,
        #[source]
        source: StoreError,
    },
    #[error("failed to update progress for challenge {challenge_id}: {source}")]
    Update {
        challenge_id: Uuid,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("clientId is required")]
    MissingClientId,
    #[error("clientId {0:?} is not a valid UUID")]
    InvalidClientId(String),
    #[error("malformed request body: {0}")]
    MalformedRequest(String),
    #[error("failed to load challenge participations: {0}")]
    LoadParticipations(#[source] StoreError),
}

impl ReconcileError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReconcileError::MissingClientId
                | ReconcileError::InvalidClientId(_)
                | ReconcileError::MalformedRequest(_)
        )
    }
}

/// Read and write access the reconciler needs. Implemented for Postgres in
/// `db.rs`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn active_participations(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<ActiveParticipation>, StoreError>;

    /// Samples for one metric inside `[start, end]`, manual entries excluded.
    async fn wearable_samples(
        &self,
        client_id: Uuid,
        data_type: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HealthSample>, StoreError>;

    /// Writes the new progress if the participation is still active.
    /// Returns `false` when no active row matched.
    async fn apply_update(&self, update: &ProgressUpdate) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(default, alias = "client_id")]
    pub client_id: Option<String>,
}

impl ReconcileRequest {
    pub fn client_id(&self) -> Result<Uuid, ReconcileError> {
        let raw = self
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ReconcileError::MissingClientId)?;
        Uuid::parse_str(raw).map_err(|_| ReconcileError::InvalidClientId(raw.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct ReconcileRun {
    pub updates: Vec<ProgressUpdate>,
    pub skipped: usize,
    pub failures: Vec<ChallengeError>,
}

impl ReconcileRun {
    fn from_outcomes(outcomes: Vec<Result<Option<ProgressUpdate>, ChallengeError>>) -> Self {
        let mut run = ReconcileRun::default();
        for outcome in outcomes {
            match outcome {
                Ok(Some(update)) => run.updates.push(update),
                Ok(None) => run.skipped += 1,
                Err(err) => run.failures.push(err),
            }
        }
        run
    }

    pub fn response(&self) -> ReconcileResponse {
        ReconcileResponse {
            success: true,
            updated: self.updates.len(),
            failed: self.failures.len(),
            results: self.updates.iter().map(ChallengeResult::from).collect(),
        }
    }
}

/// Works out the new progress fields for one participation from the
/// samples inside its challenge window.
pub fn plan_update(
    participation: &ActiveParticipation,
    samples: &[HealthSample],
    now: DateTime<Utc>,
) -> ProgressUpdate {
    let challenge = &participation.challenge;
    let total = dedup::total_progress(samples);
    let verified = total.max(0.0).floor() as i64;
    let current = if challenge.requires_verification {
        verified
    } else {
        participation.current_progress.max(verified)
    };
    let completed = total >= challenge.target_value
        && participation.status == ParticipantStatus::Active;

    ProgressUpdate {
        challenge_id: challenge.id,
        client_id: participation.client_id,
        previous_progress: participation.current_progress,
        verified_progress: verified,
        current_progress: current,
        completed_at: completed.then_some(now),
    }
}

async fn reconcile_participation<S: ProgressStore + ?Sized>(
    store: &S,
    participation: &ActiveParticipation,
) -> Result<Option<ProgressUpdate>, ChallengeError> {
    let challenge = &participation.challenge;
    let Some(metric) = challenge.wearable_metric() else {
        debug!(
            challenge_id = %challenge.id,
            data_source = %challenge.data_source,
            "challenge is not wearable-based, skipping"
        );
        return Ok(None);
    };

    let mut samples = store
        .wearable_samples(
            participation.client_id,
            metric,
            challenge.start_date,
            challenge.end_date,
        )
        .await
        .map_err(|source| ChallengeError::FetchSamples {
            challenge_id: challenge.id,
            source,
        })?;
    dedup::retain_wearable(&mut samples, participation.client_id, metric);

    let update = plan_update(participation, &samples, Utc::now());
    let applied = store
        .apply_update(&update)
        .await
        .map_err(|source| ChallengeError::Update {
            challenge_id: challenge.id,
            source,
        })?;

    if !applied {
        info!(
            challenge_id = %challenge.id,
            "participation no longer active, leaving it as is"
        );
        return Ok(None);
    }

    debug!(
        challenge_id = %challenge.id,
        samples = samples.len(),
        previously_verified = ?participation.verified_progress,
        verified = update.verified_progress,
        completed = update.completed(),
        "challenge progress reconciled"
    );
    Ok(Some(update))
}

/// Recomputes verified progress for every active challenge of a client.
/// Participations are handled one after another; a failure on one is logged
/// and does not stop the rest.
pub async fn reconcile_client<S: ProgressStore + ?Sized>(
    store: &S,
    client_id: Uuid,
) -> Result<ReconcileRun, ReconcileError> {
    let participations = store
        .active_participations(client_id)
        .await
        .map_err(ReconcileError::LoadParticipations)?;

    info!(
        %client_id,
        participations = participations.len(),
        "reconciling challenge progress"
    );

    let mut outcomes = Vec::with_capacity(participations.len());
    for participation in &participations {
        let outcome = reconcile_participation(store, participation).await;
        if let Err(err) = &outcome {
            warn!(%client_id, error = %err, "skipping challenge");
        }
        outcomes.push(outcome);
    }

    let run = ReconcileRun::from_outcomes(outcomes);
    info!(
        %client_id,
        updated = run.updates.len(),
        skipped = run.skipped,
        failed = run.failures.len(),
        "reconciliation finished"
    );
    Ok(run)
}
