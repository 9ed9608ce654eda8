use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    ActiveParticipation, Challenge, HealthSample, LeaderboardEntry, ParticipantStatus,
    ProgressUpdate, WearableSource,
};
use crate::reconcile::{ProgressStore, StoreError};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub const SEED_CLIENT_ID: &str = "a41c9e07-6b2d-4f38-b1e5-92d0c7f4e613";

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let client_id = Uuid::parse_str(SEED_CLIENT_ID)?;
    let start = Utc::now().date_naive() - Duration::days(6);
    let end = start + Duration::days(6);

    let challenges = vec![
        (
            Uuid::parse_str("5e9b2d14-c7a3-4b61-8f0e-3d71a6c2b948")?,
            "70k step week",
            "wearable",
            Some("steps"),
            70000.0,
            true,
        ),
        (
            Uuid::parse_str("c38f7a50-1e94-4d2b-a6c7-0b5e8f21d736")?,
            "Active minutes sprint",
            "wearable",
            Some("active_minutes"),
            300.0,
            false,
        ),
        (
            Uuid::parse_str("8e4b6c1d-5f0a-4c2b-9d3e-7a1f2b3c4d5e")?,
            "Hydration journal",
            "manual",
            None,
            14.0,
            false,
        ),
    ];

    for (id, title, data_source, data_type, target, requires_verification) in challenges {
        sqlx::query(
            r#"
            INSERT INTO challenge_progress.challenges
            (id, title, data_source, wearable_data_type, target_value,
             start_date, end_date, requires_verification)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(data_source)
        .bind(data_type)
        .bind(target)
        .bind(start)
        .bind(end)
        .bind(requires_verification)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO challenge_progress.challenge_participants
            (challenge_id, client_id, current_progress)
            VALUES ($1, $2, $3)
            ON CONFLICT (challenge_id, client_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(client_id)
        .bind(if data_source == "wearable" { 0i64 } else { 9 })
        .execute(pool)
        .await?;
    }

    // The phone and the tracker both report steps every day; the tracker's
    // lower-priority counts must not be added on top.
    for offset in 0..7 {
        let day = start + Duration::days(offset);
        let samples = [
            ("steps", 10000.0 + offset as f64 * 250.0, "apple_health"),
            ("steps", 5200.0 + offset as f64 * 100.0, "garmin"),
            ("active_minutes", 38.0 + offset as f64, "fitbit"),
            ("steps", 2000.0, "manual"),
        ];

        for (data_type, value, source) in samples {
            insert_sample(
                pool,
                client_id,
                data_type,
                value,
                source,
                day,
                &format!("seed-{data_type}-{source}-{day}"),
            )
            .await?;
        }
    }

    Ok(())
}

async fn insert_sample(
    pool: &PgPool,
    client_id: Uuid,
    data_type: &str,
    value: f64,
    source: &str,
    recorded_at: NaiveDate,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO challenge_progress.health_samples
        (id, client_id, data_type, value, source, recorded_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(client_id)
    .bind(data_type)
    .bind(value)
    .bind(source)
    .bind(recorded_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        client_id: Uuid,
        data_type: String,
        value: f64,
        source: String,
        recorded_at: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid sample on row {}", line + 1))?;
        if row.value < 0.0 {
            anyhow::bail!("negative value on row {}", line + 1);
        }

        let source = WearableSource::parse(&row.source);
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_sample(
            pool,
            row.client_id,
            &row.data_type,
            row.value,
            source.as_str(),
            row.recorded_at,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_leaderboard(
    pool: &PgPool,
    challenge_id: Uuid,
    limit: i64,
) -> anyhow::Result<(Challenge, Vec<LeaderboardEntry>)> {
    let challenge_row = sqlx::query(
        r#"
        SELECT id, title, data_source, wearable_data_type, target_value,
               start_date, end_date, requires_verification
        FROM challenge_progress.challenges
        WHERE id = $1
        "#,
    )
    .bind(challenge_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("challenge {challenge_id} not found"))?;
    let challenge = challenge_from_row(&challenge_row, "id")?;

    let rows = sqlx::query(
        r#"
        SELECT client_id, current_progress, verified_progress, status, completed_at
        FROM challenge_progress.challenge_participants
        WHERE challenge_id = $1 AND status <> 'abandoned'
        ORDER BY current_progress DESC, completed_at ASC NULLS LAST, client_id
        LIMIT $2
        "#,
    )
    .bind(challenge_id)
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        entries.push(LeaderboardEntry {
            client_id: row.get("client_id"),
            current_progress: row.get("current_progress"),
            verified_progress: row.get("verified_progress"),
            status: ParticipantStatus::parse(&status)
                .with_context(|| format!("unknown participant status {status:?}"))?,
            completed_at: row.get("completed_at"),
        });
    }

    Ok((challenge, entries))
}

fn challenge_from_row(row: &PgRow, id_column: &str) -> Result<Challenge, sqlx::Error> {
    Ok(Challenge {
        id: row.try_get(id_column)?,
        title: row.try_get("title")?,
        data_source: row.try_get("data_source")?,
        wearable_data_type: row.try_get("wearable_data_type")?,
        target_value: row.try_get("target_value")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        requires_verification: row.try_get("requires_verification")?,
    })
}

/// `ProgressStore` backed by the Postgres schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn active_participations(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<ActiveParticipation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT cp.client_id, cp.current_progress, cp.verified_progress, cp.status,
                   c.id AS challenge_id, c.title, c.data_source, c.wearable_data_type,
                   c.target_value, c.start_date, c.end_date, c.requires_verification
            FROM challenge_progress.challenge_participants cp
            JOIN challenge_progress.challenges c ON c.id = cp.challenge_id
            WHERE cp.client_id = $1 AND cp.status = 'active'
            ORDER BY c.start_date, c.id
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        let mut participations = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            participations.push(ActiveParticipation {
                client_id: row.try_get("client_id")?,
                current_progress: row.try_get("current_progress")?,
                verified_progress: row.try_get("verified_progress")?,
                status: ParticipantStatus::parse(&status)
                    .ok_or_else(|| StoreError::Decode(format!("unknown status {status:?}")))?,
                challenge: challenge_from_row(&row, "challenge_id")?,
            });
        }

        Ok(participations)
    }

    async fn wearable_samples(
        &self,
        client_id: Uuid,
        data_type: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HealthSample>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT client_id, data_type, value, source, recorded_at
            FROM challenge_progress.health_samples
            WHERE client_id = $1
              AND data_type = $2
              AND recorded_at BETWEEN $3 AND $4
              AND lower(trim(source)) <> 'manual'
            "#,
        )
        .bind(client_id)
        .bind(data_type)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let source: String = row.try_get("source")?;
            samples.push(HealthSample {
                client_id: row.try_get("client_id")?,
                data_type: row.try_get("data_type")?,
                value: row.try_get("value")?,
                source: WearableSource::parse(&source),
                recorded_at: row.try_get("recorded_at")?,
            });
        }

        Ok(samples)
    }

    async fn apply_update(&self, update: &ProgressUpdate) -> Result<bool, StoreError> {
        let status = if update.completed() {
            ParticipantStatus::Completed
        } else {
            ParticipantStatus::Active
        };

        let result = sqlx::query(
            r#"
            UPDATE challenge_progress.challenge_participants
            SET verified_progress = $3,
                current_progress = $4,
                status = $5,
                completed_at = COALESCE($6, completed_at),
                updated_at = NOW()
            WHERE challenge_id = $1 AND client_id = $2 AND status = 'active'
            "#,
        )
        .bind(update.challenge_id)
        .bind(update.client_id)
        .bind(update.verified_progress)
        .bind(update.current_progress)
        .bind(status.as_str())
        .bind(update.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
