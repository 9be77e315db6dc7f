//! LearningStore: persistence for learning records against learning.db.

use super::events::{LearningEvent, StoredEvent};
use super::rate_limit::DailyWindow;
use super::{Account, AgentId, FixedPoint, H256, LearningError, LearningRecord, Milestone};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, SqlitePool};

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Everything one accepted operation writes, applied in a single transaction.
#[derive(Debug)]
pub struct RecordCommit<'a> {
    pub record: &'a LearningRecord,
    /// Drop previously reached milestones first (fresh record on re-enable).
    pub reset_milestones: bool,
    pub milestones: &'a [Milestone],
    pub events: &'a [LearningEvent],
}

/// Wraps a dedicated SQLite connection pool for learning.db.
pub struct LearningStore {
    pool: SqlitePool,
}

impl LearningStore {
    /// Connect to (or create) learning.db at the given path.
    ///
    /// Runs the embedded schema, enables WAL mode, and configures a small pool
    /// (one writer, one reader).
    pub async fn connect(path: &Path) -> Result<Arc<Self>, LearningError> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA_V1).execute(&pool).await?;

        Ok(Arc::new(Self { pool }))
    }

    /// Connect to `learning.db` inside `data_dir`, creating the directory.
    pub async fn connect_in(data_dir: &Path) -> Result<Arc<Self>, LearningError> {
        std::fs::create_dir_all(data_dir).map_err(|error| {
            anyhow::anyhow!(
                "failed to create data directory {}: {error}",
                data_dir.display()
            )
        })?;
        Self::connect(&data_dir.join("learning.db")).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Load an agent's record together with its reached milestones.
    pub async fn load_record(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<LearningRecord>, LearningError> {
        let agent_key = to_sql(agent_id.0)?;
        let row = sqlx::query(
            r#"
            SELECT agent_id, module, root, version, total_interactions, learning_events,
                   created_at, last_update_at, learning_velocity, confidence_score,
                   daily_update_count, daily_window_start, learning_enabled
            FROM learning_records
            WHERE agent_id = ?
            "#,
        )
        .bind(agent_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let milestone_rows =
            sqlx::query("SELECT milestone FROM learning_milestones WHERE agent_id = ?")
                .bind(agent_key)
                .fetch_all(&self.pool)
                .await?;

        let mut milestones = BTreeSet::new();
        for milestone_row in milestone_rows {
            let key: String = milestone_row.try_get("milestone")?;
            match Milestone::from_key(&key) {
                Some(milestone) => {
                    milestones.insert(milestone);
                }
                None => tracing::warn!(%agent_id, key, "skipping unrecognized milestone"),
            }
        }

        record_from_row(&row, milestones).map(Some)
    }

    /// Apply a commit atomically: the record row, its new milestones and the
    /// audit events either all land or none do.
    pub async fn commit(&self, commit: RecordCommit<'_>) -> Result<(), LearningError> {
        let record = commit.record;
        let agent_key = to_sql(record.agent_id.0)?;
        let mut transaction = self.pool.begin().await?;

        if commit.reset_milestones {
            sqlx::query("DELETE FROM learning_milestones WHERE agent_id = ?")
                .bind(agent_key)
                .execute(&mut *transaction)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO learning_records
                (agent_id, module, root, version, total_interactions, learning_events,
                 created_at, last_update_at, learning_velocity, confidence_score,
                 daily_update_count, daily_window_start, learning_enabled, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(agent_id) DO UPDATE SET
                module             = excluded.module,
                root               = excluded.root,
                version            = excluded.version,
                total_interactions = excluded.total_interactions,
                learning_events    = excluded.learning_events,
                created_at         = excluded.created_at,
                last_update_at     = excluded.last_update_at,
                learning_velocity  = excluded.learning_velocity,
                confidence_score   = excluded.confidence_score,
                daily_update_count = excluded.daily_update_count,
                daily_window_start = excluded.daily_window_start,
                learning_enabled   = excluded.learning_enabled,
                updated_at         = excluded.updated_at
            "#,
        )
        .bind(agent_key)
        .bind(record.module.as_str())
        .bind(record.root.to_hex())
        .bind(to_sql(record.version)?)
        .bind(to_sql(record.total_interactions)?)
        .bind(to_sql(record.learning_events)?)
        .bind(record.created_at.timestamp_millis())
        .bind(record.last_update_timestamp.timestamp_millis())
        .bind(to_sql(record.learning_velocity.raw())?)
        .bind(to_sql(record.confidence_score.raw())?)
        .bind(i64::from(record.rate_window.count))
        .bind(record.rate_window.started_at.timestamp_millis())
        .bind(record.learning_enabled)
        .execute(&mut *transaction)
        .await?;

        for milestone in commit.milestones {
            sqlx::query(
                "INSERT OR IGNORE INTO learning_milestones (agent_id, milestone, reached_at) VALUES (?, ?, ?)",
            )
            .bind(agent_key)
            .bind(milestone.key())
            .bind(record.last_update_timestamp.timestamp_millis())
            .execute(&mut *transaction)
            .await?;
        }

        for event in commit.events {
            let details = serde_json::to_string(event)
                .map_err(|error| anyhow::anyhow!("failed to encode learning event: {error}"))?;
            sqlx::query(
                "INSERT INTO learning_events (id, agent_id, event_type, summary, details, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(agent_key)
            .bind(event.event_type())
            .bind(event.summary())
            .bind(details)
            .bind(event.at().timestamp_millis())
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    /// Most recent audit events for an agent, newest first.
    pub async fn learning_history(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, LearningError> {
        let rows = sqlx::query(
            r#"
            SELECT id, agent_id, event_type, summary, details, created_at
            FROM learning_events
            WHERE agent_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(to_sql(agent_id.0)?)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let details: Option<String> = row.try_get("details")?;
                Ok(StoredEvent {
                    id: row.try_get("id")?,
                    agent_id: AgentId(from_sql(row.try_get("agent_id")?)),
                    event_type: row.try_get("event_type")?,
                    summary: row.try_get("summary")?,
                    details: details.and_then(|details| serde_json::from_str(&details).ok()),
                    created_at: timestamp(row.try_get("created_at")?)?,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for LearningStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningStore").finish_non_exhaustive()
    }
}

fn record_from_row(
    row: &SqliteRow,
    milestones_reached: BTreeSet<Milestone>,
) -> Result<LearningRecord, LearningError> {
    let root: String = row.try_get("root")?;
    let root = H256::from_str(&root)
        .map_err(|error| anyhow::anyhow!("corrupt learning root {root:?}: {error}"))?;
    let daily_update_count: i64 = row.try_get("daily_update_count")?;

    Ok(LearningRecord {
        agent_id: AgentId(from_sql(row.try_get("agent_id")?)),
        module: Account(row.try_get("module")?),
        root,
        version: from_sql(row.try_get("version")?),
        total_interactions: from_sql(row.try_get("total_interactions")?),
        learning_events: from_sql(row.try_get("learning_events")?),
        created_at: timestamp(row.try_get("created_at")?)?,
        last_update_timestamp: timestamp(row.try_get("last_update_at")?)?,
        learning_velocity: FixedPoint(from_sql(row.try_get("learning_velocity")?)),
        confidence_score: FixedPoint(from_sql(row.try_get("confidence_score")?)),
        rate_window: DailyWindow {
            count: u32::try_from(daily_update_count).unwrap_or(0),
            started_at: timestamp(row.try_get("daily_window_start")?)?,
        },
        learning_enabled: row.try_get("learning_enabled")?,
        milestones_reached,
    })
}

/// SQLite integers are signed; counters above `i64::MAX` are refused rather
/// than wrapped.
fn to_sql(value: u64) -> Result<i64, LearningError> {
    i64::try_from(value)
        .map_err(|_| LearningError::Other(anyhow::anyhow!("value {value} exceeds storage range")))
}

fn from_sql(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, LearningError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| LearningError::Other(anyhow::anyhow!("invalid timestamp {millis}")))
}

/// Embedded schema for learning.db.
///
/// All statements use `IF NOT EXISTS` so re-running on every connect is safe.
/// Timestamps are unix milliseconds; hashes are lowercase hex.
const SCHEMA_V1: &str = r#"
-- One row per agent; replaced in place when learning is re-enabled
CREATE TABLE IF NOT EXISTS learning_records (
    agent_id INTEGER PRIMARY KEY,
    module TEXT NOT NULL,
    root TEXT NOT NULL,
    version INTEGER NOT NULL,
    total_interactions INTEGER NOT NULL DEFAULT 0,
    learning_events INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    last_update_at INTEGER NOT NULL,
    learning_velocity INTEGER NOT NULL DEFAULT 0,
    confidence_score INTEGER NOT NULL DEFAULT 0,
    daily_update_count INTEGER NOT NULL DEFAULT 0,
    daily_window_start INTEGER NOT NULL,
    learning_enabled INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Milestones already notified for the current record lifetime
CREATE TABLE IF NOT EXISTS learning_milestones (
    agent_id INTEGER NOT NULL,
    milestone TEXT NOT NULL,
    reached_at INTEGER NOT NULL,
    PRIMARY KEY (agent_id, milestone)
);

-- Learning events log (audit trail)
CREATE TABLE IF NOT EXISTS learning_events (
    id TEXT PRIMARY KEY,
    agent_id INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    summary TEXT NOT NULL,
    details TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_learning_events_agent ON learning_events(agent_id, created_at);
"#;
