use agentic_run_common::{Run, RunEvent, RunId, RunStatus};
use async_trait::async_trait;
use sqlx::{error::DatabaseError, postgres::PgPoolOptions, PgPool, Row};

use crate::error::StoreError;
use crate::{Result, RunStore};

pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    project_id: String,
    owner_id: String,
    chat_id: Option<String>,
    status: String,
    last_event_seq: i64,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    latest_output: Option<String>,
    latest_error_code: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl RunRow {
    fn into_run(self) -> Result<Run> {
        Ok(Run {
            id: RunId(self.id),
            project_id: self.project_id,
            owner_id: self.owner_id,
            chat_id: self.chat_id,
            status: parse_status(&self.status)?,
            last_event_seq: self.last_event_seq,
            started_at: self.started_at,
            completed_at: self.completed_at,
            latest_output: self.latest_output,
            latest_error_code: self.latest_error_code,
            created_at: self.created_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<RunStatus> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| StoreError::Backend(format!("unrecognised run status {raw:?}")))
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Timeout => "timeout",
        RunStatus::Cancelled => "cancelled",
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    run_id: String,
    seq: i64,
    event_type: String,
    payload: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<EventRow> for RunEvent {
    fn from(row: EventRow) -> Self {
        RunEvent {
            run_id: RunId(row.run_id),
            seq: row.seq,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn create_run(
        &self,
        project_id: &str,
        owner_id: &str,
        chat_id: Option<&str>,
    ) -> Result<Run> {
        let id = RunId::new();
        let row: RunRow = sqlx::query_as(
            "INSERT INTO agentic_run (id, project_id, owner_id, chat_id, status, last_event_seq)
             VALUES ($1, $2, $3, $4, $5, 0)
             RETURNING *",
        )
        .bind(id.0.as_str())
        .bind(project_id)
        .bind(owner_id)
        .bind(chat_id)
        .bind(status_str(RunStatus::Queued))
        .fetch_one(&self.pool)
        .await?;
        row.into_run()
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Run> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM agentic_run WHERE id = $1")
            .bind(run_id.as_ref())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| StoreError::NotFound(run_id.clone()))?.into_run()
    }

    async fn append_event(
        &self,
        run_id: &RunId,
        seq: i64,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<RunEvent> {
        let mut tx = self.pool.begin().await?;

        let current_seq: Option<i64> =
            sqlx::query_scalar("SELECT last_event_seq FROM agentic_run WHERE id = $1 FOR UPDATE")
                .bind(run_id.as_ref())
                .fetch_optional(&mut *tx)
                .await?;
        let current_seq = current_seq.ok_or_else(|| StoreError::NotFound(run_id.clone()))?;

        if seq != current_seq + 1 {
            return Err(StoreError::Conflict {
                run_id: run_id.clone(),
                seq,
            });
        }

        let result: std::result::Result<EventRow, sqlx::Error> = sqlx::query_as(
            "INSERT INTO agentic_run_event (run_id, seq, event_type, payload)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(run_id.as_ref())
        .bind(seq)
        .bind(event_type)
        .bind(&payload)
        .fetch_one(&mut *tx)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                return Err(StoreError::Conflict {
                    run_id: run_id.clone(),
                    seq,
                });
            }
            Err(err) => return Err(err.into()),
        };

        sqlx::query("UPDATE agentic_run SET last_event_seq = $2 WHERE id = $1")
            .bind(run_id.as_ref())
            .bind(seq)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_events(&self, run_id: &RunId, after_seq: i64) -> Result<Vec<RunEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM agentic_run_event WHERE run_id = $1 AND seq > $2 ORDER BY seq ASC",
        )
        .bind(run_id.as_ref())
        .bind(after_seq)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RunEvent::from).collect())
    }

    async fn set_status(
        &self,
        run_id: &RunId,
        next: RunStatus,
        last_event_seq: i64,
        latest_output: Option<String>,
        latest_error_code: Option<String>,
    ) -> Result<Run> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query("SELECT status FROM agentic_run WHERE id = $1 FOR UPDATE")
                .bind(run_id.as_ref())
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.get("status"));
        let current = current.ok_or_else(|| StoreError::NotFound(run_id.clone()))?;
        let current = parse_status(&current)?;

        if !current.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                run_id: run_id.clone(),
                from: current,
                to: next,
            });
        }

        let completed_at = next.is_terminal().then(|| chrono::Utc::now());
        let started_at = matches!(next, RunStatus::Running).then(|| chrono::Utc::now());

        let row: RunRow = sqlx::query_as(
            "UPDATE agentic_run
             SET status = $2,
                 last_event_seq = $3,
                 latest_output = COALESCE($4, latest_output),
                 latest_error_code = COALESCE($5, latest_error_code),
                 completed_at = COALESCE($6, completed_at),
                 started_at = COALESCE($7, started_at)
             WHERE id = $1
             RETURNING *",
        )
        .bind(run_id.as_ref())
        .bind(status_str(next))
        .bind(last_event_seq)
        .bind(latest_output)
        .bind(latest_error_code)
        .bind(completed_at)
        .bind(started_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_run()
    }
}
