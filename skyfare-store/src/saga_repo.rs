use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use skyfare_core::repository::{RepoResult, SagaRepository};
use skyfare_core::{PaymentSaga, SagaStatus, SagaStep};

/// Durable saga/step state keyed by saga_id with a secondary index on
/// transaction_id, so any orchestrator instance can be rebuilt from storage
/// after a crash. Steps travel as a JSONB document.
pub struct PgSagaRepository {
    pool: PgPool,
}

impl PgSagaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SagaRow {
    saga_id: Uuid,
    booking_id: Uuid,
    transaction_id: String,
    user_id: String,
    status: String,
    steps: serde_json::Value,
    retry_count: i32,
    failure_reason: Option<String>,
    step_up_required: bool,
    awaiting_step_up: bool,
    deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(raw: &str) -> SagaStatus {
    match raw {
        "IN_PROGRESS" => SagaStatus::InProgress,
        "COMPLETED" => SagaStatus::Completed,
        "COMPENSATING" => SagaStatus::Compensating,
        "COMPENSATED" => SagaStatus::Compensated,
        "FAILED" => SagaStatus::Failed,
        _ => SagaStatus::Started,
    }
}

impl SagaRow {
    fn into_saga(self) -> RepoResult<PaymentSaga> {
        let steps: Vec<SagaStep> = serde_json::from_value(self.steps)?;
        Ok(PaymentSaga {
            saga_id: self.saga_id,
            booking_id: self.booking_id,
            transaction_id: self.transaction_id,
            user_id: self.user_id,
            status: parse_status(&self.status),
            steps,
            retry_count: self.retry_count as u32,
            failure_reason: self.failure_reason,
            step_up_required: self.step_up_required,
            awaiting_step_up: self.awaiting_step_up,
            deadline: self.deadline,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLS: &str = "SELECT saga_id, booking_id, transaction_id, user_id, status, steps, retry_count, failure_reason, step_up_required, awaiting_step_up, deadline, created_at, updated_at FROM payment_sagas";

const TERMINAL: &str = "('COMPLETED', 'COMPENSATED', 'FAILED')";

#[async_trait]
impl SagaRepository for PgSagaRepository {
    async fn insert(&self, saga: &PaymentSaga) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_sagas (saga_id, booking_id, transaction_id, user_id, status, steps, retry_count, failure_reason, step_up_required, awaiting_step_up, deadline, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(saga.saga_id)
        .bind(saga.booking_id)
        .bind(&saga.transaction_id)
        .bind(&saga.user_id)
        .bind(saga.status.as_str())
        .bind(serde_json::to_value(&saga.steps)?)
        .bind(saga.retry_count as i32)
        .bind(&saga.failure_reason)
        .bind(saga.step_up_required)
        .bind(saga.awaiting_step_up)
        .bind(saga.deadline)
        .bind(saga.created_at)
        .bind(saga.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, saga: &PaymentSaga) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_sagas
            SET status = $2, steps = $3, retry_count = $4, failure_reason = $5, awaiting_step_up = $6, updated_at = $7
            WHERE saga_id = $1
            "#,
        )
        .bind(saga.saga_id)
        .bind(saga.status.as_str())
        .bind(serde_json::to_value(&saga.steps)?)
        .bind(saga.retry_count as i32)
        .bind(&saga.failure_reason)
        .bind(saga.awaiting_step_up)
        .bind(saga.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, saga_id: Uuid) -> RepoResult<Option<PaymentSaga>> {
        let row: Option<SagaRow> = sqlx::query_as(&format!("{} WHERE saga_id = $1", SELECT_COLS))
            .bind(saga_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SagaRow::into_saga).transpose()
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> RepoResult<Option<PaymentSaga>> {
        let row: Option<SagaRow> = sqlx::query_as(&format!(
            "{} WHERE transaction_id = $1 AND status NOT IN {}",
            SELECT_COLS, TERMINAL
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SagaRow::into_saga).transpose()
    }

    async fn find_any_by_transaction(
        &self,
        transaction_id: &str,
    ) -> RepoResult<Option<PaymentSaga>> {
        let row: Option<SagaRow> = sqlx::query_as(&format!(
            "{} WHERE transaction_id = $1",
            SELECT_COLS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SagaRow::into_saga).transpose()
    }

    async fn find_stalled(&self, now: DateTime<Utc>) -> RepoResult<Vec<PaymentSaga>> {
        let rows: Vec<SagaRow> = sqlx::query_as(&format!(
            "{} WHERE deadline <= $1 AND status NOT IN {}",
            SELECT_COLS, TERMINAL
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SagaRow::into_saga).collect()
    }
}
