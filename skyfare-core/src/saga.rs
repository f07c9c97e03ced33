use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Started,
    InProgress,
    Completed,
    Compensating,
    Compensated,
    Failed,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InProgress => "IN_PROGRESS",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Compensated,
}

/// The fixed three-step payment pipeline. Each step pairs with the
/// compensating action that semantically undoes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    ValidateBooking,
    ProcessPayment,
    ConfirmBooking,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::ValidateBooking => "validate-booking",
            StepId::ProcessPayment => "process-payment",
            StepId::ConfirmBooking => "confirm-booking",
        }
    }

    pub fn compensation(&self) -> &'static str {
        match self {
            StepId::ValidateBooking => "release-seats",
            StepId::ProcessPayment => "refund",
            StepId::ConfirmBooking => "cancel-booking",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStep {
    pub step: StepId,
    pub status: StepStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl SagaStep {
    fn new(step: StepId) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            executed_at: None,
            failure_reason: None,
        }
    }
}

/// Per-booking payment workflow record. Persisted so an orchestrator can be
/// rebuilt from storage after a crash; terminal sagas stay on disk for audit
/// but drop out of the live transaction index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSaga {
    pub saga_id: Uuid,
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub user_id: String,
    pub status: SagaStatus,
    pub steps: Vec<SagaStep>,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    /// Above-threshold transactions must pass the step-up gate before
    /// process-payment may complete.
    pub step_up_required: bool,
    /// A success callback arrived before step-up verification; the saga is
    /// parked until the OTP is verified.
    pub awaiting_step_up: bool,
    /// Bounded-wait policy for a callback that never arrives: the sweeper
    /// compensates any non-terminal saga past this instant.
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSaga {
    pub fn new(
        booking_id: Uuid,
        user_id: String,
        step_up_required: bool,
        deadline: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            saga_id: Uuid::new_v4(),
            booking_id,
            transaction_id: format!("txn_{}", Uuid::new_v4().simple()),
            user_id,
            status: SagaStatus::Started,
            steps: vec![
                SagaStep::new(StepId::ValidateBooking),
                SagaStep::new(StepId::ProcessPayment),
                SagaStep::new(StepId::ConfirmBooking),
            ],
            retry_count: 0,
            failure_reason: None,
            step_up_required,
            awaiting_step_up: false,
            deadline: now + deadline,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, id: StepId) -> &SagaStep {
        self.steps
            .iter()
            .find(|s| s.step == id)
            .unwrap_or_else(|| unreachable!("saga always carries all three steps"))
    }

    pub fn step_mut(&mut self, id: StepId) -> &mut SagaStep {
        self.steps
            .iter_mut()
            .find(|s| s.step == id)
            .unwrap_or_else(|| unreachable!("saga always carries all three steps"))
    }

    /// Next step awaiting execution, in pipeline order.
    pub fn next_pending(&self) -> Option<StepId> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Pending)
            .map(|s| s.step)
    }

    /// Completed steps in reverse chronological order, i.e. the order in which
    /// compensations must run.
    pub fn compensation_plan(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.step)
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensation_plan_is_reverse_of_completion_order() {
        let mut saga = PaymentSaga::new(
            Uuid::new_v4(),
            "user-1".to_string(),
            false,
            Duration::minutes(30),
        );
        saga.step_mut(StepId::ValidateBooking).status = StepStatus::Completed;
        saga.step_mut(StepId::ProcessPayment).status = StepStatus::Completed;

        assert_eq!(
            saga.compensation_plan(),
            vec![StepId::ProcessPayment, StepId::ValidateBooking]
        );
    }

    #[test]
    fn next_pending_follows_pipeline_order() {
        let mut saga = PaymentSaga::new(
            Uuid::new_v4(),
            "user-1".to_string(),
            false,
            Duration::minutes(30),
        );
        assert_eq!(saga.next_pending(), Some(StepId::ValidateBooking));

        saga.step_mut(StepId::ValidateBooking).status = StepStatus::Completed;
        assert_eq!(saga.next_pending(), Some(StepId::ProcessPayment));
    }
}
