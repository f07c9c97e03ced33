use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use skyfare_booking::{BookingManager, SeatLockManager};
use skyfare_core::payment::{PaymentGateway, PaymentRequest};
use skyfare_core::repository::{EventSink, SagaRepository};
use skyfare_core::{
    Booking, BookingError, BookingResult, BookingStatus, PaymentSaga, PaymentState, SagaStatus,
    StepId, StepStatus,
};
use skyfare_shared::events::{
    topics, PaymentCompletedEvent, PaymentFailedEvent, PaymentInitiatedEvent,
    PaymentRequestedEvent, RefundCompletedEvent, RefundInitiatedEvent,
};

use crate::otp::OtpGate;

/// Drives the per-booking payment pipeline:
/// validate-booking -> process-payment -> confirm-booking,
/// compensating in reverse order (release-seats, refund, cancel-booking) after
/// the retry budget is spent.
///
/// State lives in the saga repository, not in this object; any instance can
/// resume any saga from storage, and the callback entry point is the only way
/// out of a waiting process-payment step.
pub struct SagaOrchestrator {
    sagas: Arc<dyn SagaRepository>,
    bookings: Arc<BookingManager>,
    locks: Arc<SeatLockManager>,
    gateway: Arc<dyn PaymentGateway>,
    otp: Arc<OtpGate>,
    events: Arc<dyn EventSink>,
    max_retries: u32,
    deadline: Duration,
}

impl SagaOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sagas: Arc<dyn SagaRepository>,
        bookings: Arc<BookingManager>,
        locks: Arc<SeatLockManager>,
        gateway: Arc<dyn PaymentGateway>,
        otp: Arc<OtpGate>,
        events: Arc<dyn EventSink>,
        max_retries: u32,
        deadline: Duration,
    ) -> Self {
        Self {
            sagas,
            bookings,
            locks,
            gateway,
            otp,
            events,
            max_retries,
            deadline,
        }
    }

    async fn emit<T: Serialize>(&self, topic: &str, key: &str, event: &T) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if let Err(e) = self.events.publish(topic, key, &payload).await {
                    warn!("Failed to publish {} for {}: {}", topic, key, e);
                }
            }
            Err(e) => warn!("Failed to serialize {} event: {}", topic, e),
        }
    }

    async fn persist(&self, saga: &mut PaymentSaga) -> BookingResult<()> {
        saga.touch();
        self.sagas.update(saga).await.map_err(BookingError::store)
    }

    /// Start the saga for a LOCKED booking: request payment, issue the
    /// step-up challenge when the amount crosses the threshold, and run the
    /// pipeline up to the asynchronous payment wait.
    pub async fn start(&self, booking_id: Uuid) -> BookingResult<PaymentSaga> {
        let booking = self.bookings.get(booking_id).await?;
        if booking.status != BookingStatus::Locked {
            return Err(BookingError::InvalidTransition {
                from: booking.status.as_str().to_string(),
                to: "payment saga".to_string(),
            });
        }

        let step_up = self
            .otp
            .requires_step_up(booking.total_amount, &booking.currency);
        let mut saga = PaymentSaga::new(
            booking_id,
            booking.user_id.clone(),
            step_up,
            self.deadline,
        );
        self.sagas.insert(&saga).await.map_err(BookingError::store)?;

        self.emit(
            topics::PAYMENT_REQUESTED,
            &booking_id.to_string(),
            &PaymentRequestedEvent {
                booking_id,
                transaction_id: saga.transaction_id.clone(),
                user_id: booking.user_id.clone(),
                amount: booking.total_amount,
                currency: booking.currency.clone(),
            },
        )
        .await;

        if step_up {
            self.otp
                .challenge(&saga.transaction_id, &booking.user_id, booking.total_amount)
                .await?;
        }

        info!(
            "Saga {} started for booking {} (txn {})",
            saga.saga_id, booking_id, saga.transaction_id
        );
        self.advance(&mut saga).await?;
        Ok(saga)
    }

    /// Execute pending steps in order until the pipeline completes or parks on
    /// the payment wait.
    async fn advance(&self, saga: &mut PaymentSaga) -> BookingResult<()> {
        loop {
            let Some(step_id) = saga.next_pending() else {
                if saga
                    .steps
                    .iter()
                    .all(|s| s.status == StepStatus::Completed)
                {
                    saga.status = SagaStatus::Completed;
                    self.persist(saga).await?;
                    info!("Saga {} completed", saga.saga_id);
                }
                return Ok(());
            };

            saga.status = SagaStatus::InProgress;
            {
                let step = saga.step_mut(step_id);
                step.status = StepStatus::InProgress;
                step.executed_at = Some(Utc::now());
            }
            self.persist(saga).await?;

            match step_id {
                StepId::ValidateBooking => match self.validate_booking(saga).await {
                    Ok(()) => {
                        saga.step_mut(step_id).status = StepStatus::Completed;
                        self.persist(saga).await?;
                    }
                    Err(reason) => {
                        self.handle_step_failure(saga, step_id, &reason).await?;
                        if saga.status.is_terminal() {
                            return Ok(());
                        }
                    }
                },
                StepId::ProcessPayment => {
                    let booking = self.bookings.get(saga.booking_id).await?;
                    let request = PaymentRequest {
                        transaction_id: saga.transaction_id.clone(),
                        booking_id: saga.booking_id,
                        user_id: saga.user_id.clone(),
                        amount: booking.total_amount,
                        currency: booking.currency.clone(),
                    };
                    if let Err(e) = self.gateway.initiate(&request).await {
                        let reason = format!("payment initiation failed: {}", e);
                        self.handle_step_failure(saga, step_id, &reason).await?;
                        if saga.status.is_terminal() {
                            return Ok(());
                        }
                        continue;
                    }
                    self.emit(
                        topics::PAYMENT_INITIATED,
                        &saga.transaction_id,
                        &PaymentInitiatedEvent {
                            transaction_id: saga.transaction_id.clone(),
                            booking_id: saga.booking_id,
                            amount: booking.total_amount,
                            currency: booking.currency.clone(),
                            attempt: saga.retry_count + 1,
                        },
                    )
                    .await;
                    // Suspend here; only the payment callback moves this step.
                    return Ok(());
                }
                StepId::ConfirmBooking => {
                    match self
                        .bookings
                        .update_payment_status(saga.booking_id, PaymentState::Completed)
                        .await
                    {
                        Ok(()) => {
                            saga.step_mut(step_id).status = StepStatus::Completed;
                            self.persist(saga).await?;
                        }
                        Err(e) => {
                            let reason = format!("booking confirmation failed: {}", e);
                            self.handle_step_failure(saga, step_id, &reason).await?;
                            if saga.status.is_terminal() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    async fn validate_booking(&self, saga: &PaymentSaga) -> Result<(), String> {
        let booking = self
            .bookings
            .get(saga.booking_id)
            .await
            .map_err(|e| e.to_string())?;
        if booking.status != BookingStatus::Locked {
            return Err(format!(
                "booking is {}, expected LOCKED",
                booking.status.as_str()
            ));
        }
        if booking.lock_expires_at <= Utc::now() {
            return Err("seat hold already expired".to_string());
        }
        Ok(())
    }

    /// Resume entry point for the asynchronous payment step. Invoked by the
    /// payment-confirmation path with the provider's outcome.
    pub async fn handle_payment_callback(
        &self,
        transaction_id: &str,
        success: bool,
        reason: Option<&str>,
    ) -> BookingResult<()> {
        let Some(mut saga) = self
            .sagas
            .find_by_transaction(transaction_id)
            .await
            .map_err(BookingError::store)?
        else {
            // At-least-once delivery: a redelivery after the saga settled is
            // acked as a no-op, an unknown transaction is not.
            if let Some(settled) = self
                .sagas
                .find_any_by_transaction(transaction_id)
                .await
                .map_err(BookingError::store)?
            {
                info!(
                    "Ignoring payment callback for {}; saga already {}",
                    transaction_id,
                    settled.status.as_str()
                );
                return Ok(());
            }
            return Err(BookingError::NotFound {
                kind: "Saga",
                id: transaction_id.to_string(),
            });
        };

        if saga.step(StepId::ProcessPayment).status != StepStatus::InProgress {
            info!(
                "Ignoring payment callback for {}; process-payment is not waiting",
                transaction_id
            );
            return Ok(());
        }

        if !success {
            let reason = reason.unwrap_or("payment declined").to_string();
            self.handle_step_failure(&mut saga, StepId::ProcessPayment, &reason)
                .await?;
            if !saga.status.is_terminal() {
                // Retry granted: re-run process-payment.
                self.advance(&mut saga).await?;
            }
            return Ok(());
        }

        if saga.step_up_required && !self.otp.is_verified(transaction_id).await? {
            // Gate first: the payment may not complete until step-up passes.
            saga.awaiting_step_up = true;
            self.persist(&mut saga).await?;
            info!(
                "Payment for {} confirmed by provider but parked pending step-up",
                transaction_id
            );
            return Ok(());
        }

        self.complete_payment(&mut saga).await
    }

    /// Verify the step-up code; if the provider callback already arrived, the
    /// parked saga resumes immediately.
    pub async fn confirm_step_up(&self, transaction_id: &str, code: &str) -> BookingResult<()> {
        self.otp.verify(transaction_id, code).await?;

        let Some(mut saga) = self
            .sagas
            .find_by_transaction(transaction_id)
            .await
            .map_err(BookingError::store)?
        else {
            return Err(BookingError::NotFound {
                kind: "Saga",
                id: transaction_id.to_string(),
            });
        };

        if saga.awaiting_step_up {
            saga.awaiting_step_up = false;
            self.complete_payment(&mut saga).await?;
        }
        Ok(())
    }

    async fn complete_payment(&self, saga: &mut PaymentSaga) -> BookingResult<()> {
        saga.step_mut(StepId::ProcessPayment).status = StepStatus::Completed;
        self.persist(saga).await?;

        let booking = self.bookings.get(saga.booking_id).await?;
        self.emit(
            topics::PAYMENT_COMPLETED,
            &saga.transaction_id,
            &PaymentCompletedEvent {
                transaction_id: saga.transaction_id.clone(),
                booking_id: saga.booking_id,
                amount: booking.total_amount,
                currency: booking.currency.clone(),
            },
        )
        .await;

        self.advance(saga).await
    }

    /// Bounded retry of the same step; once the budget is spent the saga
    /// flips to compensation.
    async fn handle_step_failure(
        &self,
        saga: &mut PaymentSaga,
        step_id: StepId,
        reason: &str,
    ) -> BookingResult<()> {
        saga.retry_count += 1;
        {
            let step = saga.step_mut(step_id);
            step.status = StepStatus::Failed;
            step.failure_reason = Some(reason.to_string());
        }
        warn!(
            "Saga {} step {} failed (attempt {}): {}",
            saga.saga_id,
            step_id.as_str(),
            saga.retry_count,
            reason
        );

        if saga.retry_count < self.max_retries {
            // Rearm the same step; the caller's loop (or the callback path)
            // re-executes it.
            saga.step_mut(step_id).status = StepStatus::Pending;
            return self.persist(saga).await;
        }

        self.compensate(saga, reason).await
    }

    /// Run compensations for every COMPLETED step, most recent first. A
    /// compensation failure is logged and the sweep continues; all of them are
    /// attempted.
    async fn compensate(&self, saga: &mut PaymentSaga, reason: &str) -> BookingResult<()> {
        saga.status = SagaStatus::Compensating;
        self.persist(saga).await?;
        info!("Saga {} compensating: {}", saga.saga_id, reason);

        let booking = self.bookings.get(saga.booking_id).await?;

        for step_id in saga.compensation_plan() {
            let outcome = self.run_compensation(saga, &booking, step_id).await;
            match outcome {
                Ok(()) => {
                    saga.step_mut(step_id).status = StepStatus::Compensated;
                    self.persist(saga).await?;
                }
                Err(e) => {
                    let err = BookingError::CompensationFailed {
                        step: step_id.compensation().to_string(),
                        reason: e.to_string(),
                    };
                    error!("Saga {}: {}", saga.saga_id, err);
                }
            }
        }

        saga.status = SagaStatus::Compensated;
        saga.failure_reason = Some(reason.to_string());
        self.persist(saga).await?;

        self.emit(
            topics::PAYMENT_FAILED,
            &saga.transaction_id,
            &PaymentFailedEvent {
                transaction_id: saga.transaction_id.clone(),
                booking_id: saga.booking_id,
                reason: reason.to_string(),
                retryable: false,
            },
        )
        .await;

        // Leave the booking in its cancel-equivalent end state even if the
        // payment-failed consumer is down: failed payment, seats back in the
        // pool.
        let booking = self.bookings.get(saga.booking_id).await?;
        if booking.status == BookingStatus::Locked {
            if booking.payment_status != PaymentState::Refunded {
                self.bookings
                    .update_payment_status(saga.booking_id, PaymentState::Failed)
                    .await?;
            }
            self.bookings.expire(saga.booking_id).await?;
        }

        info!("Saga {} compensated", saga.saga_id);
        Ok(())
    }

    async fn run_compensation(
        &self,
        saga: &PaymentSaga,
        booking: &Booking,
        step_id: StepId,
    ) -> BookingResult<()> {
        match step_id {
            // release-seats
            StepId::ValidateBooking => {
                self.locks
                    .release_user_locks(booking.flight_id, &saga.user_id)
                    .await?;
                Ok(())
            }
            // refund
            StepId::ProcessPayment => {
                let refund_id = self
                    .gateway
                    .refund(&saga.transaction_id, booking.total_amount, &booking.currency)
                    .await
                    .map_err(BookingError::store)?;
                self.emit(
                    topics::REFUND_INITIATED,
                    &refund_id,
                    &RefundInitiatedEvent {
                        refund_id: refund_id.clone(),
                        transaction_id: saga.transaction_id.clone(),
                        booking_id: saga.booking_id,
                        amount: booking.total_amount,
                        currency: booking.currency.clone(),
                    },
                )
                .await;
                self.bookings
                    .update_payment_status(saga.booking_id, PaymentState::Refunded)
                    .await?;
                // The gateway settles the refund inline, so completion follows
                // initiation directly.
                self.emit(
                    topics::REFUND_COMPLETED,
                    &refund_id,
                    &RefundCompletedEvent {
                        refund_id: refund_id.clone(),
                        transaction_id: saga.transaction_id.clone(),
                    },
                )
                .await;
                Ok(())
            }
            // cancel-booking
            StepId::ConfirmBooking => {
                self.bookings
                    .cancel(saga.booking_id, "payment saga compensated")
                    .await
            }
        }
    }

    /// Bounded-wait policy for callbacks that never arrive: compensate every
    /// non-terminal saga past its deadline. Driven by the background sweeper.
    pub async fn reap_stalled_sagas(&self) -> BookingResult<usize> {
        let stalled = self
            .sagas
            .find_stalled(Utc::now())
            .await
            .map_err(BookingError::store)?;
        let count = stalled.len();
        for mut saga in stalled {
            warn!(
                "Saga {} passed its deadline while {}",
                saga.saga_id,
                saga.status.as_str()
            );
            self.compensate(&mut saga, "saga deadline exceeded").await?;
        }
        Ok(count)
    }

    pub async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> BookingResult<Option<PaymentSaga>> {
        self.sagas
            .find_by_transaction(transaction_id)
            .await
            .map_err(BookingError::store)
    }
}
