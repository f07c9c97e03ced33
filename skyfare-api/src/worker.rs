use std::sync::Arc;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::{error, info};

use skyfare_booking::BookingManager;
use skyfare_core::PaymentState;
use skyfare_shared::events::{topics, PaymentCompletedEvent, PaymentFailedEvent};

/// Consumes payment outcome events and applies them to bookings. The saga
/// orchestrator applies the same transitions inline when it owns the saga, so
/// every transition here is idempotent; this worker covers outcomes produced
/// by other instances and replays after downtime.
pub async fn start_payment_worker(brokers: String, group_id: String, bookings: Arc<BookingManager>) {
    let consumer: StreamConsumer = match ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
    {
        Ok(c) => c,
        Err(e) => {
            error!("Consumer creation failed: {}", e);
            return;
        }
    };

    if let Err(e) = consumer.subscribe(&[topics::PAYMENT_COMPLETED, topics::PAYMENT_FAILED]) {
        error!("Failed to subscribe to payment topics: {}", e);
        return;
    }

    info!("Payment worker started, listening for payment outcomes...");

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                let topic = m.topic().to_string();
                if let Some(Ok(payload)) = m.payload_view::<str>() {
                    if let Err(e) = apply(&bookings, &topic, payload).await {
                        error!("Failed to apply {} event: {}", topic, e);
                    }
                }
            }
        }
    }
}

async fn apply(
    bookings: &BookingManager,
    topic: &str,
    payload: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match topic {
        topics::PAYMENT_COMPLETED => {
            let event: PaymentCompletedEvent = serde_json::from_str(payload)?;
            info!(
                "Applying payment completion for booking {}",
                event.booking_id
            );
            bookings
                .update_payment_status(event.booking_id, PaymentState::Completed)
                .await?;
        }
        topics::PAYMENT_FAILED => {
            let event: PaymentFailedEvent = serde_json::from_str(payload)?;
            info!(
                "Applying payment failure for booking {} (retryable: {})",
                event.booking_id, event.retryable
            );
            bookings
                .update_payment_status(event.booking_id, PaymentState::Failed)
                .await?;
            if !event.retryable {
                bookings.expire(event.booking_id).await?;
            }
        }
        other => info!("Ignoring message on unexpected topic {}", other),
    }
    Ok(())
}
