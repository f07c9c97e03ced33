use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use skyfare_core::payment::{PaymentGateway, PaymentRequest};
use skyfare_core::repository::RepoResult;

/// Stand-in provider adapter. `initiate` just acknowledges; the outcome is
/// reported later through the payment callback endpoint, same as a real
/// provider's webhook. Swap in a real adapter here when one exists.
pub struct MockGatewayAdapter;

#[async_trait]
impl PaymentGateway for MockGatewayAdapter {
    async fn initiate(&self, request: &PaymentRequest) -> RepoResult<()> {
        info!(
            "Initiated payment {} for booking {} ({} {})",
            request.transaction_id, request.booking_id, request.amount, request.currency
        );
        Ok(())
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: i64,
        currency: &str,
    ) -> RepoResult<String> {
        let refund_id = format!("re_{}", Uuid::new_v4().simple());
        info!(
            "Initiated refund {} of {} {} for transaction {}",
            refund_id, amount, currency, transaction_id
        );
        Ok(refund_id)
    }
}
