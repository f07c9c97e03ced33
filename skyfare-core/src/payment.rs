use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::RepoResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub transaction_id: String,
    pub booking_id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
}

/// Payment provider seam. `initiate` is fire-and-forget: the provider answers
/// later through the saga's payment callback, never inline.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &PaymentRequest) -> RepoResult<()>;

    /// Returns the provider's refund id.
    async fn refund(&self, transaction_id: &str, amount: i64, currency: &str)
        -> RepoResult<String>;
}
