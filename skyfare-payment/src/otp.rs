use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use skyfare_core::repository::{EventSink, LockStore};
use skyfare_core::{BookingError, BookingResult};
use skyfare_shared::events::{topics, OtpRequiredEvent};

/// One amount band: payments strictly above `min_amount` get `priority`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityBand {
    pub min_amount: i64,
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub expiry: Duration,
    pub max_attempts: u32,
    pub threshold_currency: String,
    pub threshold_amount: i64,
    /// Checked highest band first; payments matching no band get priority 2.
    pub priority_bands: Vec<PriorityBand>,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::minutes(5),
            max_attempts: 3,
            threshold_currency: "VND".to_string(),
            threshold_amount: 5_000_000,
            priority_bands: vec![
                PriorityBand { min_amount: 50_000_000, priority: 10 },
                PriorityBand { min_amount: 20_000_000, priority: 8 },
                PriorityBand { min_amount: 10_000_000, priority: 6 },
                PriorityBand { min_amount: 5_000_000, priority: 4 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub transaction_id: String,
    pub user_id: String,
    pub code: String,
    pub attempts: u32,
    pub expires_at: DateTime<Utc>,
}

/// Step-up authentication for above-threshold payments.
///
/// Codes are single-use, short-lived and attempt-bounded, stored in the
/// advisory store keyed by transaction id so its TTL handles expiry cleanup.
pub struct OtpGate {
    store: Arc<dyn LockStore>,
    events: Arc<dyn EventSink>,
    config: OtpConfig,
}

impl OtpGate {
    pub fn new(store: Arc<dyn LockStore>, events: Arc<dyn EventSink>, config: OtpConfig) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    fn code_key(transaction_id: &str) -> String {
        format!("otp:{}", transaction_id)
    }

    fn verified_key(transaction_id: &str) -> String {
        format!("otp:verified:{}", transaction_id)
    }

    pub fn requires_step_up(&self, amount: i64, currency: &str) -> bool {
        currency == self.config.threshold_currency && amount > self.config.threshold_amount
    }

    /// Delivery priority (1-10) from the amount bands; higher amount, higher
    /// priority.
    pub fn priority_for(&self, amount: i64) -> u8 {
        self.config
            .priority_bands
            .iter()
            .find(|band| amount > band.min_amount)
            .map(|band| band.priority)
            .unwrap_or(2)
    }

    /// Generate and store a fresh code for the transaction, then signal the
    /// notification collaborator via `otp-required`.
    pub async fn challenge(
        &self,
        transaction_id: &str,
        user_id: &str,
        amount: i64,
    ) -> BookingResult<OtpChallenge> {
        let challenge = OtpChallenge {
            transaction_id: transaction_id.to_string(),
            user_id: user_id.to_string(),
            code: format!("{:06}", rand::thread_rng().gen_range(0..1_000_000)),
            attempts: 0,
            expires_at: Utc::now() + self.config.expiry,
        };

        self.put_challenge(&challenge).await?;

        let event = OtpRequiredEvent {
            transaction_id: transaction_id.to_string(),
            user_id: user_id.to_string(),
            code: challenge.code.clone(),
            priority: self.priority_for(amount),
            expires_at: challenge.expires_at,
        };
        match serde_json::to_string(&event) {
            Ok(payload) => {
                if let Err(e) = self
                    .events
                    .publish(topics::OTP_REQUIRED, transaction_id, &payload)
                    .await
                {
                    warn!("Failed to publish otp-required for {}: {}", transaction_id, e);
                }
            }
            Err(e) => warn!("Failed to serialize otp-required event: {}", e),
        }

        info!(
            "Step-up challenge issued for {} (priority {})",
            transaction_id,
            event.priority
        );
        Ok(challenge)
    }

    async fn put_challenge(&self, challenge: &OtpChallenge) -> BookingResult<()> {
        let ttl = (challenge.expires_at - Utc::now()).to_std().unwrap_or_default();
        let payload = serde_json::to_string(challenge).map_err(BookingError::store)?;
        self.store
            .put(&Self::code_key(&challenge.transaction_id), &payload, ttl)
            .await
            .map_err(BookingError::store)
    }

    /// Single-use verification. A mismatch burns an attempt; an exhausted
    /// counter fails even for the correct code.
    pub async fn verify(&self, transaction_id: &str, code: &str) -> BookingResult<()> {
        let key = Self::code_key(transaction_id);
        let stored = self
            .store
            .get(&key)
            .await
            .map_err(BookingError::store)?
            .ok_or(BookingError::OtpExpiredOrInvalid)?;
        let mut challenge: OtpChallenge =
            serde_json::from_str(&stored).map_err(BookingError::store)?;

        let now = Utc::now();
        if challenge.expires_at <= now || challenge.attempts >= self.config.max_attempts {
            return Err(BookingError::OtpExpiredOrInvalid);
        }

        if challenge.code != code {
            challenge.attempts += 1;
            self.put_challenge(&challenge).await?;
            return Err(BookingError::OtpExpiredOrInvalid);
        }

        self.store.remove(&key).await.map_err(BookingError::store)?;
        let verified_ttl = std::time::Duration::from_secs(30 * 60);
        self.store
            .put(&Self::verified_key(transaction_id), "1", verified_ttl)
            .await
            .map_err(BookingError::store)?;

        info!("Step-up verified for {}", transaction_id);
        Ok(())
    }

    pub async fn is_verified(&self, transaction_id: &str) -> BookingResult<bool> {
        Ok(self
            .store
            .get(&Self::verified_key(transaction_id))
            .await
            .map_err(BookingError::store)?
            .is_some())
    }
}
