use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub booking_rules: BookingRules,
}

/// Operational knobs for the booking/payment core. Everything here is
/// configuration, not code.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_saga_retries")]
    pub saga_max_retries: u32,
    #[serde(default = "default_saga_deadline")]
    pub saga_deadline_minutes: i64,
    #[serde(default = "default_otp_expiry")]
    pub otp_expiry_minutes: i64,
    #[serde(default = "default_otp_attempts")]
    pub otp_max_attempts: u32,
    #[serde(default = "default_otp_currency")]
    pub otp_threshold_currency: String,
    #[serde(default = "default_otp_threshold")]
    pub otp_threshold_amount: i64,
    #[serde(default = "default_otp_bands")]
    pub otp_priority_bands: Vec<OtpBand>,
}

/// Payments strictly above `min_amount` get this delivery priority.
#[derive(Debug, Deserialize, Clone)]
pub struct OtpBand {
    pub min_amount: i64,
    pub priority: u8,
}

fn default_hold_minutes() -> i64 {
    15
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_saga_retries() -> u32 {
    3
}
fn default_saga_deadline() -> i64 {
    30
}
fn default_otp_expiry() -> i64 {
    5
}
fn default_otp_attempts() -> u32 {
    3
}
fn default_otp_currency() -> String {
    "VND".to_string()
}
fn default_otp_threshold() -> i64 {
    5_000_000
}
fn default_otp_bands() -> Vec<OtpBand> {
    vec![
        OtpBand { min_amount: 50_000_000, priority: 10 },
        OtpBand { min_amount: 20_000_000, priority: 8 },
        OtpBand { min_amount: 10_000_000, priority: 6 },
        OtpBand { min_amount: 5_000_000, priority: 4 },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SKYFARE__BOOKING_RULES__HOLD_MINUTES=20`
            .add_source(config::Environment::with_prefix("SKYFARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
