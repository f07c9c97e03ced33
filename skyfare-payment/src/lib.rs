pub mod gateway;
pub mod orchestrator;
pub mod otp;

pub use gateway::MockGatewayAdapter;
pub use orchestrator::SagaOrchestrator;
pub use otp::{OtpConfig, OtpGate};
