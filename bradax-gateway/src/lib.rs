pub mod builder;
pub mod error;
pub mod metrics;
pub mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use error::GatewayError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use orchestrator::Orchestrator;
