pub mod context;
pub mod error;
pub mod guardrail;
pub mod invoke;
pub mod principal;
pub mod project;
pub mod types;

pub use context::RequestContext;
pub use error::{BrokerError, ErrorCategory};
pub use guardrail::{ContentType, GuardrailSpec, RuleAction, RuleCategory, RuleSeverity};
pub use invoke::{ChatMessage, InvokePayload, InvokeRequest, InvokeResponse, Operation, ReasonCode, Usage};
pub use principal::Principal;
pub use project::{ProjectRecord, ProjectStatus};
pub use types::{ModelId, ProjectId, RequestId, RuleId};
