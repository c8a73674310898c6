pub mod engine;
pub mod error;
pub mod rule;
pub mod store;

pub use engine::{EvaluationMetadata, GuardrailEngine, GuardrailResult};
pub use error::GuardrailError;
pub use rule::{CompiledRule, RuleSet, RuleTrigger};
pub use store::RuleStore;
