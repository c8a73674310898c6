pub mod aggregate;
pub mod error;
pub mod event;
pub mod writer;

pub use aggregate::ProjectUsage;
pub use error::TelemetryError;
pub use event::{
    GuardrailEvent, InteractionStage, Stage, StageOutcome, TelemetryEvent, TelemetryKind,
};
pub use writer::TelemetryWriter;
