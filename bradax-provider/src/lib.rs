pub mod adapter;
pub mod error;
pub mod http;

pub use adapter::{Completion, InvokeParams, ProviderAdapter};
pub use error::ProviderError;
pub use http::ChatHttpProvider;
