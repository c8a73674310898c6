pub mod atomic;
pub mod catalog;
pub mod error;
pub mod projects;

pub use atomic::write_atomic;
pub use catalog::{ModelCatalog, ModelEntry};
pub use error::StoreError;
pub use projects::ProjectStore;
