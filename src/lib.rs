//! Score records, batch upsert and grading for the gradebook sidecar.

pub mod backup;
pub mod calc;
pub mod config;
pub mod error;
pub mod ipc;
pub mod policy;
pub mod record;
pub mod store;
pub mod upsert;

pub use error::{GradebookError, Result};
