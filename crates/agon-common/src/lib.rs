//! Common types and errors shared by Agon services.

pub mod error;
pub mod types;

pub use error::{AppError, AppResult};
pub use types::*;
