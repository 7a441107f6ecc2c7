//! Request and response models.

pub mod error;

pub use error::{ApiResult, ErrorResponse};
