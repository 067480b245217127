pub mod config;
pub mod error;
pub mod fp;

pub use error::{AppError, Result};
