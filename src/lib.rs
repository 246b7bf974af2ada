pub mod config;
pub mod error;
pub mod lineage;
pub mod types;

pub use error::{LineageError, Result};
