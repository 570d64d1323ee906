//! # TaskWarden Core
//! Shared error taxonomy and configuration for the assignment engine and its binary.

pub mod config;
pub mod error;

pub use config::TaskWardenConfig;
pub use error::{Result, TaskWardenError};
