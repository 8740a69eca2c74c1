//! # Rotulador Common Library
//!
//! Shared code for the rotulador annotation server and its CLI tools:
//! - Project configuration (YAML task pipeline, users)
//! - Database initialization, migrations and repositories
//! - Content hashing of image files
//! - Next-image selection and progress statistics

pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod pipeline;

pub use config::ProjectConfig;
pub use error::{Error, Result};
