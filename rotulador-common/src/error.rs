//! Errors raised while loading a project or touching its database

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Project file is not valid YAML or has fields of the wrong shape
    #[error("Project file syntax error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Project file parsed but violates a pipeline rule
    #[error("Invalid project: {0}")]
    Config(String),

    /// Unknown task id, image hash or database file
    #[error("Not found: {0}")]
    NotFound(String),
}
