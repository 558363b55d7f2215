//! Error types for ipinformer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InformerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate list short name '{0}' (report columns must be unique)")]
    DuplicateShortName(String),

    #[error("Input feed error: {0}")]
    Input(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Reputation lookup error: {0}")]
    Reputation(String),
}
