use thiserror::Error;

use crate::declarations::DeclarationError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("Pass {pass} failed: {message}")]
    Pipeline { pass: String, message: String },

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
