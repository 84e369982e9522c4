use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pin assignment for {name}: {reason}")]
    InvalidPin { name: String, reason: String },

    #[error("Invalid tag id: {0}")]
    InvalidTagId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
