use std::fmt::{self, Display};

/// Errors produced by model constructors and parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidResolution(String),
    UnknownBodyPart(usize),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidResolution(raw) => {
                write!(f, "invalid resolution '{raw}', expected WIDTHxHEIGHT")
            }
            ModelError::UnknownBodyPart(index) => {
                write!(f, "unknown body part index {index}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
