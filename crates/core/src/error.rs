use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddressError),
}

/// A prefix string that could not be turned into an address range.
///
/// Callers treat this as a per-element skip, never as a fatal error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid address prefix '{input}': {reason}")]
pub struct InvalidAddressError {
    pub input: String,
    pub reason: &'static str,
}

impl InvalidAddressError {
    pub fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Why a single record element was skipped during transcoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddressError),

    #[error("empty AS path")]
    EmptyPath,

    #[error("unparseable AS path hop '{0}'")]
    InvalidHop(String),
}
