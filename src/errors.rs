use std::path::PathBuf;

use crate::models::VenueCategory;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("No category profile for '{0}'")]
    UnknownCategory(VenueCategory),

    #[error("Forecast requested with an empty training set")]
    EmptyTrainingSet,

    #[error("Cache file {path:?} is unreadable: {message}")]
    CacheCorruption { path: PathBuf, message: String },

    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Cache encoding error: {0}")]
    CacheEncode(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
