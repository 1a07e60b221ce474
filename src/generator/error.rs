use thiserror::Error;

use crate::cache::CacheError;
use crate::diagram::DiagramError;
use crate::render::RenderError;

/// Failures of [`Generator::generate`](super::Generator::generate), tagged by stage.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("cannot compute diagram identity: {0}")]
    Identity(#[from] DiagramError),

    #[error("cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    /// True when the request content itself is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GenerateError::Identity(_) | GenerateError::Cache(CacheError::Identity(_))
        )
    }
}
