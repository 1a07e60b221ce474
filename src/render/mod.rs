//! The external renderer seam.
//!
//! The generator only ever talks to a [`Renderer`]; production code plugs in
//! [`MermaidCli`], tests plug in doubles that never spawn anything.

pub mod mermaid;
pub use mermaid::MermaidCli;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

/// Files involved in a single render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
}

/// Diagnostics captured from a successful render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("renderer executable does not exist: {0}")]
    RendererMissing(PathBuf),

    #[error("renderer exited with {status}: {stdout}: {stderr}")]
    Failed {
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Reads `job.input` and writes the image to `job.output`.
    async fn render(&self, job: &RenderJob) -> Result<RenderOutput, RenderError>;
}
