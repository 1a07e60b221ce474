//! The diagram entity: content, requested format, content-derived identity and
//! usage recency.
//!
//! Recency lives behind its own lock so that touches from request handlers and
//! reads from the cleanup sweep never contend with the cache's map lock.

pub mod format;
pub use format::{ImageFormat, UnsupportedFormat};

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagramError {
    #[error("diagram description is empty")]
    EmptyDescription,
}

/// A single requested (or previously rendered) diagram.
#[derive(Debug)]
pub struct Diagram {
    identity: OnceLock<String>,
    description: String,
    format: ImageFormat,
    output: Option<PathBuf>,
    last_touched: RwLock<Instant>,
}

impl Diagram {
    pub fn new(description: impl AsRef<str>, format: ImageFormat) -> Self {
        Self {
            identity: OnceLock::new(),
            description: description.as_ref().trim().to_string(),
            format,
            output: None,
            last_touched: RwLock::new(Instant::now()),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Path of the rendered artifact, once a render has completed.
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub(crate) fn set_output(&mut self, output: PathBuf) {
        self.output = Some(output);
    }

    /// Replaces the description and forgets the cached identity.
    ///
    /// A rendering cached under the old identity is not touched; it simply stops
    /// being reachable through this value.
    pub fn replace_description(&mut self, description: impl AsRef<str>) {
        self.description = description.as_ref().trim().to_string();
        self.identity = OnceLock::new();
    }

    /// Content-derived identity, used as cache key and file stem.
    ///
    /// `hex(md5(base64(description)))` followed by the format tag.
    pub fn identity(&self) -> Result<&str, DiagramError> {
        if let Some(id) = self.identity.get() {
            return Ok(id);
        }
        if self.description.is_empty() {
            return Err(DiagramError::EmptyDescription);
        }

        let id = compute_identity(&self.description, self.format);
        Ok(self.identity.get_or_init(|| id))
    }

    /// Records a use at the current instant. Never moves recency backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut last = self.last_touched.write();
        if now > *last {
            *last = now;
        }
    }

    /// Returns true if the diagram was touched strictly within `window` of now.
    pub fn touched_in_duration(&self, window: Duration) -> bool {
        let last = *self.last_touched.read();
        match Instant::now().checked_sub(window) {
            Some(threshold) => threshold < last,
            None => true,
        }
    }

    pub fn last_touched(&self) -> Instant {
        *self.last_touched.read()
    }
}

impl Clone for Diagram {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            description: self.description.clone(),
            format: self.format,
            output: self.output.clone(),
            last_touched: RwLock::new(self.last_touched()),
        }
    }
}

fn compute_identity(description: &str, format: ImageFormat) -> String {
    let encoded = STANDARD.encode(description.as_bytes());
    let digest = Md5::digest(encoded.as_bytes());
    format!("{:x}{}", digest, format.as_str())
}
