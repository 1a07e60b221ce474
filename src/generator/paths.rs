use std::path::{Path, PathBuf};

use crate::diagram::ImageFormat;
use crate::render::RenderJob;

/// Where per-diagram input and output files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPaths {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub puppeteer_config: Option<PathBuf>,
}

impl RenderPaths {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            puppeteer_config: None,
        }
    }

    pub fn with_puppeteer_config(mut self, config: Option<PathBuf>) -> Self {
        self.puppeteer_config = config;
        self
    }

    pub fn input_path(&self, identity: &str) -> PathBuf {
        self.input_dir.join(format!("{}.mmd", identity))
    }

    pub fn output_path(&self, identity: &str, format: ImageFormat) -> PathBuf {
        self.output_dir.join(format!("{}.{}", identity, format))
    }

    pub fn job(&self, identity: &str, format: ImageFormat) -> RenderJob {
        RenderJob {
            input: self.input_path(identity),
            output: self.output_path(identity, format),
            config: self.puppeteer_config.clone(),
        }
    }

    pub fn puppeteer_config(&self) -> Option<&Path> {
        self.puppeteer_config.as_deref()
    }
}
