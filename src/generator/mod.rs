//! Render-or-reuse orchestration and idle eviction.
//!
//! [`Generator::generate`] is the only way request handling reaches the cache
//! or the renderer. Per request:
//!
//! 1. compute the identity (content errors stop here),
//! 2. take the identity's in-flight slot,
//! 3. on a cache hit, restore the cached diagram, touch it and store it back so
//!    the sweep sees the new recency,
//! 4. on a miss, touch, write the input file, run the renderer, store the result.
//!
//! [`Generator::clean_up`] walks the cache and evicts entries idle for longer
//! than the given threshold. It takes the same slots, so an entry is never
//! evicted while a request is restoring or rendering it.

mod error;
mod in_flight;
mod paths;

pub use error::GenerateError;
pub use in_flight::{InFlight, SlotGuard};
pub use paths::RenderPaths;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{CacheMetrics, CacheStats, DiagramCache};
use crate::diagram::Diagram;
use crate::render::Renderer;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub evicted: usize,
    /// Idle entries left alone because a request held them.
    pub busy: usize,
    pub failures: Vec<SweepFailure>,
}

/// An idle entry whose files could not be removed. It stays cached and is
/// retried by the next sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub identity: String,
    pub message: String,
}

pub struct Generator {
    cache: Arc<dyn DiagramCache>,
    renderer: Arc<dyn Renderer>,
    paths: RenderPaths,
    in_flight: InFlight,
    metrics: CacheMetrics,
}

impl Generator {
    pub fn new(
        cache: Arc<dyn DiagramCache>,
        renderer: Arc<dyn Renderer>,
        paths: RenderPaths,
    ) -> Self {
        Self {
            cache,
            renderer,
            paths,
            in_flight: InFlight::new(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn paths(&self) -> &RenderPaths {
        &self.paths
    }

    /// Turns `diagram` into the authoritative, rendered version of itself.
    ///
    /// On success `diagram.output()` points at the rendered file.
    pub async fn generate(&self, diagram: &mut Diagram) -> Result<(), GenerateError> {
        let identity = diagram.identity()?.to_string();
        let _slot = self.in_flight.acquire(&identity).await;

        if self.restore_cached(diagram)? {
            self.metrics.record_hit();
            debug!(identity = %identity, "Cache hit");
            return Ok(());
        }

        self.metrics.record_miss();
        debug!(identity = %identity, "Cache miss, rendering");

        // Touched before rendering so a slow render is not already stale when stored.
        diagram.touch();

        let result = self.render(diagram, &identity).await;
        self.metrics.record_render(result.is_ok());
        result?;

        self.cache.store(diagram.clone())?;
        Ok(())
    }

    /// Overlays the cached entry onto `diagram`, refreshes its recency and
    /// writes it back. Returns false on a miss.
    fn restore_cached(&self, diagram: &mut Diagram) -> Result<bool, GenerateError> {
        if !self.cache.has(diagram)? {
            return Ok(false);
        }
        let Some(cached) = self.cache.get(diagram)? else {
            return Ok(false);
        };

        *diagram = cached;
        diagram.touch();
        self.cache.store(diagram.clone())?;
        Ok(true)
    }

    async fn render(&self, diagram: &mut Diagram, identity: &str) -> Result<(), GenerateError> {
        let job = self.paths.job(identity, diagram.format());
        // Removes the files again unless the render completes, including when
        // this future is dropped mid-render.
        let scratch = ScratchFiles::new(&job.input, &job.output);

        tokio::fs::write(&job.input, diagram.description())
            .await
            .map_err(|source| GenerateError::Io {
                context: format!("could not write to input file [{}]", job.input.display()),
                source,
            })?;

        let output = self.renderer.render(&job).await?;
        info!(
            identity = %identity,
            output = %job.output.display(),
            "Generated diagram"
        );
        if !output.stdout.is_empty() || !output.stderr.is_empty() {
            debug!(stdout = %output.stdout, stderr = %output.stderr, "Renderer output");
        }

        scratch.keep();
        diagram.set_output(job.output);
        Ok(())
    }

    /// Evicts every cached diagram not touched within `max_idle`: its input
    /// file, its output file and its cache entry.
    ///
    /// Best effort: an entry whose files cannot be removed is reported in
    /// [`SweepReport::failures`], kept in the cache and the sweep moves on.
    pub async fn clean_up(&self, max_idle: Duration) -> Result<SweepReport, GenerateError> {
        let mut report = SweepReport::default();

        for diagram in self.cache.get_all() {
            report.examined += 1;
            if diagram.touched_in_duration(max_idle) {
                continue;
            }

            let identity = diagram.identity()?.to_string();
            let Some(_slot) = self.in_flight.try_acquire(&identity) else {
                debug!(identity = %identity, "Idle diagram is in use, skipping");
                report.busy += 1;
                continue;
            };

            // Re-read under the slot: a hit may have landed since the snapshot.
            match self.cache.get(&diagram)? {
                Some(current) if !current.touched_in_duration(max_idle) => {}
                _ => continue,
            }

            match self.remove_files(&diagram, &identity).await {
                Ok(()) => {
                    self.cache.delete(&diagram)?;
                    report.evicted += 1;
                    debug!(identity = %identity, "Evicted idle diagram");
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Could not remove diagram files");
                    report.failures.push(SweepFailure {
                        identity,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.metrics.record_evictions(report.evicted);
        if report.evicted > 0 || !report.failures.is_empty() {
            info!(
                examined = report.examined,
                evicted = report.evicted,
                busy = report.busy,
                failed = report.failures.len(),
                "Cleanup sweep finished"
            );
        }

        Ok(report)
    }

    async fn remove_files(&self, diagram: &Diagram, identity: &str) -> Result<(), GenerateError> {
        remove_file_if_exists(&self.paths.input_path(identity)).await?;

        let output = diagram
            .output()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.output_path(identity, diagram.format()));
        remove_file_if_exists(&output).await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            hit_rate: self.metrics.hit_rate(),
            renders: self.metrics.renders.load(Ordering::Relaxed),
            render_failures: self.metrics.render_failures.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
        }
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<(), GenerateError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GenerateError::Io {
            context: format!("could not remove [{}]", path.display()),
            source,
        }),
    }
}

/// Input and output files of a render that has not completed yet. Dropping
/// it without calling [`ScratchFiles::keep`] deletes both.
struct ScratchFiles<'a> {
    files: Option<[&'a Path; 2]>,
}

impl<'a> ScratchFiles<'a> {
    fn new(input: &'a Path, output: &'a Path) -> Self {
        Self {
            files: Some([input, output]),
        }
    }

    fn keep(mut self) {
        self.files = None;
    }
}

impl Drop for ScratchFiles<'_> {
    fn drop(&mut self) {
        let Some(files) = self.files.take() else {
            return;
        };
        for path in files {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed leftover render file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not remove leftover render file"
                ),
            }
        }
    }
}
