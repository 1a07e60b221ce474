pub mod config;
pub use config::CleanupConfig;

pub mod metrics;
pub use metrics::CacheMetrics;

pub mod stats;
pub use stats::CacheStats;

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::diagram::{Diagram, DiagramError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cannot compute diagram identity: {0}")]
    Identity(#[from] DiagramError),
}

/// Keyed store of rendered diagrams.
///
/// Every operation is keyed by [`Diagram::identity`]. A missing entry is a
/// normal negative answer, never an error.
pub trait DiagramCache: Send + Sync {
    /// Inserts or overwrites the entry for this diagram. Last write wins.
    fn store(&self, diagram: Diagram) -> Result<(), CacheError>;

    /// Returns true if an entry exists. Does not touch it.
    fn has(&self, diagram: &Diagram) -> Result<bool, CacheError>;

    /// Returns a snapshot of the stored entry, with its own recency. Does not touch it.
    fn get(&self, diagram: &Diagram) -> Result<Option<Diagram>, CacheError>;

    /// Removes the entry if present.
    fn delete(&self, diagram: &Diagram) -> Result<(), CacheError>;

    /// Snapshot of every stored entry. Concurrent changes may or may not show up.
    fn get_all(&self) -> Vec<Diagram>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`DiagramCache`]: one map behind a read-write lock.
#[derive(Debug, Default)]
pub struct InMemoryDiagramCache {
    entries: RwLock<HashMap<String, Diagram>>,
}

impl InMemoryDiagramCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagramCache for InMemoryDiagramCache {
    fn store(&self, diagram: Diagram) -> Result<(), CacheError> {
        let id = diagram.identity()?.to_string();
        self.entries.write().insert(id, diagram);
        Ok(())
    }

    fn has(&self, diagram: &Diagram) -> Result<bool, CacheError> {
        let id = diagram.identity()?;
        Ok(self.entries.read().contains_key(id))
    }

    fn get(&self, diagram: &Diagram) -> Result<Option<Diagram>, CacheError> {
        let id = diagram.identity()?;
        Ok(self.entries.read().get(id).cloned())
    }

    fn delete(&self, diagram: &Diagram) -> Result<(), CacheError> {
        let id = diagram.identity()?;
        if self.entries.write().remove(id).is_some() {
            tracing::trace!(identity = %id, "Removed diagram from cache");
        }
        Ok(())
    }

    fn get_all(&self) -> Vec<Diagram> {
        self.entries.read().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::diagram::ImageFormat;

    fn rendered(description: &str, format: ImageFormat) -> Diagram {
        let mut diagram = Diagram::new(description, format);
        let id = diagram.identity().unwrap().to_string();
        diagram.set_output(PathBuf::from(format!("/out/{}.{}", id, format)));
        diagram
    }

    #[test]
    fn store_then_get_round_trips() {
        let cache = InMemoryDiagramCache::new();
        let diagram = rendered("graph TB; A-->B", ImageFormat::Svg);
        cache.store(diagram.clone()).unwrap();

        let lookup = Diagram::new("graph TB; A-->B", ImageFormat::Svg);
        assert!(cache.has(&lookup).unwrap());

        let cached = cache.get(&lookup).unwrap().unwrap();
        assert_eq!(cached.description(), diagram.description());
        assert_eq!(cached.format(), diagram.format());
        assert_eq!(cached.output(), diagram.output());
    }

    #[test]
    fn miss_is_not_an_error() {
        let cache = InMemoryDiagramCache::new();
        let lookup = Diagram::new("graph TB; A-->B", ImageFormat::Svg);

        assert!(!cache.has(&lookup).unwrap());
        assert!(cache.get(&lookup).unwrap().is_none());
        cache.delete(&lookup).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn formats_are_separate_entries() {
        let cache = InMemoryDiagramCache::new();
        cache.store(rendered("graph TB; A-->B", ImageFormat::Svg)).unwrap();

        let png = Diagram::new("graph TB; A-->B", ImageFormat::Png);
        assert!(!cache.has(&png).unwrap());

        cache.store(rendered("graph TB; A-->B", ImageFormat::Png)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn store_overwrites_existing_entry() {
        let cache = InMemoryDiagramCache::new();
        cache.store(rendered("graph TB; A-->B", ImageFormat::Svg)).unwrap();

        let mut replacement = Diagram::new("graph TB; A-->B", ImageFormat::Svg);
        replacement.set_output(PathBuf::from("/elsewhere/x.svg"));
        cache.store(replacement).unwrap();

        let cached = cache
            .get(&Diagram::new("graph TB; A-->B", ImageFormat::Svg))
            .unwrap()
            .unwrap();
        assert_eq!(cached.output(), Some(PathBuf::from("/elsewhere/x.svg").as_path()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_removes_entry() {
        let cache = InMemoryDiagramCache::new();
        let diagram = rendered("graph TB; A-->B", ImageFormat::Svg);
        cache.store(diagram.clone()).unwrap();

        cache.delete(&diagram).unwrap();
        assert!(!cache.has(&diagram).unwrap());
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn empty_description_fails_every_keyed_operation() {
        let cache = InMemoryDiagramCache::new();
        let empty = Diagram::new("  ", ImageFormat::Svg);

        let expected = CacheError::Identity(DiagramError::EmptyDescription);
        assert_eq!(cache.has(&empty).unwrap_err(), expected);
        assert_eq!(cache.get(&empty).unwrap_err(), expected);
        assert_eq!(cache.delete(&empty).unwrap_err(), expected);
        assert_eq!(cache.store(empty).unwrap_err(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn get_does_not_touch_stored_entry() {
        let cache = InMemoryDiagramCache::new();
        let diagram = rendered("graph TB; A-->B", ImageFormat::Svg);
        let stored_at = diagram.last_touched();
        cache.store(diagram).unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;

        let lookup = Diagram::new("graph TB; A-->B", ImageFormat::Svg);
        let fetched = cache.get(&lookup).unwrap().unwrap();
        fetched.touch();

        let again = cache.get(&lookup).unwrap().unwrap();
        assert_eq!(again.last_touched(), stored_at);
    }

    #[test]
    fn get_all_returns_every_entry() {
        let cache = InMemoryDiagramCache::new();
        cache.store(rendered("graph TB; A-->B", ImageFormat::Svg)).unwrap();
        cache.store(rendered("graph TB; B-->C", ImageFormat::Svg)).unwrap();
        cache.store(rendered("graph TB; C-->D", ImageFormat::Png)).unwrap();

        let mut descriptions: Vec<String> = cache
            .get_all()
            .iter()
            .map(|d| d.description().to_string())
            .collect();
        descriptions.sort();

        assert_eq!(
            descriptions,
            vec!["graph TB; A-->B", "graph TB; B-->C", "graph TB; C-->D"]
        );
    }
}
