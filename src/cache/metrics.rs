use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub renders: AtomicU64,
    pub render_failures: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render(&self, success: bool) {
        if success {
            self.renders.fetch_add(1, Ordering::Relaxed);
        } else {
            self.render_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;

        if hits + misses == 0.0 {
            return 0.0;
        }

        hits / (hits + misses)
    }
}
