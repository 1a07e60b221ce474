use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub renders: u64,
    pub render_failures: u64,
    pub evictions: u64,
}
