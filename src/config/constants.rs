pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 80;

pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_MAX_IDLE_SECS: u64 = 60 * 60;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
