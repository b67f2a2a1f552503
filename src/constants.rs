/// Defaults shared by configuration, the HTTP layer and the CLI.
pub const SERVICE_NAME: &str = "curbside";
pub const DEFAULT_CONFIG_FILE: &str = "curbside.toml";
pub const DEFAULT_PORT: u16 = 8080;

// Spatial index
pub const DEFAULT_INDEX_PRECISION: usize = 7;
pub const DEFAULT_MAX_COVER_CELLS: usize = 36;

// Discovery
pub const MAX_RADIUS_M: f64 = 50_000.0;
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

// Lifecycle
pub const DEFAULT_TTL_DAYS: i64 = 7;
pub const MAX_TTL_DAYS: i64 = 3650;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 500;
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// Client-side location monitor
pub const DEFAULT_REFRESH_FRACTION: f64 = 0.10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_RETRIES: u32 = 2;

/// Header carrying the caller identity resolved by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";
