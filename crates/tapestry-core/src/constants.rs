/// Sliding window for temporal surge detection (milliseconds)
pub const WINDOW_MS: u64 = 500;

/// Events allowed inside one window before a surge is raised
pub const SURGE_THRESHOLD: usize = 5;

/// Share of known-region threads one region may hold before congestion
pub const CONGESTION_RATIO: f64 = 0.5;

/// Raw per-region count that raises congestion regardless of share
pub const CONGESTION_COUNT: usize = 25;

/// Known-region threads needed before the share test applies
pub const CONGESTION_MIN_SAMPLE: usize = 3;

/// Balance score (0-100) below which intentions count as polarized
pub const POLARIZATION_FLOOR: u8 = 25;

/// Known-intention threads needed before polarization is judged
pub const POLARIZATION_MIN_SAMPLE: usize = 5;

/// Highest DEFCON level (calm)
pub const DEFCON_MAX: u8 = 5;

/// Lowest DEFCON level (critical)
pub const DEFCON_MIN: u8 = 1;

/// Valkyrie acts only at or below this DEFCON level by default
pub const POLICY_THRESHOLD: u8 = 3;

/// Lower bound on inverse document frequency.
/// Terms present in every document keep a small positive weight.
pub const IDF_FLOOR: f64 = 0.1;

/// Hash chain anchor for the first thread
pub const GENESIS_HASH: &str = "GENESIS_HASH";

/// Hex characters of the chain hash used as the short thread id
pub const ID_LEN: usize = 12;

/// Scroll import limits
pub const SCROLL_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const SCROLL_MAX_THREADS: usize = 1000;
pub const MAX_ID_LEN: usize = 32;
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_REGION_LEN: usize = 50;
