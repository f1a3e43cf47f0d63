//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::analysis::Quantization;
use crate::detect::DetectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sampling loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-entity bound on sample acquisition
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_ms: u64,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How long a departed entity's state is kept
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

fn default_interval() -> u64 {
    10
}

fn default_sample_timeout() -> u64 {
    2000
}

fn default_max_workers() -> usize {
    4
}

fn default_grace_period() -> u64 {
    60
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            sample_timeout_ms: default_sample_timeout(),
            max_workers: default_max_workers(),
            grace_period_secs: default_grace_period(),
        }
    }
}

/// History store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Baseline samples needed before z-scores are trusted
    #[serde(default = "default_min_baseline")]
    pub min_baseline_samples: u64,
}

fn default_capacity() -> usize {
    200
}

fn default_min_baseline() -> u64 {
    5
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            min_baseline_samples: default_min_baseline(),
        }
    }
}

/// Fingerprint engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintConfig {
    /// New samples between fingerprint generations
    #[serde(default = "default_update_frequency")]
    pub update_frequency: usize,

    #[serde(default = "default_rss_buckets")]
    pub rss_buckets_per_octave: u32,

    #[serde(default = "default_variability_buckets")]
    pub variability_buckets: u32,

    #[serde(default = "default_growth_width")]
    pub growth_bucket_width: f64,

    #[serde(default = "default_complexity_buckets")]
    pub complexity_buckets: u32,
}

fn default_update_frequency() -> usize {
    10
}

fn default_rss_buckets() -> u32 {
    2
}

fn default_variability_buckets() -> u32 {
    10
}

fn default_growth_width() -> f64 {
    0.01
}

fn default_complexity_buckets() -> u32 {
    5
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            update_frequency: default_update_frequency(),
            rss_buckets_per_octave: default_rss_buckets(),
            variability_buckets: default_variability_buckets(),
            growth_bucket_width: default_growth_width(),
            complexity_buckets: default_complexity_buckets(),
        }
    }
}

/// Outlier scorer used by the pattern-drift path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    IsolationForest,
    Statistical,
    /// Disable pattern-drift detection
    None,
}

impl std::str::FromStr for ScorerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolation_forest" => Ok(ScorerKind::IsolationForest),
            "statistical" => Ok(ScorerKind::Statistical),
            "none" => Ok(ScorerKind::None),
            other => Err(format!("unknown scorer: {}", other)),
        }
    }
}

/// Anomaly detector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,

    /// Fitted growth across one history window that counts toward a leak
    #[serde(default = "default_leak_threshold")]
    pub leak_growth_threshold: f64,

    #[serde(default = "default_leak_high")]
    pub leak_high_threshold: f64,

    #[serde(default = "default_leak_generations")]
    pub leak_generations: u32,

    #[serde(default = "default_contamination")]
    pub contamination_rate: f64,

    #[serde(default = "default_min_fingerprints")]
    pub min_fingerprints: usize,

    #[serde(default = "default_scorer")]
    pub scorer: ScorerKind,

    #[serde(default = "default_forest_trees")]
    pub forest_trees: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_z_threshold() -> f64 {
    2.0
}

fn default_leak_threshold() -> f64 {
    0.05
}

fn default_leak_high() -> f64 {
    0.10
}

fn default_leak_generations() -> u32 {
    2
}

fn default_contamination() -> f64 {
    0.1
}

fn default_min_fingerprints() -> usize {
    10
}

fn default_scorer() -> ScorerKind {
    ScorerKind::IsolationForest
}

fn default_forest_trees() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            z_threshold: default_z_threshold(),
            leak_growth_threshold: default_leak_threshold(),
            leak_high_threshold: default_leak_high(),
            leak_generations: default_leak_generations(),
            contamination_rate: default_contamination(),
            min_fingerprints: default_min_fingerprints(),
            scorer: default_scorer(),
            forest_trees: default_forest_trees(),
            seed: default_seed(),
        }
    }
}

/// Alert aggregator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,

    /// Unset means one sampling interval
    pub debounce_window_secs: Option<u64>,
}

fn default_retention_cap() -> usize {
    200
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
            debounce_window_secs: None,
        }
    }
}

/// Trend projection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_horizon_days")]
    pub horizon_cap_days: u64,

    /// Share of total memory projections aim at
    #[serde(default = "default_threshold_fraction")]
    pub threshold_fraction: f64,
}

const SECS_PER_DAY: u64 = 24 * 3600;

/// Longest projection horizon accepted, a century
pub const MAX_HORIZON_DAYS: u64 = 36_500;

fn default_horizon_days() -> u64 {
    90
}

fn default_threshold_fraction() -> f64 {
    0.9
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            horizon_cap_days: default_horizon_days(),
            threshold_fraction: default_threshold_fraction(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("memdna").join("config.toml")),
            Some(PathBuf::from("/etc/memdna/config.toml")),
            Some(PathBuf::from("./memdna.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
        }

        // Sampling overrides
        if let Some(v) = parsed("MEMDNA_INTERVAL_SECS") {
            self.sampling.interval_secs = v;
        }
        if let Some(v) = parsed("MEMDNA_SAMPLE_TIMEOUT_MS") {
            self.sampling.sample_timeout_ms = v;
        }
        if let Some(v) = parsed("MEMDNA_MAX_WORKERS") {
            self.sampling.max_workers = v;
        }

        // History / fingerprint overrides
        if let Some(v) = parsed("MEMDNA_HISTORY_CAPACITY") {
            self.history.capacity = v;
        }
        if let Some(v) = parsed("MEMDNA_UPDATE_FREQUENCY") {
            self.fingerprint.update_frequency = v;
        }

        // Detection overrides
        if let Some(v) = parsed("MEMDNA_Z_THRESHOLD") {
            self.detection.z_threshold = v;
        }
        if let Some(v) = parsed("MEMDNA_LEAK_THRESHOLD") {
            self.detection.leak_growth_threshold = v;
        }
        if let Some(v) = parsed("MEMDNA_CONTAMINATION") {
            self.detection.contamination_rate = v;
        }
        if let Some(v) = parsed("MEMDNA_SCORER") {
            self.detection.scorer = v;
        }

        // Alert / projection overrides
        if let Some(v) = parsed("MEMDNA_RETENTION_CAP") {
            self.alerts.retention_cap = v;
        }
        if let Some(v) = parsed("MEMDNA_DEBOUNCE_SECS") {
            self.alerts.debounce_window_secs = Some(v);
        }
        if let Some(v) = parsed("MEMDNA_HORIZON_DAYS") {
            self.projection.horizon_cap_days = v;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("MEMDNA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("MEMDNA_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |msg: &str| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg.to_string())) };

        if self.sampling.interval_secs == 0 {
            return invalid("sampling.interval_secs must be at least 1");
        }
        if self.sampling.sample_timeout_ms == 0 {
            return invalid("sampling.sample_timeout_ms must be at least 1");
        }
        if self.history.capacity < 2 {
            return invalid("history.capacity must be at least 2");
        }
        if self.fingerprint.update_frequency == 0 {
            return invalid("fingerprint.update_frequency must be at least 1");
        }
        if !(self.fingerprint.growth_bucket_width > 0.0) {
            return invalid("fingerprint.growth_bucket_width must be positive");
        }
        if !(self.detection.z_threshold > 0.0) {
            return invalid("detection.z_threshold must be positive");
        }
        if self.detection.leak_high_threshold < self.detection.leak_growth_threshold {
            return invalid("detection.leak_high_threshold must not be below leak_growth_threshold");
        }
        if !(self.detection.contamination_rate > 0.0 && self.detection.contamination_rate <= 0.5) {
            return invalid("detection.contamination_rate must be in (0, 0.5]");
        }
        if self.alerts.retention_cap == 0 {
            return invalid("alerts.retention_cap must be at least 1");
        }
        if self.projection.horizon_cap_days > MAX_HORIZON_DAYS {
            return invalid("projection.horizon_cap_days must be at most 36500");
        }
        if !(self.projection.threshold_fraction > 0.0 && self.projection.threshold_fraction <= 1.0) {
            return invalid("projection.threshold_fraction must be in (0, 1]");
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling.interval_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        self.alerts
            .debounce_window_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.sampling_interval())
    }

    pub fn horizon_cap(&self) -> Duration {
        Duration::from_secs(self.projection.horizon_cap_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn quantization(&self) -> Quantization {
        Quantization {
            rss_buckets_per_octave: self.fingerprint.rss_buckets_per_octave,
            variability_buckets: self.fingerprint.variability_buckets,
            growth_bucket_width: self.fingerprint.growth_bucket_width,
            complexity_buckets: self.fingerprint.complexity_buckets,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            z_threshold: self.detection.z_threshold,
            min_baseline_samples: self.history.min_baseline_samples,
            leak_growth_threshold: self.detection.leak_growth_threshold,
            leak_high_threshold: self.detection.leak_high_threshold,
            leak_generations: self.detection.leak_generations,
            contamination_rate: self.detection.contamination_rate,
            min_fingerprints: self.detection.min_fingerprints,
            threshold_fraction: self.projection.threshold_fraction,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# memdna Configuration
#
# Environment variables override these settings:
# - MEMDNA_INTERVAL_SECS
# - MEMDNA_SAMPLE_TIMEOUT_MS
# - MEMDNA_MAX_WORKERS
# - MEMDNA_HISTORY_CAPACITY
# - MEMDNA_UPDATE_FREQUENCY
# - MEMDNA_Z_THRESHOLD
# - MEMDNA_LEAK_THRESHOLD
# - MEMDNA_CONTAMINATION
# - MEMDNA_SCORER
# - MEMDNA_RETENTION_CAP
# - MEMDNA_DEBOUNCE_SECS
# - MEMDNA_HORIZON_DAYS
# - MEMDNA_LOG_LEVEL
# - MEMDNA_LOG_FORMAT

[sampling]
# Seconds between sampling ticks
interval_secs = 10

# Per-entity sample timeout (ms); slower entities are skipped this tick
sample_timeout_ms = 2000

# Entities sampled concurrently
max_workers = 4

# Seconds a departed process's state is kept
grace_period_secs = 60

[history]
# Samples kept per entity
capacity = 200

# Samples needed before z-score detection starts
min_baseline_samples = 5

[fingerprint]
# New samples between fingerprint generations
update_frequency = 10

# Quantization before hashing
rss_buckets_per_octave = 2
variability_buckets = 10
growth_bucket_width = 0.01
complexity_buckets = 5

[detection]
# |z| above this is anomalous (>= 3 is HIGH)
z_threshold = 2.0

# Fitted growth across one history window that counts toward a leak, and the HIGH band
leak_growth_threshold = 0.05
leak_high_threshold = 0.10

# Consecutive fingerprint generations above threshold
leak_generations = 2

# Pattern drift: isolation_forest, statistical or none
scorer = "isolation_forest"
contamination_rate = 0.1
min_fingerprints = 10
forest_trees = 100
seed = 42

[alerts]
# Records kept
retention_cap = 200

# Duplicate window (seconds); defaults to one sampling interval
# debounce_window_secs = 10

[projection]
# Projections beyond this are reported as none
horizon_cap_days = 90

# Share of total memory to project toward
threshold_fraction = 0.9

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
