//! # flowgate-config
//!
//! TOML-based configuration for a single flowgate port. Configuration can
//! be loaded from a file, overridden by environment variables, or built
//! from defaults for tests.
//!
//! # Configuration Sources (Priority Order)
//!
//! 1. **Environment variables**: `FLOWGATE_*` prefixed variables override all
//! 2. **Config file**: `flowgate.toml` in the current directory, or
//!    `~/.config/flowgate/flowgate.toml`
//! 3. **Defaults**: a single strict-priority queue at line rate
//!
//! # Example flowgate.toml
//!
//! ```toml
//! queue_num = 8
//! prio_queue_num = 2
//! discipline = "prio_wfq"
//! marking_scheme = "mq_ecn_generic"
//! link_capacity_bps = 10_000_000_000
//! port_thresh_bytes = 300_000
//! buffer_mode = "shared"
//! shared_buffer_bytes = 2_000_000
//!
//! [[queues]]
//! weight = 1.0
//!
//! [[queues]]
//! weight = 3.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading or validating a `PortConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("failed to parse environment variables: {0}")]
    Env(#[from] envy::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisciplineKind {
    Sp,
    Wrr,
    Wfq,
    PrioWrr,
    PrioWfq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingSchemeKind {
    PerQueue,
    PerPort,
    MqEcnGeneric,
    MqEcnRoundRobin,
    Latency,
    PieLike,
    /// Selects the CoDel dequeue-time marker in place of `Latency`/`PieLike`;
    /// equivalent to setting `codel_enabled = true` with no enqueue-time
    /// scheme of its own.
    CoDel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferModeKind {
    Shared,
    Static,
}

/// Per-queue weight/quantum/threshold overrides. Entries beyond the default
/// are applied by index; a port with more queues than entries here falls
/// back to `PortConfig`'s scalar defaults for the remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub weight: f64,
    pub quantum_bytes: u32,
    pub mark_thresh_bytes: u64,
    pub hard_cap_bytes: Option<u64>,
    pub static_buffer_bytes: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            weight: 1.0,
            quantum_bytes: 1500,
            mark_thresh_bytes: 100_000,
            hard_cap_bytes: None,
            static_buffer_bytes: 250_000,
        }
    }
}

/// The full configuration surface of a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub debug: bool,

    pub queue_num: usize,
    /// Size of the strict-priority tier for `prio_wrr`/`prio_wfq`; ignored
    /// by the single-tier disciplines.
    pub prio_queue_num: usize,
    pub discipline: DisciplineKind,

    pub marking_scheme: MarkingSchemeKind,
    pub port_thresh_bytes: u64,
    pub latency_thresh_ns: u64,

    pub codel_enabled: bool,
    pub codel_target_ns: u64,
    pub codel_interval_ns: u64,

    pub link_capacity_bps: u64,
    pub mean_pktsize_bytes: u32,

    pub buffer_mode: BufferModeKind,
    pub shared_buffer_bytes: u64,

    pub bucket_bytes: u32,
    pub bucket_ns: i64,

    pub dq_thresh_bytes: u64,
    pub drain_rate_beta: f64,

    pub estimate_quantum_alpha: f64,
    pub estimate_round_alpha: f64,
    pub estimate_weight_alpha: f64,
    /// Interval, in bytes-at-link-rate, between estimator samples.
    pub estimate_idle_interval_bytes: u64,
    /// When true, the weight/quantum-sum estimator is fed by a periodic
    /// timer task; when false, by data-path polling.
    pub estimate_weight_enable_timer: bool,
    pub estimate_timer_period_ns: u64,

    pub queues: Vec<QueueConfig>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            debug: false,
            queue_num: 1,
            prio_queue_num: 0,
            discipline: DisciplineKind::Sp,
            marking_scheme: MarkingSchemeKind::PerPort,
            port_thresh_bytes: 300_000,
            latency_thresh_ns: 5_000_000,
            codel_enabled: false,
            codel_target_ns: 5_000_000,
            codel_interval_ns: 100_000_000,
            link_capacity_bps: 10_000_000_000,
            mean_pktsize_bytes: 1500,
            buffer_mode: BufferModeKind::Shared,
            shared_buffer_bytes: 2_000_000,
            bucket_bytes: 50_000,
            bucket_ns: 0,
            dq_thresh_bytes: 10_000,
            drain_rate_beta: 0.875,
            estimate_quantum_alpha: 0.875,
            estimate_round_alpha: 0.875,
            estimate_weight_alpha: 0.875,
            estimate_idle_interval_bytes: 100_000,
            estimate_weight_enable_timer: false,
            estimate_timer_period_ns: 1_000_000,
            queues: Vec::new(),
        }
    }
}

impl PortConfig {
    /// Load with the usual priority: environment, then file, then defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file() {
            config = Self::load_from_file(&path)?;
        }

        config = Self::apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(format!("failed to serialize config: {e}")))?;
        fs::write(path, toml_string).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("flowgate.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("flowgate").join("flowgate.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// A handful of hot env-var overrides; full structural overrides belong
    /// in the TOML file.
    fn apply_env_overrides(mut config: Self) -> Result<Self> {
        if let Ok(val) = std::env::var("FLOWGATE_DEBUG") {
            config.debug = val.parse().unwrap_or(config.debug);
        }
        if let Ok(val) = std::env::var("FLOWGATE_LINK_CAPACITY_BPS") {
            if let Ok(v) = val.parse() {
                config.link_capacity_bps = v;
            }
        }
        if let Ok(val) = std::env::var("FLOWGATE_PORT_THRESH_BYTES") {
            if let Ok(v) = val.parse() {
                config.port_thresh_bytes = v;
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        const MAX_QUEUES: usize = 64;

        if self.queue_num == 0 || self.queue_num > MAX_QUEUES {
            return Err(ConfigError::Validation(format!(
                "queue_num must be between 1 and {MAX_QUEUES}, got {}",
                self.queue_num
            )));
        }

        if matches!(self.discipline, DisciplineKind::PrioWrr | DisciplineKind::PrioWfq)
            && self.prio_queue_num >= self.queue_num
        {
            return Err(ConfigError::Validation(format!(
                "prio_queue_num ({}) must be smaller than queue_num ({}) for a two-tier discipline",
                self.prio_queue_num, self.queue_num
            )));
        }

        if self.link_capacity_bps == 0 {
            return Err(ConfigError::Validation("link_capacity_bps must be positive".into()));
        }

        for (i, q) in self.queues.iter().enumerate() {
            if !q.weight.is_finite() || q.weight <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "queues[{i}].weight must be finite and positive, got {}",
                    q.weight
                )));
            }
            if q.quantum_bytes == 0 {
                return Err(ConfigError::Validation(format!(
                    "queues[{i}].quantum_bytes must be positive"
                )));
            }
        }

        for (alpha_name, alpha) in [
            ("estimate_quantum_alpha", self.estimate_quantum_alpha),
            ("estimate_round_alpha", self.estimate_round_alpha),
            ("estimate_weight_alpha", self.estimate_weight_alpha),
            ("drain_rate_beta", self.drain_rate_beta),
        ] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(ConfigError::Validation(format!(
                    "{alpha_name} must be between 0.0 and 1.0, got {alpha}"
                )));
            }
        }

        Ok(())
    }
}
