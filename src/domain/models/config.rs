use serde::{Deserialize, Serialize};

use super::convergence::ScoringWeights;

/// Main configuration structure for crucible
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Worker dispatch configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Convergence scoring configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Engagement state configuration
    #[serde(default)]
    pub engagement: EngagementConfig,

    /// Validation gate configuration
    #[serde(default)]
    pub gate: GateConfig,

    /// Proof and review configuration
    #[serde(default)]
    pub proof: ProofConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Persisted artifact configuration
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Worker registry
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,

    /// Target probe and scenario backend command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            synthesis: SynthesisConfig::default(),
            engagement: EngagementConfig::default(),
            gate: GateConfig::default(),
            proof: ProofConfig::default(),
            logging: LoggingConfig::default(),
            artifacts: ArtifactsConfig::default(),
            workers: vec![],
            oracle: None,
        }
    }
}

/// Worker dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatcherConfig {
    /// Hard timeout for one worker attempt, in seconds
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,

    /// Maximum workers running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum workers in a narrow (drilling) round
    #[serde(default = "default_narrow_workers")]
    pub narrow_workers: usize,

    /// Number of triaged entrypoints passed as broad-mode focus
    #[serde(default = "default_focus_limit")]
    pub focus_limit: usize,
}

const fn default_worker_timeout_secs() -> u64 {
    600
}

const fn default_max_concurrency() -> usize {
    16
}

const fn default_narrow_workers() -> usize {
    3
}

const fn default_focus_limit() -> usize {
    10
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_timeout_secs: default_worker_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            narrow_workers: default_narrow_workers(),
            focus_limit: default_focus_limit(),
        }
    }
}

/// Convergence scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SynthesisConfig {
    /// Composite score weights
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Number of ranked points kept (commit candidate plus backups)
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

const fn default_top_k() -> usize {
    3
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            top_k: default_top_k(),
        }
    }
}

/// Engagement state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngagementConfig {
    /// Maximum belief log entries before the oldest are collapsed
    #[serde(default = "default_belief_log_capacity")]
    pub belief_log_capacity: usize,

    /// Re-run convergence once when backups run out
    #[serde(default = "default_true")]
    pub reconverge: bool,
}

const fn default_belief_log_capacity() -> usize {
    64
}

const fn default_true() -> bool {
    true
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            belief_log_capacity: default_belief_log_capacity(),
            reconverge: default_true(),
        }
    }
}

/// Validation gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GateConfig {
    /// Relative tolerance under which preview and execution count as equal
    #[serde(default = "default_differential_tolerance")]
    pub differential_tolerance: f64,

    /// Iteration counts simulated by the economic viability check
    #[serde(default = "default_economic_iterations")]
    pub economic_iterations: Vec<u32>,
}

const fn default_differential_tolerance() -> f64 {
    1e-9
}

fn default_economic_iterations() -> Vec<u32> {
    vec![1, 10, 100]
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            differential_tolerance: default_differential_tolerance(),
            economic_iterations: default_economic_iterations(),
        }
    }
}

/// Proof and review configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProofConfig {
    /// Fractional cost increase applied in the adverse recomputation
    #[serde(default = "default_adverse_cost_factor")]
    pub adverse_cost_factor: f64,

    /// Maximum relative jitter applied to benefit and cost
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Number of jitter samples
    #[serde(default = "default_jitter_samples")]
    pub jitter_samples: u32,
}

const fn default_adverse_cost_factor() -> f64 {
    0.25
}

const fn default_jitter() -> f64 {
    0.10
}

const fn default_jitter_samples() -> u32 {
    5
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            adverse_cost_factor: default_adverse_cost_factor(),
            jitter: default_jitter(),
            jitter_samples: default_jitter_samples(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (console only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation policy for log files: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Persisted artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactsConfig {
    /// Directory holding one subdirectory per engagement
    #[serde(default = "default_artifacts_dir")]
    pub dir: String,
}

fn default_artifacts_dir() -> String {
    ".crucible/engagements".to_string()
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

/// A worker backed by an external command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker identifier (producer id of its findings)
    pub id: String,

    /// Mission topic the worker's findings must reference
    pub topic: String,

    /// Command to execute
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

/// Command answering target probe and scenario backend requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    /// Command to execute
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for one oracle call, in seconds
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_oracle_timeout_secs() -> u64 {
    120
}
