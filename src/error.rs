use thiserror::Error;

/// Error taxonomy for a single (graph, hw_config) scheduling run.
///
/// Structural errors (`Mapping`, `Cycle`, `Config`) are fatal for the run.
/// `ExternalSimulator` is recoverable at the PPA-estimator boundary only:
/// the estimator substitutes the analytic DRAM model and keeps going.
#[derive(Debug, Error)]
pub enum RenderError {
  /// No hardware unit, including every fallback entry, supports the op type.
  #[error("no hardware unit supports operator '{node_id}' (op type {op_type})")]
  Mapping { node_id: String, op_type: String },

  /// The dependency graph is not a DAG.
  #[error("dependency cycle detected through operator '{node_id}'")]
  Cycle { node_id: String },

  /// Non-positive denominator handed to the performance model.
  #[error("invalid workload: {what} must be positive, got {value}")]
  InvalidWorkload { what: &'static str, value: f64 },

  /// Malformed hardware catalogue, graph IR or run configuration.
  #[error("configuration error: {0}")]
  Config(String),

  /// DRAM-timing backend missing, failed or timed out.
  #[error("external memory simulator unavailable: {0}")]
  ExternalSimulator(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("toml error: {0}")]
  Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
