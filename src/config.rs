/// Run configuration: TOML file with defaults, merge and CLI overrides.
use crate::error::{RenderError, Result};
use crate::ppa::ramulator::Ramulator2Config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Input and run options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunSection {
  /// Operator graph IR (JSON).
  #[serde(default)]
  pub graph: String,
  /// Hardware unit catalogue (JSON).
  #[serde(default)]
  pub hw_config: String,
  /// Root of the reference hardware tree (Ramulator build, HLS projects).
  #[serde(default = "default_hardware_dir")]
  pub hardware_dir: String,
  #[serde(default)]
  pub quiet: bool,
  #[serde(default = "default_clock_period")]
  pub clock_period_ns: f64,
}

fn default_hardware_dir() -> String {
  "Hardware".to_string()
}

fn default_clock_period() -> f64 {
  1.0
}

impl Default for RunSection {
  fn default() -> Self {
    Self {
      graph: String::new(),
      hw_config: String::new(),
      hardware_dir: default_hardware_dir(),
      quiet: false,
      clock_period_ns: default_clock_period(),
    }
  }
}

/// DRAM subsystem selection. An empty preset uses the accelerator's own
/// memory configuration; explicit fields override the preset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DramSection {
  /// "high_bandwidth", "low_latency", "power_efficient" or empty.
  #[serde(default)]
  pub preset: String,
  #[serde(default)]
  pub dram_type: String,
  #[serde(default)]
  pub channels: u32,
  #[serde(default)]
  pub frequency_mhz: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub run: RunSection,
  #[serde(default)]
  pub dram: DramSection,
}

impl AppConfig {
  /// Resolve the DRAM configuration for the accelerator being evaluated.
  pub fn ramulator_config(&self, accelerator: &str) -> Ramulator2Config {
    let mut cfg = match self.dram.preset.as_str() {
      "high_bandwidth" => Ramulator2Config::high_bandwidth(),
      "low_latency" => Ramulator2Config::low_latency(),
      "power_efficient" => Ramulator2Config::power_efficient(),
      "" => Ramulator2Config::for_accelerator(accelerator),
      other => Ramulator2Config::for_accelerator(other),
    };
    if !self.dram.dram_type.is_empty() {
      cfg.dram_type = self.dram.dram_type.clone();
    }
    if self.dram.channels > 0 {
      cfg.channels = self.dram.channels;
    }
    if self.dram.frequency_mhz > 0 {
      cfg.frequency_mhz = self.dram.frequency_mhz;
    }
    cfg
  }
}

/// Load a configuration file.
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
  let content =
    fs::read_to_string(path).map_err(|e| RenderError::Config(format!("cannot read config file {:?}: {}", path, e)))?;
  Ok(toml::from_str::<AppConfig>(&content)?)
}

/// Merge two configurations, the override winning field by field.
pub fn merge_config(mut base: AppConfig, override_config: AppConfig) -> AppConfig {
  if !override_config.run.graph.is_empty() {
    base.run.graph = override_config.run.graph;
  }
  if !override_config.run.hw_config.is_empty() {
    base.run.hw_config = override_config.run.hw_config;
  }
  if !override_config.run.hardware_dir.is_empty() {
    base.run.hardware_dir = override_config.run.hardware_dir;
  }
  if override_config.run.quiet {
    base.run.quiet = true;
  }
  if override_config.run.clock_period_ns > 0.0 {
    base.run.clock_period_ns = override_config.run.clock_period_ns;
  }
  if !override_config.dram.preset.is_empty() {
    base.dram.preset = override_config.dram.preset;
  }
  if !override_config.dram.dram_type.is_empty() {
    base.dram.dram_type = override_config.dram.dram_type;
  }
  if override_config.dram.channels > 0 {
    base.dram.channels = override_config.dram.channels;
  }
  if override_config.dram.frequency_mhz > 0 {
    base.dram.frequency_mhz = override_config.dram.frequency_mhz;
  }
  base
}

/// Apply CLI arguments on top of the file configuration.
pub fn apply_cli_overrides(
  config: &mut AppConfig,
  quiet: bool,
  graph: Option<&str>,
  hw_config: Option<&str>,
  hardware_dir: Option<&str>,
  dram_preset: Option<&str>,
) {
  if quiet {
    config.run.quiet = true;
  }
  if let Some(path) = graph {
    config.run.graph = path.to_string();
  }
  if let Some(path) = hw_config {
    config.run.hw_config = path.to_string();
  }
  if let Some(path) = hardware_dir {
    config.run.hardware_dir = path.to_string();
  }
  if let Some(preset) = dram_preset {
    config.dram.preset = preset.to_string();
  }
}

/// Validate a merged configuration before the run starts.
pub fn validate_config(config: &AppConfig) -> Result<()> {
  if config.run.graph.is_empty() {
    return Err(RenderError::Config("no operator graph given (run.graph)".into()));
  }
  if config.run.hw_config.is_empty() {
    return Err(RenderError::Config("no hardware catalogue given (run.hw_config)".into()));
  }
  if config.run.clock_period_ns <= 0.0 {
    return Err(RenderError::Config(format!(
      "clock_period_ns must be positive, got {}",
      config.run.clock_period_ns
    )));
  }
  Ok(())
}
