/// Hardware-unit catalogue. Loaded once from JSON and treated as read-only
/// for the whole scheduling run.
use crate::error::{RenderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One execution unit of the candidate accelerator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwUnit {
  pub id: String,
  /// Operator types this unit can execute. "*" accepts anything.
  pub supported_ops: Vec<String>,
  pub frequency_mhz: f64,
  #[serde(default = "default_latency")]
  pub latency_cycles: u64,
  #[serde(default = "default_throughput")]
  pub throughput_ops_per_cycle: f64,
  #[serde(default)]
  pub area_um2: f64,
  #[serde(default)]
  pub static_power_uw: f64,
  #[serde(default)]
  pub dynamic_power_uw: f64,
}

fn default_latency() -> u64 {
  1
}

fn default_throughput() -> f64 {
  1.0
}

impl HwUnit {
  pub fn supports(&self, op_type: &str) -> bool {
    self.supported_ops.iter().any(|t| t == op_type || t == "*")
  }
}

/// Catalogue entry as written in the JSON file. `count > 1` expands into
/// numbered unit instances (`name_0`, `name_1`, ...).
#[derive(Debug, Deserialize)]
struct HwUnitEntry {
  id: String,
  supported_ops: Vec<String>,
  frequency_mhz: f64,
  #[serde(default = "default_count")]
  count: u32,
  #[serde(default = "default_latency")]
  latency_cycles: u64,
  #[serde(default = "default_throughput")]
  throughput_ops_per_cycle: f64,
  #[serde(default)]
  area_um2: f64,
  #[serde(default)]
  static_power_uw: f64,
  #[serde(default)]
  dynamic_power_uw: f64,
}

fn default_count() -> u32 {
  1
}

#[derive(Debug, Deserialize)]
struct HwConfigFile {
  #[serde(default)]
  accelerator_name: String,
  #[serde(default)]
  description: String,
  hw_units: Vec<HwUnitEntry>,
}

/// Full hardware description of one candidate accelerator.
#[derive(Debug, Clone)]
pub struct HwConfig {
  pub accelerator_name: String,
  pub description: String,
  pub units: Vec<HwUnit>,
}

impl HwConfig {
  /// Units grouped by each op type they support, preserving catalogue order.
  pub fn units_by_op(&self) -> HashMap<&str, Vec<&HwUnit>> {
    let mut map: HashMap<&str, Vec<&HwUnit>> = HashMap::new();
    for unit in &self.units {
      for op in &unit.supported_ops {
        map.entry(op.as_str()).or_default().push(unit);
      }
    }
    map
  }

  pub fn unit(&self, id: &str) -> Option<&HwUnit> {
    self.units.iter().find(|u| u.id == id)
  }

  fn validate(&self) -> Result<()> {
    if self.units.is_empty() {
      return Err(RenderError::Config("hardware catalogue has no units".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for unit in &self.units {
      if !seen.insert(&unit.id) {
        return Err(RenderError::Config(format!("duplicate hardware unit id '{}'", unit.id)));
      }
      if unit.frequency_mhz <= 0.0 {
        return Err(RenderError::Config(format!(
          "unit '{}' has non-positive frequency {}",
          unit.id, unit.frequency_mhz
        )));
      }
      if unit.supported_ops.is_empty() {
        return Err(RenderError::Config(format!("unit '{}' supports no op types", unit.id)));
      }
    }
    Ok(())
  }
}

/// Parse a hardware catalogue from its JSON text.
pub fn parse_hw_config(json: &str) -> Result<HwConfig> {
  let file: HwConfigFile =
    serde_json::from_str(json).map_err(|e| RenderError::Config(format!("malformed hardware catalogue: {}", e)))?;

  let mut units = Vec::new();
  for entry in file.hw_units {
    for i in 0..entry.count {
      let id = if entry.count > 1 {
        format!("{}_{}", entry.id, i)
      } else {
        entry.id.clone()
      };
      units.push(HwUnit {
        id,
        supported_ops: entry.supported_ops.clone(),
        frequency_mhz: entry.frequency_mhz,
        latency_cycles: entry.latency_cycles,
        throughput_ops_per_cycle: entry.throughput_ops_per_cycle,
        area_um2: entry.area_um2,
        static_power_uw: entry.static_power_uw,
        dynamic_power_uw: entry.dynamic_power_uw,
      });
    }
  }

  let config = HwConfig {
    accelerator_name: file.accelerator_name,
    description: file.description,
    units,
  };
  config.validate()?;
  Ok(config)
}

pub fn load_hw_config(path: &Path) -> Result<HwConfig> {
  let content = fs::read_to_string(path)
    .map_err(|e| RenderError::Config(format!("cannot read hardware catalogue {:?}: {}", path, e)))?;
  parse_hw_config(&content)
}
