/// Built-in optimization strategies, one per accelerator technique from the
/// neural-rendering training literature. Constants come from the reference
/// hardware papers; all are pure functions of the operator metrics.
use super::{OperatorMetrics, OptimizationStrategy};

/// Skip the fraction of gradient updates pruned as uninformative. Applies
/// to gradient compute/prune stages and to backward field-compute
/// operators.
#[derive(Debug, Clone)]
pub struct GradientPruning {
  pub prune_ratio: f64,
}

impl Default for GradientPruning {
  fn default() -> Self {
    Self { prune_ratio: 0.4 }
  }
}

impl OptimizationStrategy for GradientPruning {
  fn name(&self) -> &str {
    "gradient_pruning"
  }

  fn is_applicable(&self, m: &OperatorMetrics) -> bool {
    matches!(m.base_op_type.as_str(), "GRADIENTCOMPUTE" | "GRADIENTPRUNING")
      || (m.is_backward && matches!(m.base_op_type.as_str(), "MLP" | "FIELD_COMPUTATION"))
  }

  fn speedup(&self, _m: &OperatorMetrics) -> f64 {
    1.0 / (1.0 - self.prune_ratio)
  }
}

/// Hierarchical tile merging for gradient accumulation: coalescing tiles
/// removes a share of redundant memory traffic.
#[derive(Debug, Clone)]
pub struct TileMerging {
  pub tile_size: u64,
  pub merge_efficiency: f64,
}

impl Default for TileMerging {
  fn default() -> Self {
    Self {
      tile_size: 16,
      merge_efficiency: 0.85,
    }
  }
}

impl OptimizationStrategy for TileMerging {
  fn name(&self) -> &str {
    "tile_merging"
  }

  fn is_applicable(&self, m: &OperatorMetrics) -> bool {
    m.base_op_type == "TILEMERGING"
  }

  fn speedup(&self, _m: &OperatorMetrics) -> f64 {
    1.0 / (1.0 - (1.0 - self.merge_efficiency) * 0.3)
  }
}

/// Row-major bundle processing: the per-row setup cost is paid once per row
/// instead of once per element, so the gain grows with row count.
#[derive(Debug, Clone)]
pub struct RowProcessing {
  pub row_width: u64,
  pub setup_cycles: u64,
}

impl Default for RowProcessing {
  fn default() -> Self {
    Self {
      row_width: 256,
      setup_cycles: 8,
    }
  }
}

impl OptimizationStrategy for RowProcessing {
  fn name(&self) -> &str {
    "row_processing"
  }

  fn is_applicable(&self, m: &OperatorMetrics) -> bool {
    matches!(m.base_op_type.as_str(), "ROWPROCESSING" | "ROWGENERATION")
  }

  fn speedup(&self, m: &OperatorMetrics) -> f64 {
    let rows = (m.work_elems + self.row_width - 1) / self.row_width;
    let naive = m.work_elems + rows * self.setup_cycles;
    let amortized = m.work_elems + self.setup_cycles;
    naive as f64 / amortized as f64
  }
}

/// Feed-forward read-mapper coalescing: consolidates forward-pass hash table
/// reads so a fraction of them share one memory transaction.
#[derive(Debug, Clone)]
pub struct FrmCoalescing {
  pub coalesce_ratio: f64,
}

impl Default for FrmCoalescing {
  fn default() -> Self {
    Self { coalesce_ratio: 0.7 }
  }
}

impl OptimizationStrategy for FrmCoalescing {
  fn name(&self) -> &str {
    "frm_coalescing"
  }

  fn is_applicable(&self, m: &OperatorMetrics) -> bool {
    m.base_op_type == "FRM" || (m.base_op_type == "HASH_ENCODE" && !m.is_backward)
  }

  fn speedup(&self, _m: &OperatorMetrics) -> f64 {
    1.0 + self.coalesce_ratio * 0.5
  }
}

/// Backprop update merging: hierarchically merges gradient writes to the
/// hash table, removing write conflicts in the backward pass.
#[derive(Debug, Clone)]
pub struct BumMerging {
  pub conflict_reduction: f64,
}

impl Default for BumMerging {
  fn default() -> Self {
    Self {
      conflict_reduction: 0.8,
    }
  }
}

impl OptimizationStrategy for BumMerging {
  fn name(&self) -> &str {
    "bum_merging"
  }

  fn is_applicable(&self, m: &OperatorMetrics) -> bool {
    m.base_op_type == "BUM" || (m.base_op_type == "HASH_ENCODE" && m.is_backward)
  }

  fn speedup(&self, _m: &OperatorMetrics) -> f64 {
    1.0 / (1.0 - self.conflict_reduction * 0.4)
  }
}
