/// Composable duration-reducing optimization strategies and the cost model
/// that turns operator workloads into baseline cycle counts.
pub mod strategies;

use crate::ir::{MappedIR, MappedIRNode, OptimizationResult};
use std::collections::HashMap;

/// Duration never drops below this fraction of the base duration, no matter
/// how many strategies compound.
pub const MIN_DURATION_FRACTION: f64 = 0.1;

/// Metrics a strategy may inspect. Derived purely from the operator and its
/// mapping attributes, never from previous optimization output, so applying
/// the library twice yields identical results.
#[derive(Debug, Clone)]
pub struct OperatorMetrics {
  /// Op type with any backward suffix stripped.
  pub base_op_type: String,
  pub is_backward: bool,
  pub work_elems: u64,
  pub out_elems: u64,
  pub bytes: u64,
  pub num_ops: u64,
  pub call_count: u32,
  pub fallback_penalty: f64,
}

impl OperatorMetrics {
  pub fn from_node(node: &MappedIRNode) -> Self {
    let attr = |key: &str, default: u64| {
      node
        .attrs
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
    };
    Self {
      base_op_type: node.op.base_op_type().to_string(),
      is_backward: node.op.is_backward(),
      work_elems: attr("work_elems", node.op.input_elems().max(1)),
      out_elems: attr("out_elems", node.op.output_elems().max(1)),
      bytes: attr("bytes", (node.op.bytes_in + node.op.bytes_out).max(1)),
      num_ops: node.op.num_ops,
      call_count: node.op.call_count.max(1),
      fallback_penalty: node.attr_f64("fallback_penalty").unwrap_or(1.0),
    }
  }
}

/// A named, composable transform reducing an operator's effective duration.
/// Implementations must be pure functions of the metrics.
pub trait OptimizationStrategy: Send + Sync {
  fn name(&self) -> &str;
  fn is_applicable(&self, metrics: &OperatorMetrics) -> bool;
  /// Speedup factor; >= 1.0 unless the strategy is pessimistic.
  fn speedup(&self, metrics: &OperatorMetrics) -> f64;
  /// Pessimistic strategies may increase duration (speedup < 1.0).
  fn pessimistic(&self) -> bool {
    false
  }
}

/// Per-op-type throughput assumptions used to derive baseline durations.
/// The duration is the roofline maximum of the compute and memory terms.
#[derive(Debug, Clone)]
pub struct CostModel {
  elems_per_cycle: HashMap<String, f64>,
  bytes_per_cycle: HashMap<String, f64>,
  default_elems_per_cycle: f64,
  default_bytes_per_cycle: f64,
}

impl Default for CostModel {
  fn default() -> Self {
    let mut epc = HashMap::new();
    epc.insert("FIELD_COMPUTATION".into(), 256.0); // 32x32 MAC array
    epc.insert("MLP".into(), 256.0);
    epc.insert("HASH_ENCODE".into(), 64.0);
    epc.insert("POSITIONAL_ENCODE".into(), 64.0);
    epc.insert("ENCODING".into(), 64.0);
    epc.insert("SAMPLING".into(), 64.0);
    epc.insert("VOLUME_RENDERING".into(), 64.0);
    epc.insert("BLENDING".into(), 64.0);

    let mut bpc = HashMap::new();
    bpc.insert("FIELD_COMPUTATION".into(), 64.0);
    bpc.insert("MLP".into(), 64.0);
    bpc.insert("HASH_ENCODE".into(), 32.0);
    bpc.insert("POSITIONAL_ENCODE".into(), 32.0);
    bpc.insert("ENCODING".into(), 32.0);
    bpc.insert("SAMPLING".into(), 32.0);
    bpc.insert("VOLUME_RENDERING".into(), 32.0);
    bpc.insert("BLENDING".into(), 32.0);

    Self {
      elems_per_cycle: epc,
      bytes_per_cycle: bpc,
      default_elems_per_cycle: 1.0,
      default_bytes_per_cycle: 16.0,
    }
  }
}

impl CostModel {
  /// Baseline duration in cycles before any optimization, including the
  /// fallback penalty paid for non-specialized hardware.
  pub fn base_duration(&self, m: &OperatorMetrics) -> u64 {
    let epc = self
      .elems_per_cycle
      .get(&m.base_op_type)
      .copied()
      .unwrap_or(self.default_elems_per_cycle);
    let bpc = self
      .bytes_per_cycle
      .get(&m.base_op_type)
      .copied()
      .unwrap_or(self.default_bytes_per_cycle);

    // FLOP counts bias the workload upward when they dominate element count.
    let work = (m.work_elems as f64).max(m.num_ops as f64 / 32.0);
    let compute_cycles = (work / epc).ceil();
    let mem_cycles = (m.bytes as f64 / bpc).ceil();

    let per_call = compute_cycles.max(mem_cycles).max(1.0) * m.fallback_penalty;
    (per_call * m.call_count as f64).ceil() as u64
  }
}

/// Registry of optimization strategies, evaluated in registration order.
pub struct OptimizationLibrary {
  strategies: Vec<Box<dyn OptimizationStrategy>>,
  cost: CostModel,
}

impl Default for OptimizationLibrary {
  /// Library pre-loaded with the built-in neural-rendering strategies.
  fn default() -> Self {
    let mut lib = Self::new(CostModel::default());
    lib.register(Box::new(strategies::GradientPruning::default()));
    lib.register(Box::new(strategies::TileMerging::default()));
    lib.register(Box::new(strategies::RowProcessing::default()));
    lib.register(Box::new(strategies::FrmCoalescing::default()));
    lib.register(Box::new(strategies::BumMerging::default()));
    lib
  }
}

impl OptimizationLibrary {
  pub fn new(cost: CostModel) -> Self {
    Self {
      strategies: Vec::new(),
      cost,
    }
  }

  pub fn register(&mut self, strategy: Box<dyn OptimizationStrategy>) {
    self.strategies.push(strategy);
  }

  pub fn strategy_names(&self) -> Vec<&str> {
    self.strategies.iter().map(|s| s.name()).collect()
  }

  /// Evaluate every registered strategy against one mapped operator and
  /// compose the matching speedups multiplicatively.
  pub fn optimize_node(&self, node: &MappedIRNode) -> OptimizationResult {
    let metrics = OperatorMetrics::from_node(node);
    let base_duration = self.cost.base_duration(&metrics);

    let mut speedup = 1.0f64;
    let mut applied = Vec::new();
    let mut any_pessimistic = false;
    for strategy in &self.strategies {
      if strategy.is_applicable(&metrics) {
        let s = strategy.speedup(&metrics);
        debug_assert!(strategy.pessimistic() || s >= 1.0, "{} returned speedup {}", strategy.name(), s);
        speedup *= s;
        any_pessimistic |= strategy.pessimistic();
        applied.push(strategy.name().to_string());
      }
    }

    if applied.is_empty() {
      return OptimizationResult::unoptimized(base_duration);
    }

    let floor = ((base_duration as f64) * MIN_DURATION_FRACTION).ceil() as u64;
    let mut duration = ((base_duration as f64 / speedup).ceil() as u64).max(floor).max(1);
    if !any_pessimistic {
      duration = duration.min(base_duration);
    }

    OptimizationResult {
      base_duration,
      duration,
      speedup_factor: base_duration as f64 / duration as f64,
      applied_optimizations: applied,
    }
  }

  /// Attach optimized durations to every node of a mapped IR. Re-running on
  /// the returned IR reproduces identical results.
  pub fn apply(&self, ir: &MappedIR) -> MappedIR {
    let mut out = ir.clone();
    for node in &mut out.nodes {
      let result = self.optimize_node(node);
      node.attrs.insert("base_duration".into(), result.base_duration.to_string());
      node.attrs.insert("duration".into(), result.duration.to_string());
      node.attrs.insert("speedup".into(), format!("{:.6}", result.speedup_factor));
    }
    out
  }
}
