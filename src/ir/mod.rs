/// Intermediate representation exchanged between pipeline authoring and the
/// scheduler: the operator graph, its hardware-mapped form and the final
/// cycle-annotated schedule.
pub mod json;

use crate::error::{RenderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
  F32,
  F16,
  I8,
  I32,
}

impl DType {
  pub fn bytes_per_elem(&self) -> u64 {
    match self {
      DType::F32 | DType::I32 => 4,
      DType::F16 => 2,
      DType::I8 => 1,
    }
  }
}

impl Default for DType {
  fn default() -> Self {
    DType::F32
  }
}

/// Tensor descriptor. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
  pub shape: Vec<u64>,
  pub dtype: DType,
}

impl TensorDesc {
  pub fn new(shape: Vec<u64>, dtype: DType) -> Self {
    Self { shape, dtype }
  }

  /// Total element count. Empty shapes count as zero elements.
  pub fn num_elems(&self) -> u64 {
    if self.shape.is_empty() {
      return 0;
    }
    self.shape.iter().map(|d| (*d).max(1)).product()
  }

  pub fn num_bytes(&self) -> u64 {
    self.num_elems() * self.dtype.bytes_per_elem()
  }
}

/// Closed operator taxonomy. Carried explicitly on each node so no
/// downstream pass needs type-based dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCategory {
  Sampling,
  Encoding,
  FieldCompute,
  Blending,
  Optimization,
  Unknown,
}

impl OpCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      OpCategory::Sampling => "Sampling",
      OpCategory::Encoding => "Encoding",
      OpCategory::FieldCompute => "FieldCompute",
      OpCategory::Blending => "Blending",
      OpCategory::Optimization => "Optimization",
      OpCategory::Unknown => "Unknown",
    }
  }

  pub fn from_str(s: &str) -> Self {
    match s {
      "Sampling" => OpCategory::Sampling,
      "Encoding" => OpCategory::Encoding,
      "FieldCompute" => OpCategory::FieldCompute,
      "Blending" => OpCategory::Blending,
      "Optimization" => OpCategory::Optimization,
      _ => OpCategory::Unknown,
    }
  }
}

/// A single operator in the rendering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorNode {
  pub id: String,
  /// Hardware-facing operator tag, e.g. HASH_ENCODE, FIELD_COMPUTATION.
  /// Backward-pass operators carry the " (B)" suffix.
  pub op_type: String,
  pub category: OpCategory,
  pub inputs: Vec<TensorDesc>,
  pub outputs: Vec<TensorDesc>,
  pub call_count: u32,
  pub bitwidth: u32,
  pub bytes_in: u64,
  pub bytes_out: u64,
  pub num_ops: u64,
  pub attrs: BTreeMap<String, String>,
}

impl OperatorNode {
  pub fn new(id: impl Into<String>, op_type: impl Into<String>, category: OpCategory) -> Self {
    Self {
      id: id.into(),
      op_type: op_type.into(),
      category,
      inputs: Vec::new(),
      outputs: Vec::new(),
      call_count: 1,
      bitwidth: 16,
      bytes_in: 0,
      bytes_out: 0,
      num_ops: 0,
      attrs: BTreeMap::new(),
    }
  }

  /// Backward-pass operators are tagged with a " (B)" suffix by the
  /// pipeline exporter.
  pub fn is_backward(&self) -> bool {
    self.op_type.ends_with(" (B)")
  }

  /// Op type with the backward suffix stripped.
  pub fn base_op_type(&self) -> &str {
    self.op_type.strip_suffix(" (B)").unwrap_or(&self.op_type)
  }

  pub fn input_elems(&self) -> u64 {
    self.inputs.iter().map(TensorDesc::num_elems).sum()
  }

  pub fn output_elems(&self) -> u64 {
    self.outputs.iter().map(TensorDesc::num_elems).sum()
  }
}

/// Operator DAG. Nodes keep insertion order; edges are (src, dst) id pairs.
#[derive(Debug, Clone, Default)]
pub struct OperatorGraph {
  nodes: Vec<OperatorNode>,
  index: HashMap<String, usize>,
  edges: Vec<(String, String)>,
}

impl OperatorGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node(&mut self, node: OperatorNode) -> Result<()> {
    if self.index.contains_key(&node.id) {
      return Err(RenderError::Config(format!("duplicate node id '{}'", node.id)));
    }
    self.index.insert(node.id.clone(), self.nodes.len());
    self.nodes.push(node);
    Ok(())
  }

  /// Add a dependency edge. Both endpoints must already exist.
  pub fn add_edge(&mut self, src: &str, dst: &str) -> Result<()> {
    if !self.index.contains_key(src) {
      return Err(RenderError::Config(format!("edge source '{}' not in graph", src)));
    }
    if !self.index.contains_key(dst) {
      return Err(RenderError::Config(format!("edge target '{}' not in graph", dst)));
    }
    self.edges.push((src.to_string(), dst.to_string()));
    Ok(())
  }

  pub fn node(&self, id: &str) -> Option<&OperatorNode> {
    self.index.get(id).map(|i| &self.nodes[*i])
  }

  pub fn nodes(&self) -> &[OperatorNode] {
    &self.nodes
  }

  pub fn edges(&self) -> &[(String, String)] {
    &self.edges
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// An operator bound to a concrete hardware unit.
#[derive(Debug, Clone)]
pub struct MappedIRNode {
  pub op: OperatorNode,
  pub hw_unit: String,
  /// Mapping-derived hints consumed by the cost model: work_elems,
  /// out_elems, bytes, fallback_penalty.
  pub attrs: BTreeMap<String, String>,
}

impl MappedIRNode {
  pub fn attr_f64(&self, key: &str) -> Option<f64> {
    self.attrs.get(key).and_then(|v| v.parse().ok())
  }
}

/// Mapped graph: same nodes and edges as the source OperatorGraph, each
/// node annotated with its hardware assignment. Single-use artifact.
#[derive(Debug, Clone, Default)]
pub struct MappedIR {
  pub nodes: Vec<MappedIRNode>,
  pub edges: Vec<(String, String)>,
}

impl MappedIR {
  pub fn node(&self, id: &str) -> Option<&MappedIRNode> {
    self.nodes.iter().find(|n| n.op.id == id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// Outcome of applying the optimization library to one operator.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
  pub base_duration: u64,
  pub duration: u64,
  pub speedup_factor: f64,
  /// Strategy names in registration order.
  pub applied_optimizations: Vec<String>,
}

impl OptimizationResult {
  pub fn unoptimized(base_duration: u64) -> Self {
    Self {
      base_duration,
      duration: base_duration,
      speedup_factor: 1.0,
      applied_optimizations: Vec::new(),
    }
  }
}

/// A mapped operator with its cycle-level placement.
#[derive(Debug, Clone)]
pub struct ScheduledIRNode {
  pub mapped: MappedIRNode,
  pub start_cycle: u64,
  pub duration: u64,
  pub opt: OptimizationResult,
}

impl ScheduledIRNode {
  pub fn finish_cycle(&self) -> u64 {
    self.start_cycle + self.duration
  }
}

/// Aggregate statistics over one scheduling run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulingStats {
  pub total_operators: usize,
  /// Nodes with at least one applied optimization.
  pub optimized_operators: usize,
  /// Ratio of sums (sum of base durations over sum of final durations),
  /// not an average of per-node ratios.
  pub total_speedup: f64,
  /// Cumulative busy cycles per hardware unit.
  pub hw_unit_usage: BTreeMap<String, u64>,
}

/// Final schedule for one (graph, hw_config) pair. Complete or absent;
/// scheduling never yields a partial artifact.
#[derive(Debug, Clone)]
pub struct ScheduledIR {
  pub nodes: Vec<ScheduledIRNode>,
  pub edges: Vec<(String, String)>,
  pub stats: SchedulingStats,
}

impl ScheduledIR {
  pub fn node(&self, id: &str) -> Option<&ScheduledIRNode> {
    self.nodes.iter().find(|n| n.mapped.op.id == id)
  }

  /// Makespan of the schedule in cycles.
  pub fn total_cycles(&self) -> u64 {
    self.nodes.iter().map(ScheduledIRNode::finish_cycle).max().unwrap_or(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tensor_elem_and_byte_counts() {
    let t = TensorDesc::new(vec![800, 600, 3], DType::F16);
    assert_eq!(t.num_elems(), 800 * 600 * 3);
    assert_eq!(t.num_bytes(), 800 * 600 * 3 * 2);
    assert_eq!(TensorDesc::new(vec![], DType::F32).num_elems(), 0);
  }

  #[test]
  fn backward_suffix_detection() {
    let n = OperatorNode::new("n0", "HASH_ENCODE (B)", OpCategory::Encoding);
    assert!(n.is_backward());
    assert_eq!(n.base_op_type(), "HASH_ENCODE");
    let f = OperatorNode::new("n1", "HASH_ENCODE", OpCategory::Encoding);
    assert!(!f.is_backward());
  }

  #[test]
  fn graph_rejects_dangling_edges_and_duplicate_ids() {
    let mut g = OperatorGraph::new();
    g.add_node(OperatorNode::new("a", "SAMPLING", OpCategory::Sampling)).unwrap();
    assert!(g.add_edge("a", "missing").is_err());
    assert!(g.add_node(OperatorNode::new("a", "SAMPLING", OpCategory::Sampling)).is_err());
  }
}
