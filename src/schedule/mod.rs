/// Dependency- and resource-aware operator scheduler. Admits operators in
/// topological order; each hardware unit behaves as a single mutual-exclusion
/// resource, so operators sharing a unit never overlap.
use crate::error::{RenderError, Result};
use crate::ir::{MappedIR, ScheduledIR, ScheduledIRNode, SchedulingStats};
use crate::optimize::OptimizationLibrary;
use log::info;
use std::collections::{BTreeMap, HashMap, VecDeque};

pub struct OperatorLevelScheduler {
  library: OptimizationLibrary,
}

impl Default for OperatorLevelScheduler {
  fn default() -> Self {
    Self::new(OptimizationLibrary::default())
  }
}

impl OperatorLevelScheduler {
  pub fn new(library: OptimizationLibrary) -> Self {
    Self { library }
  }

  pub fn library(&self) -> &OptimizationLibrary {
    &self.library
  }

  /// Compute a conflict-free schedule for a mapped graph. Fails with
  /// `Cycle` if the dependency edges are not acyclic; never returns a
  /// partial schedule.
  pub fn schedule(&self, ir: &MappedIR) -> Result<ScheduledIR> {
    let order = topological_order(ir)?;

    let index: HashMap<&str, usize> = ir
      .nodes
      .iter()
      .enumerate()
      .map(|(i, n)| (n.op.id.as_str(), i))
      .collect();
    let mut parents: HashMap<usize, Vec<usize>> = HashMap::new();
    for (src, dst) in &ir.edges {
      let d = node_index(&index, dst)?;
      let s = node_index(&index, src)?;
      parents.entry(d).or_default().push(s);
    }

    let mut finish: Vec<u64> = vec![0; ir.nodes.len()];
    let mut unit_free: HashMap<String, u64> = HashMap::new();
    let mut scheduled: Vec<Option<ScheduledIRNode>> = vec![None; ir.nodes.len()];

    let mut stats = SchedulingStats {
      total_operators: ir.nodes.len(),
      ..SchedulingStats::default()
    };
    let mut sum_base: u64 = 0;
    let mut sum_duration: u64 = 0;

    for idx in order {
      let node = &ir.nodes[idx];
      let opt = self.library.optimize_node(node);

      let dep_ready = parents
        .get(&idx)
        .map(|ps| ps.iter().map(|p| finish[*p]).max().unwrap_or(0))
        .unwrap_or(0);
      let unit_ready = unit_free.get(&node.hw_unit).copied().unwrap_or(0);
      let start_cycle = dep_ready.max(unit_ready);
      let duration = opt.duration;

      finish[idx] = start_cycle + duration;
      unit_free.insert(node.hw_unit.clone(), start_cycle + duration);
      *stats.hw_unit_usage.entry(node.hw_unit.clone()).or_insert(0) += duration;
      if !opt.applied_optimizations.is_empty() {
        stats.optimized_operators += 1;
      }
      sum_base += opt.base_duration;
      sum_duration += duration;

      scheduled[idx] = Some(ScheduledIRNode {
        mapped: node.clone(),
        start_cycle,
        duration,
        opt,
      });
    }

    // Ratio of sums, so many small operators do not bias the aggregate.
    stats.total_speedup = if sum_duration > 0 {
      sum_base as f64 / sum_duration as f64
    } else {
      1.0
    };

    // The toposort covered every index, so no slot is left empty.
    let nodes: Vec<ScheduledIRNode> = scheduled.into_iter().flatten().collect();
    let result = ScheduledIR {
      nodes,
      edges: ir.edges.clone(),
      stats,
    };
    info!(
      "scheduled {} operators over {} units, makespan {} cycles, speedup {:.2}x",
      result.stats.total_operators,
      result.stats.hw_unit_usage.len(),
      result.total_cycles(),
      result.stats.total_speedup
    );
    Ok(result)
  }
}

/// Edges naming nodes outside the IR are a construction error, not a panic.
fn node_index(index: &HashMap<&str, usize>, id: &str) -> Result<usize> {
  index
    .get(id)
    .copied()
    .ok_or_else(|| RenderError::Config(format!("edge references unknown operator '{}'", id)))
}

/// Kahn's algorithm over node indices, preserving insertion order among
/// ready nodes. A leftover node means a cycle; the error names one of them.
fn topological_order(ir: &MappedIR) -> Result<Vec<usize>> {
  let index: HashMap<&str, usize> = ir
    .nodes
    .iter()
    .enumerate()
    .map(|(i, n)| (n.op.id.as_str(), i))
    .collect();

  let mut in_degree = vec![0usize; ir.nodes.len()];
  let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
  for (src, dst) in &ir.edges {
    let s = node_index(&index, src)?;
    let d = node_index(&index, dst)?;
    in_degree[d] += 1;
    children.entry(s).or_default().push(d);
  }

  let mut queue: VecDeque<usize> = (0..ir.nodes.len()).filter(|i| in_degree[*i] == 0).collect();
  let mut order = Vec::with_capacity(ir.nodes.len());
  while let Some(i) = queue.pop_front() {
    order.push(i);
    if let Some(cs) = children.get(&i) {
      for &c in cs {
        in_degree[c] -= 1;
        if in_degree[c] == 0 {
          queue.push_back(c);
        }
      }
    }
  }

  if order.len() != ir.nodes.len() {
    let stuck = (0..ir.nodes.len())
      .find(|i| in_degree[*i] > 0)
      .map(|i| ir.nodes[i].op.id.clone())
      .unwrap_or_default();
    return Err(RenderError::Cycle { node_id: stuck });
  }
  Ok(order)
}

/// Convenience check used by tests and callers that assemble IRs by hand:
/// true when no two nodes on the same unit have overlapping intervals.
pub fn is_conflict_free(ir: &ScheduledIR) -> bool {
  let mut by_unit: BTreeMap<&str, Vec<(u64, u64)>> = BTreeMap::new();
  for node in &ir.nodes {
    by_unit
      .entry(node.mapped.hw_unit.as_str())
      .or_default()
      .push((node.start_cycle, node.finish_cycle()));
  }
  for intervals in by_unit.values_mut() {
    intervals.sort();
    for pair in intervals.windows(2) {
      if pair[1].0 < pair[0].1 {
        return false;
      }
    }
  }
  true
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ir::{MappedIRNode, OpCategory, OperatorNode};
  use std::collections::BTreeMap;

  fn mapped_node(id: &str, op_type: &str, unit: &str, work: u64) -> MappedIRNode {
    let node = OperatorNode::new(id, op_type, OpCategory::Unknown);
    let mut attrs = BTreeMap::new();
    attrs.insert("work_elems".into(), work.to_string());
    attrs.insert("out_elems".into(), work.to_string());
    attrs.insert("bytes".into(), work.to_string());
    MappedIRNode {
      op: node,
      hw_unit: unit.into(),
      attrs,
    }
  }

  fn chain_ir() -> MappedIR {
    let mut ir = MappedIR::default();
    ir.nodes.push(mapped_node("n0", "HASH_ENCODE", "u0", 6400));
    ir.nodes.push(mapped_node("n1", "FIELD_COMPUTATION", "u1", 25600));
    ir.nodes.push(mapped_node("n2", "VOLUME_RENDERING", "u0", 6400));
    ir.edges.push(("n0".into(), "n1".into()));
    ir.edges.push(("n1".into(), "n2".into()));
    ir
  }

  #[test]
  fn dependencies_are_respected() {
    let sched = OperatorLevelScheduler::default();
    let result = sched.schedule(&chain_ir()).unwrap();
    for (src, dst) in &result.edges {
      let p = result.node(src).unwrap();
      let c = result.node(dst).unwrap();
      assert!(c.start_cycle >= p.finish_cycle());
    }
    assert!(is_conflict_free(&result));
  }

  #[test]
  fn node_count_is_preserved() {
    let sched = OperatorLevelScheduler::default();
    let ir = chain_ir();
    let result = sched.schedule(&ir).unwrap();
    assert_eq!(result.nodes.len(), ir.nodes.len());
    assert_eq!(result.stats.total_operators, ir.nodes.len());
  }

  #[test]
  fn shared_unit_serializes_independent_nodes() {
    let mut ir = MappedIR::default();
    ir.nodes.push(mapped_node("a", "BLENDING", "u0", 6400));
    ir.nodes.push(mapped_node("b", "BLENDING", "u0", 6400));
    // No edges: only the unit exclusivity orders them.
    let sched = OperatorLevelScheduler::default();
    let result = sched.schedule(&ir).unwrap();
    assert!(is_conflict_free(&result));
    let a = result.node("a").unwrap();
    let b = result.node("b").unwrap();
    assert_eq!(b.start_cycle, a.finish_cycle());
    assert_eq!(result.stats.hw_unit_usage["u0"], a.duration + b.duration);
  }

  #[test]
  fn cycle_is_fatal_and_names_a_node() {
    let mut ir = chain_ir();
    ir.edges.push(("n2".into(), "n0".into()));
    let sched = OperatorLevelScheduler::default();
    match sched.schedule(&ir) {
      Err(RenderError::Cycle { node_id }) => assert!(!node_id.is_empty()),
      other => panic!("expected cycle error, got {:?}", other.map(|_| ())),
    }
  }

  #[test]
  fn edge_to_unknown_operator_is_a_config_error() {
    let mut ir = chain_ir();
    ir.edges.push(("n0".into(), "ghost".into()));
    match OperatorLevelScheduler::default().schedule(&ir) {
      Err(RenderError::Config(msg)) => assert!(msg.contains("ghost")),
      other => panic!("expected config error, got {:?}", other.map(|_| ())),
    }
  }

  #[test]
  fn stats_count_optimized_operators() {
    let mut ir = MappedIR::default();
    ir.nodes.push(mapped_node("g", "GRADIENTCOMPUTE", "u0", 6400));
    ir.nodes.push(mapped_node("v", "VOLUME_RENDERING", "u1", 6400));
    let sched = OperatorLevelScheduler::default();
    let result = sched.schedule(&ir).unwrap();
    assert_eq!(result.stats.optimized_operators, 1);
    assert!(result.stats.total_speedup >= 1.0);
  }
}
