/// Graph-to-hardware mapping: assign every operator to a concrete hardware
/// unit, falling back to a generic unit type (with a documented performance
/// penalty) when no specialized unit exists.
use crate::error::{RenderError, Result};
use crate::hw::HwConfig;
use crate::ir::{MappedIR, MappedIRNode, OperatorGraph, OperatorNode};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// One degraded-but-available mapping target for an unsupported op type.
#[derive(Debug, Clone)]
pub struct FallbackEntry {
  /// Unit type to run the operator on instead.
  pub unit_op_type: String,
  /// Duration multiplier paid for running on non-specialized hardware.
  pub penalty: f64,
}

/// Explicit fallback registry, constructed once and passed by reference.
/// Entries per op type are tried in order.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
  entries: HashMap<String, Vec<FallbackEntry>>,
}

impl FallbackTable {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, op_type: impl Into<String>, unit_op_type: impl Into<String>, penalty: f64) {
    self.entries.entry(op_type.into()).or_default().push(FallbackEntry {
      unit_op_type: unit_op_type.into(),
      penalty,
    });
  }

  pub fn lookup(&self, op_type: &str) -> Option<&[FallbackEntry]> {
    self.entries.get(op_type).map(Vec::as_slice)
  }

  /// Fallback routes for the neural-rendering operator taxonomy. Penalties
  /// reflect how far the substitute unit's datapath is from the native one:
  /// 1.2x for a sibling unit of the same pipeline stage, 1.5x for a general
  /// compute unit, 2.0x for a last-resort generic unit.
  pub fn builtin() -> Self {
    let mut t = Self::default();
    // Forward rendering stages
    t.insert("SAMPLING", "VOLUME_RENDERING", 1.2);
    t.insert("SAMPLING", "FIELD_COMPUTATION", 1.5);
    t.insert("BLENDING", "VOLUME_RENDERING", 1.2);
    t.insert("RAY_TRACING", "VOLUME_RENDERING", 1.2);
    t.insert("RAY_TRACING", "FIELD_COMPUTATION", 1.5);
    t.insert("HASH_ENCODE", "POSITIONAL_ENCODE", 1.2);
    t.insert("HASH_ENCODE", "FIELD_COMPUTATION", 1.5);
    t.insert("POSITIONAL_ENCODE", "HASH_ENCODE", 1.2);
    t.insert("POSITIONAL_ENCODE", "FIELD_COMPUTATION", 1.5);
    t.insert("MLP", "FIELD_COMPUTATION", 1.0);
    t.insert("VOLUME_RENDERING", "BLENDING", 1.2);
    // Training-stage units
    t.insert("TILEMERGING", "BLENDING", 1.5);
    t.insert("GRADIENTCOMPUTE", "FIELD_COMPUTATION", 1.5);
    t.insert("GRADIENTPRUNING", "OPTIMIZATION", 1.2);
    t.insert("REARRANGEMENT", "OPTIMIZATION", 1.2);
    t.insert("ROWPROCESSING", "FIELD_COMPUTATION", 1.5);
    t.insert("ROWGENERATION", "ENCODING", 1.5);
    t.insert("DECOMPBINNING", "OPTIMIZATION", 1.2);
    t.insert("FRM", "HASH_ENCODE", 1.2);
    t.insert("BUM", "OPTIMIZATION", 1.5);
    // Anything unclassified lands on a generic compute unit
    t.insert("UNKNOWN", "GENERIC", 2.0);
    t
  }
}

/// Assigns graph nodes to hardware units. Load counters live on the engine
/// instance, so one engine must be used per (graph, hw_config) run for
/// reproducible assignments.
#[derive(Debug)]
pub struct MappingEngine {
  fallbacks: FallbackTable,
  load: HashMap<String, u64>,
}

impl MappingEngine {
  pub fn new(fallbacks: FallbackTable) -> Self {
    Self {
      fallbacks,
      load: HashMap::new(),
    }
  }

  /// Map every node of the graph onto a hardware unit, in graph insertion
  /// order. Edges carry over unchanged.
  pub fn map(&mut self, graph: &OperatorGraph, hw: &HwConfig) -> Result<MappedIR> {
    let by_op = hw.units_by_op();

    let mut ir = MappedIR::default();
    for node in graph.nodes() {
      let (unit_id, penalty) = self.select_unit(node, &by_op)?;
      *self.load.entry(unit_id.clone()).or_insert(0) += 1;
      debug!("mapped {} ({}) -> {}", node.id, node.op_type, unit_id);

      let mut attrs = BTreeMap::new();
      let work_elems = node.input_elems().max(1);
      let out_elems = node.output_elems().max(1);
      let bytes = (node.bytes_in + node.bytes_out).max(1);
      attrs.insert("work_elems".into(), work_elems.to_string());
      attrs.insert("out_elems".into(), out_elems.to_string());
      attrs.insert("bytes".into(), bytes.to_string());
      if penalty > 1.0 {
        attrs.insert("fallback_penalty".into(), penalty.to_string());
      }

      ir.nodes.push(MappedIRNode {
        op: node.clone(),
        hw_unit: unit_id,
        attrs,
      });
    }

    ir.edges = graph.edges().to_vec();
    Ok(ir)
  }

  /// Pick the least-loaded capable unit (lowest id on ties); otherwise walk
  /// the fallback table. Backward operators also try their base op type.
  fn select_unit(
    &self,
    node: &OperatorNode,
    by_op: &HashMap<&str, Vec<&crate::hw::HwUnit>>,
  ) -> Result<(String, f64)> {
    let mut probes: Vec<(&str, f64)> = vec![(node.op_type.as_str(), 1.0)];
    if node.is_backward() {
      probes.push((node.base_op_type(), 1.0));
    }
    // Catch-all units accept any op type at native speed.
    probes.push(("*", 1.0));

    for (op_type, penalty) in &probes {
      if let Some(units) = by_op.get(op_type) {
        if let Some(unit) = self.least_loaded(units) {
          return Ok((unit.id.clone(), *penalty));
        }
      }
    }

    // Fallback routes, direct op type first, then the backward base type.
    let mut fallback_keys: Vec<&str> = vec![node.op_type.as_str()];
    if node.is_backward() {
      fallback_keys.push(node.base_op_type());
    }
    for key in fallback_keys {
      if let Some(entries) = self.fallbacks.lookup(key) {
        for entry in entries {
          if let Some(units) = by_op.get(entry.unit_op_type.as_str()) {
            if let Some(unit) = self.least_loaded(units) {
              return Ok((unit.id.clone(), entry.penalty));
            }
          }
        }
      }
    }

    Err(RenderError::Mapping {
      node_id: node.id.clone(),
      op_type: node.op_type.clone(),
    })
  }

  fn least_loaded<'a>(&self, units: &[&'a crate::hw::HwUnit]) -> Option<&'a crate::hw::HwUnit> {
    units
      .iter()
      .min_by(|a, b| {
        let la = self.load.get(&a.id).copied().unwrap_or(0);
        let lb = self.load.get(&b.id).copied().unwrap_or(0);
        la.cmp(&lb).then_with(|| a.id.cmp(&b.id))
      })
      .copied()
  }
}
