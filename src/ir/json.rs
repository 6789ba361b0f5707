/// Graph-IR JSON exchange format produced by the pipeline authoring layer.
///
/// Each node is `{id, type, sub_type, deps, bitwidth, bytes_in, bytes_out,
/// num_ops}` where `deps` lists predecessor ids. Export assigns ids by
/// insertion order, so export-then-import preserves node count, op types and
/// dependency edges exactly.
use crate::error::{RenderError, Result};
use crate::ir::{DType, OpCategory, OperatorGraph, OperatorNode, TensorDesc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct JsonNode {
  id: u32,
  #[serde(rename = "type")]
  category: String,
  sub_type: String,
  deps: Vec<u32>,
  #[serde(default = "default_bitwidth")]
  bitwidth: u32,
  #[serde(default)]
  bytes_in: u64,
  #[serde(default)]
  bytes_out: u64,
  #[serde(default)]
  num_ops: u64,
}

fn default_bitwidth() -> u32 {
  16
}

/// Parse a Graph-IR JSON document into an OperatorGraph.
pub fn import_graph(json: &str) -> Result<OperatorGraph> {
  let raw: Vec<JsonNode> = serde_json::from_str(json)?;
  let mut graph = OperatorGraph::new();
  let mut ids: HashMap<u32, String> = HashMap::new();

  for jn in &raw {
    let id = format!("n{}", jn.id);
    if ids.insert(jn.id, id.clone()).is_some() {
      return Err(RenderError::Config(format!("duplicate graph IR node id {}", jn.id)));
    }
    let mut node = OperatorNode::new(id, jn.sub_type.clone(), OpCategory::from_str(&jn.category));
    node.bitwidth = jn.bitwidth;
    node.bytes_in = jn.bytes_in;
    node.bytes_out = jn.bytes_out;
    node.num_ops = jn.num_ops;
    let elem_bytes = (jn.bitwidth as u64 / 8).max(1);
    if jn.bytes_in > 0 {
      node.inputs = vec![TensorDesc::new(vec![jn.bytes_in / elem_bytes], DType::F16)];
    }
    if jn.bytes_out > 0 {
      node.outputs = vec![TensorDesc::new(vec![jn.bytes_out / elem_bytes], DType::F16)];
    }
    graph.add_node(node)?;
  }

  for jn in &raw {
    let dst = &ids[&jn.id];
    for dep in &jn.deps {
      let src = ids
        .get(dep)
        .ok_or_else(|| RenderError::Config(format!("node {} depends on unknown node {}", jn.id, dep)))?;
      graph.add_edge(src, dst)?;
    }
  }

  Ok(graph)
}

/// Serialize an OperatorGraph back to the Graph-IR JSON format.
pub fn export_graph(graph: &OperatorGraph) -> Result<String> {
  let index: HashMap<&str, u32> = graph
    .nodes()
    .iter()
    .enumerate()
    .map(|(i, n)| (n.id.as_str(), i as u32))
    .collect();

  let mut out = Vec::with_capacity(graph.len());
  for (i, node) in graph.nodes().iter().enumerate() {
    let deps = graph
      .edges()
      .iter()
      .filter(|(_, dst)| dst == &node.id)
      .map(|(src, _)| index[src.as_str()])
      .collect();
    out.push(JsonNode {
      id: i as u32,
      category: node.category.as_str().to_string(),
      sub_type: node.op_type.clone(),
      deps,
      bitwidth: node.bitwidth,
      bytes_in: node.bytes_in,
      bytes_out: node.bytes_out,
      num_ops: node.num_ops,
    });
  }

  Ok(serde_json::to_string_pretty(&out)?)
}

pub fn load_graph_file(path: &Path) -> Result<OperatorGraph> {
  let content = fs::read_to_string(path)
    .map_err(|e| RenderError::Config(format!("cannot read graph IR {:?}: {}", path, e)))?;
  import_graph(&content)
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"[
    {"id": 0, "type": "Encoding", "sub_type": "HASH_ENCODE", "deps": [], "bitwidth": 16, "bytes_in": 1024, "bytes_out": 2048, "num_ops": 4096},
    {"id": 1, "type": "FieldCompute", "sub_type": "FIELD_COMPUTATION", "deps": [0], "bitwidth": 16, "bytes_in": 2048, "bytes_out": 512, "num_ops": 65536},
    {"id": 2, "type": "Blending", "sub_type": "VOLUME_RENDERING", "deps": [1], "bitwidth": 16, "bytes_in": 512, "bytes_out": 128, "num_ops": 8192}
  ]"#;

  #[test]
  fn import_builds_nodes_and_edges() {
    let g = import_graph(SAMPLE).unwrap();
    assert_eq!(g.len(), 3);
    assert_eq!(g.edges().len(), 2);
    let n0 = g.node("n0").unwrap();
    assert_eq!(n0.op_type, "HASH_ENCODE");
    assert_eq!(n0.category, OpCategory::Encoding);
    assert_eq!(n0.num_ops, 4096);
  }

  #[test]
  fn round_trip_preserves_structure() {
    let g = import_graph(SAMPLE).unwrap();
    let exported = export_graph(&g).unwrap();
    let g2 = import_graph(&exported).unwrap();
    assert_eq!(g2.len(), g.len());
    assert_eq!(g2.edges(), g.edges());
    for (a, b) in g.nodes().iter().zip(g2.nodes()) {
      assert_eq!(a.op_type, b.op_type);
      assert_eq!(a.category, b.category);
      assert_eq!(a.num_ops, b.num_ops);
    }
  }

  #[test]
  fn unknown_dependency_is_a_config_error() {
    let bad = r#"[{"id": 0, "type": "Sampling", "sub_type": "SAMPLING", "deps": [7]}]"#;
    assert!(matches!(import_graph(bad), Err(RenderError::Config(_))));
  }
}
