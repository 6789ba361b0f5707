use approx::assert_relative_eq;
use rendersim::config::{load_config_file, merge_config, validate_config, AppConfig};
use rendersim::hw::parse_hw_config;
use rendersim::ir::json::{export_graph, import_graph};
use rendersim::mapping::{FallbackTable, MappingEngine};
use rendersim::ppa::ramulator::{DramTimingResult, TimingSource};
use rendersim::ppa::{PPAEstimator, SystemPPAMetrics};
use rendersim::schedule::{is_conflict_free, OperatorLevelScheduler};
use rendersim::util::log::init_log;
use rendersim::RenderError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

const CHAIN_GRAPH: &str = r#"[
  {"id": 0, "type": "Encoding", "sub_type": "HASH_ENCODE", "deps": [], "bitwidth": 16, "bytes_in": 4096, "bytes_out": 8192, "num_ops": 16384},
  {"id": 1, "type": "FieldCompute", "sub_type": "FIELD_COMPUTATION", "deps": [0], "bitwidth": 16, "bytes_in": 8192, "bytes_out": 2048, "num_ops": 262144},
  {"id": 2, "type": "Blending", "sub_type": "VOLUME_RENDERING", "deps": [1], "bitwidth": 16, "bytes_in": 2048, "bytes_out": 512, "num_ops": 32768}
]"#;

const CHAIN_HW: &str = r#"{
  "accelerator_name": "ICARUS",
  "description": "encode and render share one unit",
  "hw_units": [
    {"id": "u0", "supported_ops": ["HASH_ENCODE", "VOLUME_RENDERING"], "frequency_mhz": 1000.0},
    {"id": "u1", "supported_ops": ["FIELD_COMPUTATION"], "frequency_mhz": 1000.0}
  ]
}"#;

#[test]
fn chain_schedule_respects_dependencies_and_unit_exclusivity() {
  init_log(true);
  let graph = import_graph(CHAIN_GRAPH).unwrap();
  let hw = parse_hw_config(CHAIN_HW).unwrap();

  let mut engine = MappingEngine::new(FallbackTable::builtin());
  let mapped = engine.map(&graph, &hw).unwrap();
  assert_eq!(mapped.node("n0").unwrap().hw_unit, "u0");
  assert_eq!(mapped.node("n1").unwrap().hw_unit, "u1");
  assert_eq!(mapped.node("n2").unwrap().hw_unit, "u0");

  let scheduled = OperatorLevelScheduler::default().schedule(&mapped).unwrap();
  assert_eq!(scheduled.nodes.len(), graph.len());
  assert!(is_conflict_free(&scheduled));

  let n0 = scheduled.node("n0").unwrap();
  let n1 = scheduled.node("n1").unwrap();
  let n2 = scheduled.node("n2").unwrap();
  assert_eq!(n0.start_cycle, 0);
  assert!(n1.start_cycle >= n0.finish_cycle());
  // The last node waits for both its parent and its shared unit.
  assert!(n2.start_cycle >= n1.finish_cycle().max(n0.finish_cycle()));
  assert_eq!(scheduled.total_cycles(), n2.finish_cycle());
}

#[test]
fn unsupported_operator_fails_with_node_and_type() {
  let graph = import_graph(
    r#"[{"id": 0, "type": "Unknown", "sub_type": "RAY_MARCH_X", "deps": [], "bytes_in": 64, "bytes_out": 64}]"#,
  )
  .unwrap();
  let hw = parse_hw_config(CHAIN_HW).unwrap();
  let mut engine = MappingEngine::new(FallbackTable::builtin());
  match engine.map(&graph, &hw) {
    Err(RenderError::Mapping { node_id, op_type }) => {
      assert_eq!(node_id, "n0");
      assert_eq!(op_type, "RAY_MARCH_X");
    }
    other => panic!("expected mapping failure, got {:?}", other.map(|_| ())),
  }
}

#[test]
fn accuracy_validation_against_reference_silicon() {
  let reference = SystemPPAMetrics {
    total_area_mm2: 7.6,
    total_power_mw: 400.0,
    total_execution_time_ns: 1000.0,
    per_module: BTreeMap::new(),
    dram: DramTimingResult::default(),
    timing_source: TimingSource::External,
  };
  let estimated = SystemPPAMetrics {
    total_area_mm2: 6.9,
    total_power_mw: 380.0,
    total_execution_time_ns: 980.0,
    per_module: BTreeMap::new(),
    dram: DramTimingResult::default(),
    timing_source: TimingSource::AnalyticFallback,
  };
  let v = PPAEstimator::validate_accuracy(&estimated, &reference);
  assert_relative_eq!(v.overall_error_percent, 5.4035, epsilon = 1e-3);
  assert!(v.meets_target_accuracy);
}

#[test]
fn end_to_end_estimate_falls_back_to_analytic_dram() {
  init_log(true);
  let graph = import_graph(CHAIN_GRAPH).unwrap();
  let hw = parse_hw_config(CHAIN_HW).unwrap();

  let mut engine = MappingEngine::new(FallbackTable::builtin());
  let mapped = engine.map(&graph, &hw).unwrap();
  let scheduled = OperatorLevelScheduler::default().schedule(&mapped).unwrap();

  let config = AppConfig::default();
  let dram = config.ramulator_config(&hw.accelerator_name);
  let estimator = PPAEstimator::new(PathBuf::from("/nonexistent/hardware"), dram);
  let metrics = estimator.estimate(&scheduled, &hw).unwrap();

  assert_eq!(metrics.timing_source, TimingSource::AnalyticFallback);
  assert_eq!(metrics.per_module.len(), 2);
  assert!(metrics.total_area_mm2 > 0.0);
  assert!(metrics.total_power_mw > 0.0);
  // Memory time stacks on top of the compute schedule.
  assert!(metrics.total_execution_time_ns > scheduled.total_cycles() as f64);
  assert_relative_eq!(metrics.dram.peak_bandwidth_gb_s, 102.4);

  let report = estimator.report(&metrics);
  assert!(report.contains("u0"));
  assert!(report.contains("analytic"));
}

#[test]
fn optimized_durations_never_exceed_base() {
  let graph = import_graph(
    r#"[
      {"id": 0, "type": "Encoding", "sub_type": "HASH_ENCODE", "deps": [], "bytes_in": 65536, "bytes_out": 65536, "num_ops": 1048576},
      {"id": 1, "type": "Encoding", "sub_type": "HASH_ENCODE (B)", "deps": [0], "bytes_in": 65536, "bytes_out": 65536, "num_ops": 1048576},
      {"id": 2, "type": "Optimization", "sub_type": "GRADIENTCOMPUTE", "deps": [1], "bytes_in": 32768, "bytes_out": 32768, "num_ops": 524288}
    ]"#,
  )
  .unwrap();
  let hw = parse_hw_config(
    r#"{"accelerator_name": "NeuRex", "hw_units": [
      {"id": "enc", "supported_ops": ["HASH_ENCODE"], "frequency_mhz": 1000.0},
      {"id": "grad", "supported_ops": ["GRADIENTCOMPUTE"], "frequency_mhz": 1000.0}
    ]}"#,
  )
  .unwrap();

  let mut engine = MappingEngine::new(FallbackTable::builtin());
  let mapped = engine.map(&graph, &hw).unwrap();
  let scheduled = OperatorLevelScheduler::default().schedule(&mapped).unwrap();

  for node in &scheduled.nodes {
    assert!(node.duration <= node.opt.base_duration);
    assert!(node.opt.speedup_factor >= 1.0);
  }
  // Every operator here has a matching strategy.
  assert_eq!(scheduled.stats.optimized_operators, 3);
  assert!(scheduled.stats.total_speedup > 1.0);
}

#[test]
fn graph_round_trip_survives_export() {
  let graph = import_graph(CHAIN_GRAPH).unwrap();
  let again = import_graph(&export_graph(&graph).unwrap()).unwrap();
  assert_eq!(again.len(), graph.len());
  assert_eq!(again.edges(), graph.edges());
}

#[test]
fn config_file_drives_a_full_run() {
  let mut graph_file = tempfile::NamedTempFile::new().unwrap();
  graph_file.write_all(CHAIN_GRAPH.as_bytes()).unwrap();
  let mut hw_file = tempfile::NamedTempFile::new().unwrap();
  hw_file.write_all(CHAIN_HW.as_bytes()).unwrap();

  let mut config_file = tempfile::NamedTempFile::new().unwrap();
  writeln!(
    config_file,
    "[run]\ngraph = {:?}\nhw_config = {:?}\nquiet = true\n",
    graph_file.path(),
    hw_file.path()
  )
  .unwrap();

  let config = merge_config(AppConfig::default(), load_config_file(config_file.path()).unwrap());
  validate_config(&config).unwrap();

  let graph = rendersim::ir::json::load_graph_file(PathBuf::from(&config.run.graph).as_path()).unwrap();
  let hw = rendersim::hw::load_hw_config(PathBuf::from(&config.run.hw_config).as_path()).unwrap();
  let mut engine = MappingEngine::new(FallbackTable::builtin());
  let scheduled = OperatorLevelScheduler::default()
    .schedule(&engine.map(&graph, &hw).unwrap())
    .unwrap();
  assert_eq!(scheduled.stats.total_operators, 3);
}
