pub mod config;
pub mod error;
pub mod hw;
pub mod ir;
pub mod mapping;
pub mod optimize;
pub mod perf;
pub mod ppa;
pub mod schedule;
pub mod util;

pub use error::{RenderError, Result};
pub use hw::{HwConfig, HwUnit};
pub use ir::{MappedIR, OperatorGraph, OperatorNode, ScheduledIR};
pub use mapping::{FallbackTable, MappingEngine};
pub use optimize::{OptimizationLibrary, OptimizationStrategy};
pub use ppa::ramulator::Ramulator2Config;
pub use ppa::{PPAEstimator, SystemPPAMetrics};
pub use schedule::OperatorLevelScheduler;
