/// Analytic performance model: converts cycle counts into wall-clock
/// latency, throughput, power and energy-efficiency figures.
use crate::error::{RenderError, Result};

/// Wall-clock latency in milliseconds for a cycle count at a clock frequency.
pub fn latency_ms(duration_cycles: u64, frequency_mhz: f64) -> Result<f64> {
  if duration_cycles == 0 {
    return Err(RenderError::InvalidWorkload {
      what: "duration_cycles",
      value: 0.0,
    });
  }
  if frequency_mhz <= 0.0 {
    return Err(RenderError::InvalidWorkload {
      what: "frequency_mhz",
      value: frequency_mhz,
    });
  }
  Ok(duration_cycles as f64 / (frequency_mhz * 1e6) * 1e3)
}

/// Operations per second given total work and the latency it took.
pub fn throughput(total_ops: u64, latency_ms: f64) -> Result<f64> {
  if latency_ms <= 0.0 {
    return Err(RenderError::InvalidWorkload {
      what: "latency_ms",
      value: latency_ms,
    });
  }
  Ok(total_ops as f64 / (latency_ms / 1e3))
}

/// Total power in watts: static power plus dynamic power scaled by the
/// fraction of time the unit is busy.
pub fn power_w(static_w: f64, dynamic_w: f64, utilization: f64) -> Result<f64> {
  if static_w < 0.0 {
    return Err(RenderError::InvalidWorkload {
      what: "static_w",
      value: static_w,
    });
  }
  if dynamic_w < 0.0 {
    return Err(RenderError::InvalidWorkload {
      what: "dynamic_w",
      value: dynamic_w,
    });
  }
  if !(0.0..=1.0).contains(&utilization) {
    return Err(RenderError::InvalidWorkload {
      what: "utilization",
      value: utilization,
    });
  }
  Ok(static_w + dynamic_w * utilization)
}

/// Operations per second per watt.
pub fn energy_efficiency(throughput_ops_s: f64, power_w: f64) -> Result<f64> {
  if power_w <= 0.0 {
    return Err(RenderError::InvalidWorkload {
      what: "power_w",
      value: power_w,
    });
  }
  Ok(throughput_ops_s / power_w)
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn latency_scales_with_frequency() {
    // 1e6 cycles at 1000 MHz is exactly 1 ms.
    assert_relative_eq!(latency_ms(1_000_000, 1000.0).unwrap(), 1.0);
    assert_relative_eq!(latency_ms(1_000_000, 500.0).unwrap(), 2.0);
  }

  #[test]
  fn throughput_and_efficiency_round_trip() {
    let lat = latency_ms(2_000_000, 1000.0).unwrap();
    let tput = throughput(4_000_000, lat).unwrap();
    assert_relative_eq!(tput, 2e9);
    let p = power_w(0.5, 2.0, 0.75).unwrap();
    assert_relative_eq!(p, 2.0);
    assert_relative_eq!(energy_efficiency(tput, p).unwrap(), 1e9);
  }

  #[test]
  fn degenerate_inputs_are_rejected() {
    assert!(latency_ms(0, 1000.0).is_err());
    assert!(latency_ms(1, 0.0).is_err());
    assert!(throughput(1, 0.0).is_err());
    assert!(power_w(1.0, 1.0, 1.5).is_err());
    assert!(power_w(-1.0, 1.0, 0.5).is_err());
    assert!(power_w(1.0, -1.0, 0.5).is_err());
    assert!(energy_efficiency(1.0, 0.0).is_err());
  }
}
