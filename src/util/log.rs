/// Logger initialization, shared by the binary and integration tests.
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize env_logger once. `RUST_LOG` overrides the default level;
/// quiet mode keeps warnings and errors only.
pub fn init_log(quiet: bool) {
  INIT.call_once(|| {
    let default_level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
  });
}
