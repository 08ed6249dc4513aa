//! Process-wide logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process.
///
/// Filtering comes from `RUST_LOG` (default `info`). Output is JSON lines
/// unless `LINKVEND_LOG_FORMAT=pretty` asks for human-readable logs.
/// Safe to call multiple times; only the first call takes effect.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let pretty = std::env::var("LINKVEND_LOG_FORMAT")
        .is_ok_and(|v| v.eq_ignore_ascii_case("pretty"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    if pretty {
        let _ = builder.pretty().try_init();
    } else {
        let _ = builder.json().try_init();
    }
}
