use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_INIT: Once = Once::new();

/// Filter used when neither `RUST_LOG` nor the caller supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Install the global `tracing` subscriber once per process.
///
/// `RUST_LOG` wins when set; otherwise `default_value` (or [`DEFAULT_FILTER`])
/// is used, e.g. `"cosmian_pkcs11_interop=trace,info"`.
/// Later calls are no-ops, so every test may call it first thing.
pub fn log_init(default_value: Option<&str>) {
    LOG_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_value.unwrap_or(DEFAULT_FILTER)));
        tracing_setup(filter);
    });
}

fn tracing_setup(filter: EnvFilter) {
    let format = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_test_writer()
        .compact();

    // another subscriber may already be installed by the host application
    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
    {
        eprintln!("log_init: tracing subscriber not installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::log_init;

    #[test]
    fn log_init_is_idempotent() {
        log_init(Some("debug"));
        log_init(None);
        tracing::debug!("logger initialized twice without panicking");
    }
}
