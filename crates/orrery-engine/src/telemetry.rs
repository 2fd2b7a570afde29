//! `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` is used (see
/// [`EngineConfig::log_filter`](crate::config::EngineConfig::log_filter)).
/// Returns `false` if a global subscriber was already installed, which is
/// common in tests.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_refused() {
        // Either this call or another test's installed the subscriber.
        init_tracing("warn");
        assert!(!init_tracing("debug"));
    }
}
