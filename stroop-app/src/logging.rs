//! Subscriber setup for the `stroop` binary.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `info` everywhere, with the pixels backend held to warnings
const DEFAULT_DIRECTIVES: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Directives from `RUST_LOG` when they parse, the defaults otherwise
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_tracing() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::registry()
        .with(env_filter(rust_log.as_deref()))
        .with(fmt::layer().compact().with_line_number(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults() {
        for rust_log in [None, Some(""), Some("stroop=[")] {
            let filter = env_filter(rust_log).to_string();
            assert!(filter.contains("naga=warn"), "{:?} gave {}", rust_log, filter);
        }
    }

    #[test]
    fn rust_log_wins_when_it_parses() {
        let filter = env_filter(Some("stroop_experiment=debug")).to_string();
        assert!(filter.contains("stroop_experiment=debug"));
        assert!(!filter.contains("naga"));
    }
}
