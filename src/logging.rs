//! Diagnostic logging.
//!
//! Logs go to stderr so stdout carries only command output. The filter
//! comes from `TRIAGE_LOG` (any `EnvFilter` directive) and defaults to
//! `warn`. `--debug` overrides it with `debug` for both crates, which
//! prints ranking decisions, prompts and raw oracle replies.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TRIAGE_LOG";

/// Filter for the given verbosity.
pub fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("warn,triage_harness=debug,triage_harness_core=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(debug: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(debug))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_filter_mentions_both_crates() {
        let rendered = filter(true).to_string();
        assert!(rendered.contains("triage_harness=debug"));
        assert!(rendered.contains("triage_harness_core=debug"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false);
        init_tracing(true);
    }
}
