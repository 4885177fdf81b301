//! The `triage run` command.
//!
//! Wires the configured index and oracle into a [`Controller`], runs one
//! invocation, and prints the reasoning trace followed by the answer:
//!
//! ```text
//! === TRACE ===
//! Thought: ...
//! Action: search_docs(query="...")
//! ---
//! Final: ...
//!
//! === RESULT ===
//! <answer>
//! ```
//!
//! With `--json` the whole [`Outcome`] is printed instead. If the oracle
//! or index fails mid-run, the replies received so far go to stderr and
//! the command exits non-zero.

use anyhow::Result;

use triage_harness_core::agent::{Controller, Outcome, Trace};
use triage_harness_core::oracle::Oracle;
use triage_harness_core::router::Router;

use crate::config::Config;
use crate::oracle::create_oracle;
use crate::timeout::{TimedIndex, TimedOracle};
use crate::vector_index::VectorIndex;

/// The controller as assembled from configuration.
pub type TriageController = Controller<TimedIndex<VectorIndex>, TimedOracle<Box<dyn Oracle>>>;

/// Open the index, create the oracle and wrap both in their deadlines.
pub async fn build_controller(config: &Config) -> Result<TriageController> {
    let index = VectorIndex::open(config).await?;
    let oracle = create_oracle(&config.oracle)?;
    let router = Router::new(
        TimedIndex::new(index, config.agent.index_timeout()),
        config.ranking_policy(),
        config.router_params(),
    );
    Ok(Controller::new(
        router,
        TimedOracle::new(oracle, config.oracle.timeout()),
        config.agent_settings(),
    ))
}

pub async fn run_triage(
    config: &Config,
    symptom: &str,
    service: Option<String>,
    show_trace: bool,
    json: bool,
) -> Result<()> {
    let controller = build_controller(config).await?;
    let service = service.filter(|s| !s.trim().is_empty());

    match controller.run(symptom, service.as_deref()).await {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", format_report(&outcome, show_trace));
            }
            Ok(())
        }
        Err(aborted) => {
            if show_trace && !aborted.trace.replies.is_empty() {
                eprint!("{}", format_trace(&aborted.trace));
            }
            Err(anyhow::Error::new(aborted.error))
        }
    }
}

/// Raw oracle replies separated by `---`.
pub fn format_trace(trace: &Trace) -> String {
    format!("=== TRACE ===\n{}\n\n", trace.replies.join("\n---\n"))
}

pub fn format_report(outcome: &Outcome, show_trace: bool) -> String {
    let mut out = String::new();
    if show_trace {
        out.push_str(&format_trace(&outcome.trace));
    }
    out.push_str("=== RESULT ===\n");
    out.push_str(&outcome.answer);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_harness_core::agent::Resolution;

    fn outcome() -> Outcome {
        Outcome {
            answer: "No host passed the filters.".to_string(),
            resolution: Resolution::Grounded,
            evidence_found: true,
            trace: Trace {
                steps: Vec::new(),
                replies: vec![
                    "Thought: check scheduler\nAction: search_docs(query=\"NoValidHost\")".to_string(),
                    "Final: No host passed the filters.".to_string(),
                ],
            },
        }
    }

    #[test]
    fn test_report_with_trace() {
        let report = format_report(&outcome(), true);
        assert!(report.starts_with("=== TRACE ===\nThought: check scheduler"));
        assert!(report.contains("\n---\nFinal:"));
        assert!(report.ends_with("=== RESULT ===\nNo host passed the filters.\n"));
    }

    #[test]
    fn test_report_without_trace() {
        let report = format_report(&outcome(), false);
        assert_eq!(report, "=== RESULT ===\nNo host passed the filters.\n");
    }
}
