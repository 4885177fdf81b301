//! # Triage Harness CLI (`triage`)
//!
//! The `triage` binary explains infrastructure failure symptoms using only
//! retrieved documentation, and exposes the retrieval layers underneath
//! for inspection.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage run --symptom "<text>"` | Run the grounded reasoning loop |
//! | `triage search "<query>"` | Ranked retrieval, optionally scoped to a service |
//! | `triage route "<query>"` | Show service routing and per-service evidence |
//! | `triage sources` | Summarise the chunk file |
//!
//! ## Examples
//!
//! ```bash
//! # Explain a scheduling failure, letting the router pick services
//! triage run --symptom "Instance failed to spawn: NoValidHost"
//!
//! # Same, scoped to nova
//! triage run --symptom "Instance failed to spawn: NoValidHost" --service nova
//!
//! # Inspect ranking factors
//! triage search "security group rules" --service neutron --explain
//!
//! # Show ranking and prompts on stderr
//! triage --debug run --symptom "volume stuck in attaching"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use triage_harness::{config, logging, search, sources, triage};

/// Triage Harness CLI: evidence-first troubleshooting for infrastructure
/// failure symptoms.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Triage Harness: grounded troubleshooting of infrastructure failure symptoms",
    version,
    long_about = "Triage Harness retrieves documentation chunks, re-ranks them by source trust \
    and relevance, routes queries to the services they concern, and drives a bounded \
    Thought/Action/Observation/Final loop against a language model that may only conclude \
    from retrieved evidence."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    /// Log ranking decisions, prompts and raw replies to stderr.
    ///
    /// Overrides `TRIAGE_LOG`.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain a failure symptom from retrieved evidence.
    ///
    /// Prints the raw model replies (`=== TRACE ===`) and then the final
    /// answer (`=== RESULT ===`).
    Run {
        /// Observed failure, e.g. an error message or log excerpt.
        #[arg(long)]
        symptom: String,

        /// Scope every search to this service. Without it, queries are
        /// routed to the services the evidence points at.
        #[arg(long)]
        service: Option<String>,

        /// Print only the result.
        #[arg(long)]
        no_trace: bool,

        /// Print the full outcome (answer, resolution, trace) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ranked retrieval for a query.
    Search {
        query: String,

        /// Only return chunks tagged with this service.
        #[arg(long)]
        service: Option<String>,

        /// Maximum number of results (defaults to `ranking.top_k`).
        #[arg(long)]
        limit: Option<usize>,

        /// Show the per-rule score factors.
        #[arg(long)]
        explain: bool,
    },

    /// Route a query across services and show the evidence per service.
    Route {
        query: String,

        /// Results per service (defaults to `ranking.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Summarise the configured chunk file.
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.debug);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            symptom,
            service,
            no_trace,
            json,
        } => {
            triage::run_triage(&cfg, &symptom, service, !no_trace, json).await?;
        }
        Commands::Search {
            query,
            service,
            limit,
            explain,
        } => {
            search::run_search(&cfg, &query, service, limit, explain).await?;
        }
        Commands::Route { query, limit } => {
            search::run_route(&cfg, &query, limit).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
    }

    Ok(())
}
