use anyhow::Result;

use triage_harness_core::evidence::EvidenceBundle;
use triage_harness_core::models::Candidate;
use triage_harness_core::router::Router;
use triage_harness_core::text::prefix_chars;

use crate::config::Config;
use crate::timeout::TimedIndex;
use crate::vector_index::VectorIndex;

const SNIPPET_CHARS: usize = 240;

async fn open_router(config: &Config) -> Result<Router<TimedIndex<VectorIndex>>> {
    let index = VectorIndex::open(config).await?;
    Ok(Router::new(
        TimedIndex::new(index, config.agent.index_timeout()),
        config.ranking_policy(),
        config.router_params(),
    ))
}

/// Ranked retrieval for one query, optionally scoped to a service.
pub async fn run_search(
    config: &Config,
    query: &str,
    service: Option<String>,
    limit: Option<usize>,
    explain: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let router = open_router(config).await?;
    let k = limit.unwrap_or(config.ranking.top_k);
    let candidates = router
        .retrieve(query, service.as_deref(), k, explain)
        .await?;

    if candidates.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, candidate) in candidates.iter().enumerate() {
        print_candidate(i + 1, candidate, "");
    }
    Ok(())
}

/// Show which services a query routes to and the evidence gathered for
/// each.
pub async fn run_route(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let router = open_router(config).await?;
    let k = limit.unwrap_or(config.ranking.top_k);
    let bundle = router.route(query, None, k).await?;

    match &bundle {
        _ if bundle.is_empty() => println!("No results."),
        EvidenceBundle::Flat(candidates) => {
            println!("(no service tags in pool; unrouted results)");
            println!();
            for (i, candidate) in candidates.iter().enumerate() {
                print_candidate(i + 1, candidate, "");
            }
        }
        EvidenceBundle::ByService(groups) => {
            for group in groups {
                println!(
                    "== {} (aggregate {:.3}, {} results) ==",
                    group.service,
                    group.aggregate_score,
                    group.candidates.len()
                );
                for (i, candidate) in group.candidates.iter().enumerate() {
                    print_candidate(i + 1, candidate, "  ");
                }
            }
        }
    }
    Ok(())
}

fn print_candidate(rank: usize, candidate: &Candidate, indent: &str) {
    let chunk = &candidate.chunk;
    println!(
        "{}{}. [{:.3}] {} / {}",
        indent,
        rank,
        candidate.score,
        chunk.source,
        chunk.heading.as_deref().unwrap_or("(no heading)")
    );
    println!(
        "{}    service: {}",
        indent,
        chunk.service.as_deref().unwrap_or("unknown")
    );
    if let Some(ref url) = chunk.url {
        println!("{}    url: {}", indent, url);
    }
    if let Some(ref b) = candidate.explain {
        println!(
            "{}    explain: raw={:.3} source={:.2} service={:.2} heading={:.2} keyword={:.2}",
            indent, b.raw_score, b.source_penalty, b.service_boost, b.heading_boost, b.keyword_boost
        );
    }
    println!(
        "{}    excerpt: \"{}\"",
        indent,
        prefix_chars(&chunk.text, SNIPPET_CHARS).replace('\n', " ").trim()
    );
    println!("{}    id: {}", indent, chunk.id);
    println!();
}
