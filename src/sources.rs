use anyhow::Result;

use crate::config::Config;
use crate::vector_index::VectorIndex;

/// Print what the chunk file contains: counts per source kind and per
/// service tag.
pub async fn list_sources(config: &Config) -> Result<()> {
    let index = VectorIndex::open(config).await?;
    let summary = index.summary();

    println!("index: {}", config.index.path.display());
    println!("mode: {}", config.index.mode);
    println!("chunks: {} ({} embedded)", summary.total, summary.embedded);
    println!();

    println!("{:<16} CHUNKS", "SOURCE");
    for (kind, count) in &summary.by_source {
        println!("{:<16} {}", kind.as_str(), count);
    }
    println!();

    println!("{:<16} CHUNKS", "SERVICE");
    for (service, count) in &summary.by_service {
        println!("{:<16} {}", service, count);
    }
    if summary.untagged > 0 {
        println!("{:<16} {}", "(untagged)", summary.untagged);
    }

    Ok(())
}
