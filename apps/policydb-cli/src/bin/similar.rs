use std::env;
use std::path::PathBuf;
use std::time::Duration;

use policydb_core::traits::{EmbeddingProvider as _, SimilarityIndex as _};
use policydb_embed::get_default_provider;
use policydb_vector::LancePolicyIndex;

/// Raw similarity search against the passage index, no re-ranking. Useful
/// for checking what the index itself returns before weights get involved.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [--limit N] [db_path] [table_name]", args[0]);
        eprintln!("Example: {} 'two storey side extension' --limit 5 data/indexes/lancedb passages", args[0]);
        std::process::exit(1);
    }
    let query_text = &args[1];
    let mut limit = 10usize;
    let mut db_path = PathBuf::from("data/indexes/lancedb");
    let mut table_name = "passages".to_string();
    let mut positional = 0usize;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => {
                if let Some(l) = args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) { limit = l; i += 1; }
                else { eprintln!("Error: --limit requires a number"); std::process::exit(1); }
            }
            a if !a.starts_with('-') => {
                if positional == 0 { db_path = PathBuf::from(a); } else { table_name = a.to_string(); }
                positional += 1;
            }
            _ => {}
        }
        i += 1;
    }

    println!("🔍 policydb-similar\n===================");
    println!("Query: {}", query_text);
    println!("Database path: {}", db_path.display());
    println!("Table: {}", table_name);

    let provider = get_default_provider()?;
    let index = LancePolicyIndex::open(&db_path, &table_name)?;
    let query_vec = provider.embed_query(query_text)?;
    let hits = index.query(&query_vec, limit, Duration::from_secs(30))?;

    println!("\n=== Top matches ===");
    for (i, hit) in hits.iter().enumerate() {
        println!("{:02}. dist={:.4}  score={:.4}  id={}", i + 1, hit.raw_distance, policydb_rank::normalize_distance(hit.raw_distance), hit.chunk_id);
    }
    Ok(())
}
