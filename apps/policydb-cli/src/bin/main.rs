use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use policydb_core::config::Config;
use policydb_core::traits::{EmbeddingProvider as _, SimilarityIndex as _};
use policydb_core::types::{FeedbackRecord, RankedEvidence};
use policydb_embed::get_default_provider;
use policydb_feedback::{tune, FeedbackLedger, TunerConfig, TuningProvenance, WeightStore};
use policydb_rank::{rank, require_evidence, select_diverse, EvidenceCheck, RankOptions};
use policydb_vector::LancePolicyIndex;

/// What `query` leaves behind for a later `feedback` invocation: the exact
/// evidence the report was drafted from, plus the weight version that
/// produced it.
#[derive(Debug, Serialize, Deserialize)]
struct QueryPayload {
    query_text: String,
    weight_version: u64,
    evidence: Vec<RankedEvidence>,
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() { eprintln!("Usage: {} <query|feedback|tune> [args...]", prog); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "query" => cmd_query(&config, &args)?,
        "feedback" => cmd_feedback(&config, &args)?,
        "tune" => cmd_tune(&config)?,
        _ => { eprintln!("Unknown command: {}", cmd); std::process::exit(1); }
    }
    Ok(())
}

fn cmd_query(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let query_text = args.first().cloned().unwrap_or_else(|| {
        eprintln!("Usage: policydb query \"<proposal text>\" [--top N]");
        std::process::exit(1)
    });
    let mut top_n: usize = config.get("search.top_n").unwrap_or(10);
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--top" {
            if let Some(n) = args.get(i + 1).and_then(|v| v.parse().ok()) { top_n = n; i += 1; }
            else { eprintln!("Error: --top requires a number"); std::process::exit(1); }
        }
        i += 1;
    }

    let weights_path = weights_path(config);
    let store = WeightStore::new(&weights_path);
    // A corrupt weight store aborts the run; ranking with guessed weights
    // would silently change every report.
    let weights = store.load()?;

    let db_path = PathBuf::from(config.get::<String>("data.lancedb_index_dir").unwrap_or_else(|_| "data/indexes/lancedb".to_string()));
    let table: String = config.get("data.passage_table").unwrap_or_else(|_| "passages".to_string());
    let candidate_k: usize = config.get("search.candidate_k").unwrap_or(top_n * 4);
    let timeout_secs: u64 = config.get("search.timeout_secs").unwrap_or(30);
    let diversity_target: usize = config.get("search.diversity_target").unwrap_or(3);
    let min_results: usize = config.get("search.min_results").unwrap_or(3);
    let opts = RankOptions { keywords: config.get("search.keywords").unwrap_or_default() };

    let provider = get_default_provider()?;
    let index = LancePolicyIndex::open(&db_path, &table)?;

    let query_vec = provider.embed_query(&query_text)?;
    let hits = index.query(&query_vec, candidate_k, Duration::from_secs(timeout_secs))?;
    let outcome = rank(&hits, &index, &weights, &opts, top_n);
    let picked = select_diverse(&outcome.evidence, diversity_target, top_n);

    println!("🔍 policydb (weights v{})", weights.version);
    println!("Query: {}", query_text);
    match require_evidence(picked, min_results) {
        EvidenceCheck::Insufficient { found, required } => {
            println!("\n⚠️  Insufficient policy evidence: {} item(s), {} required.", found, required);
        }
        EvidenceCheck::Sufficient(evidence) => {
            println!("\nTop {} evidence item(s):", evidence.len());
            for (i, e) in evidence.iter().enumerate() {
                println!(
                    "\n  {:02}. score={:.4}  dist={:.4}  {}  pp.{}-{}",
                    i + 1, e.final_score, e.raw_distance, e.document_title, e.page_range.0, e.page_range.1
                );
                let excerpt: String = e.excerpt_text.chars().take(220).collect();
                println!("      📝 {}{}", excerpt, if e.excerpt_text.chars().count() > 220 { "..." } else { "" });
            }
            write_payload(config, &QueryPayload { query_text, weight_version: weights.version, evidence })?;
        }
    }
    println!(
        "\nDiagnostics: dropped={} duplicates={} mean_score={:.4}",
        outcome.diagnostics.dropped_hits, outcome.diagnostics.duplicate_hits, outcome.diagnostics.mean_final_score
    );
    Ok(())
}

fn cmd_feedback(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let quality: f64 = args.first().and_then(|v| v.parse().ok()).unwrap_or_else(|| {
        eprintln!("Usage: policydb feedback <quality 0-100> [payload_path]");
        std::process::exit(1)
    });
    let payload_path = args.get(1).map(PathBuf::from).unwrap_or_else(|| payload_path(config));

    let raw = std::fs::read_to_string(&payload_path)
        .map_err(|e| anyhow::anyhow!("cannot read payload {}: {}", payload_path.display(), e))?;
    let payload: QueryPayload = serde_json::from_str(&raw)?;

    let record = FeedbackRecord::new(payload.query_text, payload.evidence, quality, payload.weight_version);
    let ledger = FeedbackLedger::new(ledger_path(config));
    ledger.append(&record)?;
    println!("✅ Appended feedback {} (quality {:.0}) -> {}", record.record_id, quality, ledger.path().display());
    Ok(())
}

fn cmd_tune(config: &Config) -> anyhow::Result<()> {
    let store = WeightStore::new(weights_path(config));
    let current = store.load()?;
    let ledger = FeedbackLedger::new(ledger_path(config));
    let batch_size: usize = config.get("tuner.batch_size").unwrap_or(10);
    let batch = ledger.read_recent(batch_size)?;
    let tuner_cfg: TunerConfig = config.get("tuner").unwrap_or_default();

    if batch.len() < tuner_cfg.min_records {
        println!("Not enough feedback records ({}) to tune (min={}).", batch.len(), tuner_cfg.min_records);
        return Ok(());
    }
    let decision = tune(&batch, &current, &tuner_cfg);
    if decision.is_noop() {
        println!("No change triggered by recent feedback ({} records).", batch.len());
        return Ok(());
    }
    let provenance = TuningProvenance { records: decision.rationale.clone() };
    let committed = store.save(&decision.weights, &provenance)?;
    println!("✅ Weights updated -> v{} ({} change(s) from {} records)", committed.version, decision.changes.len(), batch.len());
    for c in &decision.changes {
        println!("   {}: {:.4} -> {:.4}", c.key, c.before, c.after);
    }
    Ok(())
}

fn weights_path(config: &Config) -> PathBuf {
    PathBuf::from(config.get::<String>("feedback.weights_path").unwrap_or_else(|_| "config/relevance_weights.json".to_string()))
}

fn ledger_path(config: &Config) -> PathBuf {
    PathBuf::from(config.get::<String>("feedback.ledger_path").unwrap_or_else(|_| "logs/feedback/feedback.jsonl".to_string()))
}

fn payload_path(config: &Config) -> PathBuf {
    PathBuf::from(config.get::<String>("feedback.payload_path").unwrap_or_else(|_| "logs/feedback/last_payload.json".to_string()))
}

fn write_payload(config: &Config, payload: &QueryPayload) -> anyhow::Result<()> {
    let path = payload_path(config);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(payload)?)?;
    println!("\n💾 Payload saved to {} (use `policydb feedback <score>` after review)", path.display());
    Ok(())
}
