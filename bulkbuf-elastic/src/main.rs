use anyhow::{Context, Result};
use bulkbuf_core::{BatchIndexer, IndexerConfig, Message};
use bulkbuf_elastic::{ElasticConfig, ElasticConnectionProvider};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Stream NDJSON documents into Elasticsearch through a bulk-indexing buffer.
///
/// Connection settings come from the ELASTICSEARCH_* environment variables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Destination index
    #[arg(short, long)]
    index: String,

    /// Top-level field to use as the document id
    #[arg(long)]
    id_field: Option<String>,

    /// Legacy mapping type sent with every document
    #[arg(long)]
    doc_type: Option<String>,

    /// Read documents from this file instead of stdin
    #[arg(short = 'f', long)]
    input: Option<PathBuf>,

    /// Override the flush threshold in bytes
    #[arg(long)]
    max_batch_size_bytes: Option<usize>,

    /// Override the staleness bound in seconds
    #[arg(long)]
    max_batch_interval: Option<u64>,

    /// Inbound queue capacity
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Skip the cluster health check on startup
    #[arg(long)]
    no_healthcheck: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut elastic = ElasticConfig::from_env()?;

    let filter = EnvFilter::try_new(&elastic.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.no_healthcheck {
        elastic = elastic.with_healthcheck(false);
    }

    let mut config = elastic.indexer_config(IndexerConfig::default());
    if let Some(bytes) = args.max_batch_size_bytes {
        config = config.with_max_batch_size_bytes(bytes);
    }
    if let Some(secs) = args.max_batch_interval {
        config = config.with_max_batch_interval(Duration::from_secs(secs));
    }
    if let Some(capacity) = args.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }

    let provider = ElasticConnectionProvider::new(elastic);
    let indexer = Arc::new(BatchIndexer::create(config, &provider).await?);
    let worker = indexer.spawn()?;

    let submitted = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            submit_lines(&indexer, &args, BufReader::new(file)).await
        }
        None => submit_lines(&indexer, &args, BufReader::new(tokio::io::stdin())).await,
    };

    indexer.shutdown().await;
    worker.await??;
    let submitted = submitted?;

    let stats = indexer.stats().await;
    info!(
        "submitted {} documents: {} indexed, {} failed, {} failed flushes",
        submitted, stats.documents_indexed, stats.documents_failed, stats.failed_flushes
    );
    Ok(())
}

async fn submit_lines<R>(indexer: &BatchIndexer, args: &Args, reader: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut submitted = 0;
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut msg = Message::new(&args.index, line);
        if let Some(doc_type) = &args.doc_type {
            msg = msg.with_doc_type(doc_type);
        }
        if let Some(field) = &args.id_field {
            match document_id(line, field) {
                Some(id) => msg = msg.with_id(id),
                None => warn!("line {line_number} has no usable {field:?} field; id left unset"),
            }
        }

        indexer.submit(msg).await?;
        submitted += 1;
    }

    Ok(submitted)
}

fn document_id(line: &str, field: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(line).ok()?;
    match doc.get(field)? {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_extraction() {
        assert_eq!(document_id(r#"{"id":"abc"}"#, "id").as_deref(), Some("abc"));
        assert_eq!(document_id(r#"{"id":42}"#, "id").as_deref(), Some("42"));
        assert_eq!(document_id(r#"{"id":null}"#, "id"), None);
        assert_eq!(document_id(r#"{"other":1}"#, "id"), None);
        assert_eq!(document_id("not json", "id"), None);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "bulkbuf",
            "--index",
            "logs",
            "--id-field",
            "uuid",
            "--max-batch-size-bytes",
            "1024",
            "--no-healthcheck",
        ])
        .unwrap();

        assert_eq!(args.index, "logs");
        assert_eq!(args.id_field.as_deref(), Some("uuid"));
        assert_eq!(args.max_batch_size_bytes, Some(1024));
        assert!(args.no_healthcheck);
        assert!(args.input.is_none());
    }
}
