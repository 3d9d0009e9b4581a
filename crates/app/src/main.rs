mod server;

use clap::{Parser, Subcommand};
use chrono::Utc;
use doc_search_core::{
    DocumentIndex, IngestRequest, IngestSource, IngestionOptions, IngestionOrchestrator,
    ManifestRecordSource, OpenSearchStore, RecordSource, RunManager, RunMode, RunReport,
    SearchService, DEFAULT_BATCH_SIZE, DEFAULT_EXTRACTION_WORKERS, DEFAULT_MAX_RESULTS,
    DEFAULT_RUN_HISTORY,
};
use server::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// Index that receives the documents
    #[arg(long, env = "DOC_SEARCH_INDEX", default_value = "documents_index")]
    index: String,

    /// Documents per bulk request
    #[arg(long, env = "DOC_SEARCH_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Documents extracted concurrently
    #[arg(long, env = "DOC_SEARCH_WORKERS", default_value_t = DEFAULT_EXTRACTION_WORKERS)]
    workers: usize,

    /// Give up on a single document after this many seconds
    #[arg(long, env = "DOC_SEARCH_EXTRACTION_TIMEOUT_SECS")]
    extraction_timeout_secs: Option<u64>,

    /// Give up on a single bulk request after this many seconds
    #[arg(long, env = "DOC_SEARCH_BULK_TIMEOUT_SECS")]
    bulk_timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Index every PDF and DOCX file at the top level of a folder.
    Ingest {
        #[arg(long)]
        folder: PathBuf,
        /// Clear the index first so removed files disappear from it.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Index the files referenced by a JSON-lines record manifest.
    IngestRecords {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Remove every document from the index.
    Clear,
    /// Print the ids of documents whose content matches the query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: usize,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "DOC_SEARCH_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
        /// Manifest used by `POST /ingest` requests without a path.
        #[arg(long, env = "DOC_SEARCH_RECORDS_MANIFEST")]
        records_manifest: Option<PathBuf>,
        /// Finished runs kept for `GET /runs/:id`.
        #[arg(long, env = "DOC_SEARCH_RUN_HISTORY", default_value_t = DEFAULT_RUN_HISTORY)]
        run_history: usize,
    },
}

impl Cli {
    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            batch_size: self.batch_size,
            extraction_workers: self.workers,
            extraction_timeout: self.extraction_timeout_secs.map(Duration::from_secs),
            bulk_timeout: self.bulk_timeout_secs.map(Duration::from_secs),
        }
    }
}

fn mode(rebuild: bool) -> RunMode {
    if rebuild {
        RunMode::Rebuild
    } else {
        RunMode::Append
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let options = cli.ingestion_options();
    let index: Arc<dyn DocumentIndex> =
        Arc::new(OpenSearchStore::new(&cli.opensearch_url, &cli.index));
    let orchestrator = IngestionOrchestrator::new(index.clone(), options)?;

    info!(
        version = app_version,
        index = %cli.index,
        started_at = %Utc::now().to_rfc3339(),
        "doc-search boot"
    );

    match cli.command {
        Command::Ingest { folder, rebuild } => {
            let request = IngestRequest::new(IngestSource::Directory(folder), mode(rebuild));
            ingest(&orchestrator, &request).await?;
        }
        Command::IngestRecords { manifest, rebuild } => {
            let records: Arc<dyn RecordSource> = Arc::new(ManifestRecordSource::new(manifest));
            let request = IngestRequest::new(IngestSource::Records(records), mode(rebuild));
            ingest(&orchestrator, &request).await?;
        }
        Command::Clear => {
            let deleted = orchestrator.lifecycle().clear().await?;
            println!("{deleted} documents removed from {}", cli.index);
        }
        Command::Search { query, max_results } => {
            let hits = SearchService::new(index)
                .with_max_results(max_results)
                .search(&query)
                .await?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no matching documents");
            }
            for hit in hits {
                println!("score={:.4} id={}", hit.score, hit.id);
            }
        }
        Command::Serve {
            bind,
            records_manifest,
            run_history,
        } => {
            if let Err(error) = orchestrator.lifecycle().ensure_index().await {
                warn!(error = %error, "index could not be prepared");
            }
            let state = AppState {
                manager: RunManager::new(Arc::new(orchestrator)).with_history(run_history),
                search: SearchService::new(index),
                records: records_manifest.map(|path| {
                    Arc::new(ManifestRecordSource::new(path)) as Arc<dyn RecordSource>
                }),
            };
            server::serve(&bind, state).await?;
        }
    }

    Ok(())
}

async fn ingest(
    orchestrator: &IngestionOrchestrator,
    request: &IngestRequest,
) -> anyhow::Result<()> {
    orchestrator.lifecycle().ensure_index().await?;
    let report = orchestrator.run(request).await?;
    print_report(&report);

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} documents failed",
            report.failures.len(),
            report.items_seen
        );
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let elapsed = report
        .finished_at
        .map(|finished| (finished - report.started_at).num_milliseconds())
        .unwrap_or_default();

    println!(
        "seen={} extracted={} indexed={} failed={} elapsed_ms={elapsed}",
        report.items_seen,
        report.extracted,
        report.indexed(),
        report.failures.len()
    );
    for failure in &report.failures {
        let status = failure
            .status
            .map(|status| format!(" status={status}"))
            .unwrap_or_default();
        println!(
            "  failed id={} stage={:?} kind={:?}{status} location={} reason={}",
            failure.id, failure.stage, failure.kind, failure.location, failure.reason
        );
    }
}
