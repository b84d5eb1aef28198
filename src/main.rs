use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use claimsight::app::RunPipelineUseCase;
use claimsight::config::Config;
use claimsight::explain::ExplanationService;
use claimsight::infra::{CsvClaimSource, HttpExplainer, NdjsonPartitionSink};
use claimsight::pipeline::ingestion::synthetic;
use claimsight::{logging, observability, server};

#[derive(Parser)]
#[command(name = "claimsight")]
#[command(about = "Data-quality and fraud-triage pipeline for healthcare claims")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic claims CSV with injected anomalies
    Synth {
        /// Output CSV path
        #[arg(long, default_value = "data/claims.csv")]
        out: PathBuf,
        /// Number of base claims before anomaly injection
        #[arg(long, default_value_t = 2000)]
        count: usize,
        /// RNG seed; same seed reproduces the same file
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Run the full pipeline: ingest, normalize, flag, aggregate, publish
    Run {
        /// Claims CSV to ingest (overrides the config file)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory the gold partitions are published to
        #[arg(long)]
        gold_dir: Option<PathBuf>,
        /// |z| threshold for every outlier check
        #[arg(long)]
        threshold: Option<f64>,
        /// Number of worst anomalies to explain
        #[arg(long)]
        explain_top: Option<usize>,
    },
    /// Serve the read-only API over published gold outputs
    Serve {
        #[arg(long)]
        gold_dir: Option<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Synth { out, count, seed } => {
            synthetic::generate_claims_csv(&out, count, seed)?;
            println!("📄 Wrote synthetic claims to {}", out.display());
        }
        Commands::Run {
            input,
            gold_dir,
            threshold,
            explain_top,
        } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&config.data.claims_csv));
            let gold_dir = gold_dir.unwrap_or_else(|| PathBuf::from(&config.data.gold_dir));
            let threshold = threshold.unwrap_or(config.dq.zscore_threshold);
            let explain_top = explain_top.unwrap_or(config.dq.explain_top_n);

            let explainer = if config.explainer.endpoint.is_empty() {
                info!("no explainer endpoint configured, using templated explanations");
                ExplanationService::local_only()
            } else {
                ExplanationService::new(
                    Some(Box::new(HttpExplainer::new(
                        config.explainer.endpoint.clone(),
                        config.explainer.model.clone(),
                    ))),
                    Duration::from_secs(config.explainer.timeout_secs),
                )
            };

            let use_case = RunPipelineUseCase::new(
                Box::new(CsvClaimSource::new(input)),
                Box::new(NdjsonPartitionSink::new(gold_dir.clone())),
                explainer,
                threshold,
                explain_top,
            );

            match use_case.run().await {
                Ok(summary) => {
                    println!("\n📊 Pipeline Results (run {}):", summary.run_id);
                    println!("   Total claims: {}", summary.total_claims);
                    println!("   Clean: {}", summary.clean_claims);
                    println!(
                        "   Anomalous: {} ({:.1}%)",
                        summary.anomalous_claims,
                        summary.anomaly_rate()
                    );
                    println!("   Explanations: {}", summary.explanations_generated);
                    println!("\n   Flags raised:");
                    for (flag, count) in &summary.reason_counts {
                        println!("     {}: {}", flag, count);
                    }
                    println!("\n   Output dir: {}", gold_dir.display());
                }
                Err(e) => {
                    error!("Pipeline failed: {e}");
                    return Err(e.into());
                }
            }
        }
        Commands::Serve { gold_dir, host, port } => {
            observability::metrics::init()?;
            let gold_dir = gold_dir.unwrap_or_else(|| PathBuf::from(&config.data.gold_dir));
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            server::run_server(addr, gold_dir).await?;
        }
    }

    Ok(())
}
