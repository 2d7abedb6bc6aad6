use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cluster_anomaly::config::BlobSinkConfig;
use cluster_anomaly::scoring::{BlobLocation, HttpScoringClient, JobRequest};
use cluster_anomaly::sink::{ArtifactSink, BlobSink, DirectorySink};
use cluster_anomaly::{
    analyze, publish, score_and_analyze, AnalysisConfig, AnalysisOutcome, DistanceModel,
    ReferencePolicy, ScoringConfig,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cluster-anomaly")]
#[command(about = "Flags anomalous clusters and points in scored clustering results")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a scored CSV file already on disk
    Analyze {
        /// Scored CSV with a "Cluster Label" column
        input: PathBuf,

        #[command(flatten)]
        options: AnalysisOptions,
    },
    /// Run a remote scoring job, then analyze its result
    Score {
        /// Blob holding the data to score, relative to the service's storage
        #[arg(long)]
        input_location: Option<String>,

        #[command(flatten)]
        options: AnalysisOptions,
    },
}

#[derive(clap::Args)]
struct AnalysisOptions {
    /// JSON file with analysis settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    reference_policy: Option<ReferencePolicy>,

    #[arg(long, value_enum)]
    distance_model: Option<DistanceModel>,

    /// Also flag clusters holding under 5% of all points (mean-cluster-size only)
    #[arg(long)]
    secondary_population_rule: bool,

    /// Directory for result.json and result.csv (default: ./results)
    #[arg(short, long, default_value = "results")]
    out_dir: PathBuf,

    /// Upload to RESULT_CONTAINER_URL instead of writing to --out-dir
    #[arg(long)]
    upload: bool,
}

impl AnalysisOptions {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)
                .with_context(|| format!("loading analysis config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(policy) = self.reference_policy {
            config.reference_policy = policy;
        }
        if let Some(model) = self.distance_model {
            config.distance_model = model;
        }
        if self.secondary_population_rule {
            config.secondary_population_rule = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn sink(&self) -> Result<Box<dyn ArtifactSink>> {
        if self.upload {
            Ok(Box::new(BlobSink::new(BlobSinkConfig::from_env()?)))
        } else {
            Ok(Box::new(DirectorySink::new(self.out_dir.clone())))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Analyze { input, options } => {
            let config = options.analysis_config()?;
            let sink = options.sink()?;
            info!("Analyzing {}", input.display());

            let raw_text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let outcome = analyze(&raw_text, &config)?;
            publish(&outcome.artifacts, sink.as_ref()).await?;
            print_outcome(&outcome);
        }
        Command::Score {
            input_location,
            options,
        } => {
            let config = options.analysis_config()?;
            let sink = options.sink()?;
            let scoring = ScoringConfig::from_env()?;
            let client = HttpScoringClient::new(&scoring);

            let mut request = JobRequest::default();
            if let Some(relative_location) = input_location {
                request.inputs.insert(
                    "input1".to_string(),
                    BlobLocation {
                        relative_location,
                        ..BlobLocation::default()
                    },
                );
            }

            let (report, result) =
                score_and_analyze(&client, &scoring, &request, &config, sink.as_ref()).await;
            info!(
                "Job {} ended as {:?} after {} polls",
                report.job_id.as_deref().unwrap_or("-"),
                report.state,
                report.polls
            );
            match result {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => {
                    error!("Scoring run failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &AnalysisOutcome) {
    println!("\n=== Anomaly Analysis ({}) ===", outcome.run_id);
    println!(
        "{} points in {} clusters, {} rows dropped",
        outcome.collection.total_valid_points(),
        outcome.collection.len(),
        outcome.dropped_rows
    );
    for cluster in outcome.collection.iter() {
        let share = cluster.size() as f64 / outcome.collection.total_valid_points() as f64;
        println!(
            "Cluster {}: share {:.3}, anomaly: {}",
            cluster.id(),
            share,
            if cluster.is_anomalous() { "yes" } else { "no" }
        );
    }
    println!(
        "{} anomalous points in total",
        outcome.collection.anomalous_point_count()
    );
}
