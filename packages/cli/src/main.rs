#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Uploads package artifacts to S3.
//!
//! ```text
//! s3_deploy upload --config deploy.toml [--bucket NAME] [--package FILE]
//!                  [--staging-dir DIR] [--no-digest] [--dry-run]
//!                  [--outputs service-message|json]
//! s3_deploy validate --config deploy.toml
//! ```
//!
//! Logs at `info` by default; set `RUST_LOG` to change the level.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use s3_deploy_models::config::{is_known_canned_acl, DeploymentConfig, TargetProperties};
use s3_deploy_s3::S3ObjectStore;
use s3_deploy_upload::memory::MemoryStore;
use s3_deploy_upload::output::{CollectedOutputs, ServiceMessageSink};
use s3_deploy_upload::{ObjectStore, UploadOrchestrator, UploadReport};

#[derive(Parser)]
#[command(name = "s3_deploy", about = "Upload package artifacts to an S3 bucket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the configured targets
    Upload {
        #[command(flatten)]
        config: ConfigArgs,
        /// How output bindings are printed
        #[arg(long, value_enum, default_value_t = OutputFormat::ServiceMessage)]
        outputs: OutputFormat,
        /// Resolve and "upload" against an in-memory store; nothing is sent
        #[arg(long)]
        dry_run: bool,
    },
    /// Check the deployment file without contacting the store
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Deployment file (TOML)
    #[arg(long)]
    config: PathBuf,
    /// Override the destination bucket
    #[arg(long)]
    bucket: Option<String>,
    /// Override the package file
    #[arg(long)]
    package: Option<PathBuf>,
    /// Override the staging directory
    #[arg(long)]
    staging_dir: Option<PathBuf>,
    /// Always upload, without comparing content digests
    #[arg(long)]
    no_digest: bool,
}

impl ConfigArgs {
    fn load(&self) -> Result<DeploymentConfig, Box<dyn std::error::Error>> {
        let config = DeploymentConfig::load(&self.config)?;
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: DeploymentConfig) -> DeploymentConfig {
        if let Some(bucket) = &self.bucket {
            config.bucket.clone_from(bucket);
        }
        if let Some(package) = &self.package {
            config.package.clone_from(package);
        }
        if let Some(dir) = &self.staging_dir {
            config.staging_directory = Some(dir.clone());
        }
        if self.no_digest {
            config.content_digest = false;
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `##deploy[setVariable ...]` lines on stdout
    ServiceMessage,
    /// One JSON object on stdout
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Upload {
            config,
            outputs,
            dry_run,
        } => {
            let config = config.load()?;

            let memory;
            let s3;
            let store: &dyn ObjectStore = if dry_run {
                log::info!("Dry run: nothing will be sent to the object store");
                memory = MemoryStore::new();
                &memory
            } else {
                s3 = S3ObjectStore::from_config(&config.store).await;
                &s3
            };

            let report = upload(UploadOrchestrator::new(config, store), outputs).await?;
            log::info!(
                "{} target(s): {}",
                report.stats.total(),
                report.stats
            );
        }
        Commands::Validate { config } => {
            let config = config.load()?;
            warn_unknown_canned_acls(&config);

            let store = MemoryStore::new();
            let orchestrator = UploadOrchestrator::new(config, &store);
            let (bucket, staging_dir) = orchestrator.preflight()?;

            println!("Configuration is valid.");
            println!("  bucket:      {bucket}");
            println!("  mode:        {}", orchestrator.config().mode());
            println!("  package:     {}", orchestrator.config().package.display());
            println!("  staging dir: {}", staging_dir.display());
        }
    }

    Ok(())
}

/// Logs at `info` unless `RUST_LOG` says otherwise.
fn init_logger() {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)
}

async fn upload(
    orchestrator: UploadOrchestrator<'_>,
    format: OutputFormat,
) -> Result<UploadReport, Box<dyn std::error::Error>> {
    match format {
        OutputFormat::ServiceMessage => {
            let mut sink = ServiceMessageSink::new(std::io::stdout());
            Ok(orchestrator.run(&mut sink).await?)
        }
        OutputFormat::Json => {
            let mut sink = CollectedOutputs::new();
            let result = orchestrator.run(&mut sink).await;
            println!("{}", serde_json::to_string_pretty(&sink.to_json())?);
            Ok(result?)
        }
    }
}

/// Logs canned ACLs the store would reject with `InvalidArgument`.
fn warn_unknown_canned_acls(config: &DeploymentConfig) {
    let properties = std::iter::once(&config.entire_package.properties)
        .chain(config.single_files.iter().map(|s| &s.properties))
        .chain(config.file_globs.iter().map(|g| &g.properties));

    for acl in properties
        .filter_map(|p: &TargetProperties| p.canned_acl.as_deref())
        .map(str::trim)
        .filter(|acl| !acl.is_empty() && !is_known_canned_acl(acl))
    {
        log::warn!("Canned ACL '{acl}' is not a recognised canned ACL name");
    }
}
