use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use spamdetect::{
    ArtifactManager, ArtifactSource, ClassifierError, InferenceService, ServiceConfig, SpamLabel, Verdict,
};

const PROGRESS_WIDTH: usize = 40;

#[derive(Parser)]
#[command(author, version, about = "Classify email text as spam or ham", long_about = None)]
struct Args {
    /// JSON config file; flags and SPAMDETECT_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the artifact bundle
    #[arg(long, global = true)]
    artifacts_dir: Option<PathBuf>,

    /// Vectorizer artifact, relative to the artifacts directory
    #[arg(long, global = true)]
    vectorizer: Option<String>,

    /// Classifier artifact, relative to the artifacts directory
    #[arg(long, global = true)]
    classifier: Option<String>,

    /// Skip checking the artifacts against manifest.json
    #[arg(long, global = true)]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one email message
    Classify {
        /// Message text; read from --file or stdin when omitted
        text: Option<String>,

        /// Read the message from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the loaded artifact bundle
    Info,
    /// Write manifest.json with the SHA-256 of the current artifacts
    Checksum {
        /// Additional files in the artifacts directory to record, e.g. an ONNX graph
        #[arg(long)]
        extra: Vec<String>,
    },
    /// Download the artifact bundle
    Fetch {
        #[arg(long)]
        vectorizer_url: String,
        #[arg(long)]
        classifier_url: String,
        #[arg(long)]
        vectorizer_sha256: Option<String>,
        #[arg(long)]
        classifier_sha256: Option<String>,
        /// Force a fresh download even if verified artifacts exist
        #[arg(long)]
        fresh: bool,
    },
}

fn resolve_config(args: &Args) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?
            .with_env_overrides(),
        None => ServiceConfig::from_env(),
    };
    if let Some(dir) = &args.artifacts_dir {
        config.artifacts_dir = dir.clone();
    }
    if let Some(file) = &args.vectorizer {
        config.vectorizer_file = file.clone();
    }
    if let Some(file) = &args.classifier {
        config.classifier_file = file.clone();
    }
    if args.no_verify {
        config.verify_checksums = false;
    }
    Ok(config)
}

fn artifact_manager(config: &ServiceConfig) -> Result<ArtifactManager> {
    Ok(ArtifactManager::new(&config.artifacts_dir)
        .with_context(|| format!("cannot create {}", config.artifacts_dir.display()))?
        .with_file_names(&config.vectorizer_file, &config.classifier_file))
}

fn read_message(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
    Ok(buffer)
}

fn progress_bar(percentage: u8) -> String {
    let filled = PROGRESS_WIDTH * percentage as usize / 100;
    format!("[{}{}] {:>3}%", "#".repeat(filled), "-".repeat(PROGRESS_WIDTH - filled), percentage)
}

fn print_verdict(verdict: &Verdict) {
    match verdict.label {
        SpamLabel::Spam => {
            println!("🚨 Spam detected");
            println!("This email is likely Spam.");
            println!("{}", progress_bar(verdict.display_percentage()));
            println!("Spam probability: {:.2}%", verdict.spam_probability);
            println!("Be cautious with links, attachments, and requests for sensitive information.");
        }
        SpamLabel::Ham => {
            println!("✅ Ham (Not Spam)");
            println!("This email appears Safe.");
            println!("{}", progress_bar(verdict.display_percentage()));
            println!("Ham probability: {:.2}%", verdict.ham_probability);
            println!("Always stay alert for phishing patterns even in legitimate-looking emails.");
        }
    }
    println!();
    println!("Ham (Not Spam): {:.2}%", verdict.ham_probability);
    println!("Spam:           {:.2}%", verdict.spam_probability);
}

fn load_service(config: &ServiceConfig) -> Result<InferenceService> {
    let start_time = Instant::now();
    let service = InferenceService::load(config)
        .with_context(|| format!("failed to load artifacts from {}", config.artifacts_dir.display()))?;
    info!("Artifacts loaded in {:.2?}", start_time.elapsed());
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<()> {
    spamdetect::init_logger();
    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Command::Classify { text, file, json } => {
            // validate before paying for the artifact load
            let message = read_message(text, file)?;
            if message.trim().is_empty() {
                bail!(ClassifierError::EmptyInput);
            }

            let service = load_service(&config)?;
            let verdict = service.classify_text(&message)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                print_verdict(&verdict);
            }
        }
        Command::Info => {
            let service = load_service(&config)?;
            println!("{}", serde_json::to_string_pretty(&service.info())?);
        }
        Command::Checksum { extra } => {
            let manager = artifact_manager(&config)?;
            let extra: Vec<&str> = extra.iter().map(String::as_str).collect();
            let manifest = manager.write_manifest(&extra)?;
            println!("vectorizer  {}", manifest.vectorizer);
            println!("classifier  {}", manifest.classifier);
            for (name, hash) in &manifest.extra {
                println!("{}  {}", name, hash);
            }
        }
        Command::Fetch {
            vectorizer_url,
            classifier_url,
            vectorizer_sha256,
            classifier_sha256,
            fresh,
        } => {
            let manager = artifact_manager(&config)?;
            let source = ArtifactSource {
                vectorizer_url,
                classifier_url,
                vectorizer_sha256,
                classifier_sha256,
            };
            if fresh {
                info!("Fresh download requested - removing any existing artifacts...");
                manager.remove_artifacts()?;
            }
            manager.ensure_artifacts(&source).await?;
            println!("Artifacts ready in {}", manager.artifacts_dir().display());
        }
    }

    Ok(())
}
