use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lookalike_core::config::BusKind;
use lookalike_core::signature;
use lookalike_core::{Config, MatchResult, NewIdentity, Pipeline, RecordSummary, StillImage};
use lookalike_hw::Camera;
use lookalike_store::SqliteStore;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.lookalike.Lookalike1",
    default_service = "org.lookalike.Lookalike1",
    default_path = "/org/lookalike/Lookalike1"
)]
trait Lookalike {
    async fn enroll(&self, name: &str, age: i64) -> zbus::Result<i64>;
    async fn detect(&self) -> zbus::Result<String>;
    async fn list_records(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "lookalike", about = "Lookalike enrollment and matching CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from the camera (via lookaliked) or from an image file
    Enroll {
        #[arg(short, long)]
        name: String,
        /// Age in whole years
        #[arg(short, long)]
        age: String,
        /// Use this image instead of the daemon's camera; writes to the local database
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Match a new capture against enrolled records
    Detect {
        /// Use this image instead of the daemon's camera; reads the local database
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// List enrolled records
    List,
    /// Print the correlation score between two image files
    Compare { first: PathBuf, second: PathBuf },
    /// Show daemon status
    Status,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Enroll { name, age, image } => {
            let identity = NewIdentity::parse(&name, &age)?;
            let id = match image {
                Some(path) => enroll_local(&config, &identity, &path)?,
                None => {
                    let proxy = connect(&config).await?;
                    proxy
                        .enroll(identity.name(), i64::from(identity.age()))
                        .await?
                }
            };
            println!("User '{}' registered with id {id}", identity.name());
        }
        Commands::Detect { image } => {
            let result = match image {
                Some(path) => detect_local(&config, &path)?,
                None => {
                    let proxy = connect(&config).await?;
                    serde_json::from_str(&proxy.detect().await?)
                        .context("daemon returned malformed match result")?
                }
            };
            print_match(&result);
        }
        Commands::List => {
            let proxy = connect(&config).await?;
            let records: Vec<RecordSummary> = serde_json::from_str(&proxy.list_records().await?)
                .context("daemon returned malformed record list")?;
            if records.is_empty() {
                println!("No records enrolled");
            }
            for r in records {
                println!(
                    "{:>5}  {:<24} age {:<4} {:>8} bytes  {}",
                    r.id, r.name, r.age, r.photo_bytes, r.created_at
                );
            }
        }
        Commands::Compare { first, second } => {
            let a = signature::extract(&load_rgb(&first)?)?;
            let b = signature::extract(&load_rgb(&second)?)?;
            let score = a.correlation(&b)?;
            let verdict = if score > config.match_threshold {
                "match"
            } else {
                "no match"
            };
            println!(
                "correlation {score:.4} ({verdict} at threshold {})",
                config.match_threshold
            );
        }
        Commands::Status => match connect(&config).await {
            Ok(proxy) => println!("{}", proxy.status().await?),
            Err(e) => println!("lookaliked: not connected ({e})"),
        },
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<LookalikeProxy<'static>> {
    let conn = match config.bus {
        BusKind::Session => zbus::Connection::session().await,
        BusKind::System => zbus::Connection::system().await,
    }
    .context("failed to connect to D-Bus")?;
    LookalikeProxy::new(&conn)
        .await
        .context("lookaliked is not reachable")
}

fn local_pipeline(config: &Config, image: &Path) -> Result<Pipeline<SqliteStore, StillImage>> {
    let store = SqliteStore::open_with_timeout(&config.db_path, config.busy_timeout_ms)?;
    Ok(Pipeline::new(store, StillImage::new(image))
        .with_threshold(config.match_threshold)
        .with_encoding(config.photo_encoding())
        .with_signature_cache(config.signature_cache))
}

fn enroll_local(config: &Config, identity: &NewIdentity, image: &Path) -> Result<i64> {
    Ok(local_pipeline(config, image)?.enroll(identity)?)
}

fn detect_local(config: &Config, image: &Path) -> Result<MatchResult> {
    Ok(local_pipeline(config, image)?.detect()?)
}

fn load_rgb(path: &Path) -> Result<image::RgbImage> {
    let img = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(img.to_rgb8())
}

fn print_match(result: &MatchResult) {
    match result {
        MatchResult::Matched {
            id,
            name,
            age,
            score,
        } => println!("Match found  Name: {name}  Age: {age}  (id {id}, score {score:.4})"),
        MatchResult::NoMatch => println!("No matching face found."),
    }
}
