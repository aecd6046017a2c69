//! RootWise CLI
//!
//! The `rootwise` command drives the RootWise core against the hosted
//! backend: scan a plant photo end to end, browse saved records and the
//! disease catalogue, and manage the session and avatar.
//!
//! ## Commands
//!
//! - `login` / `logout` / `whoami`: session management
//! - `scan`: classify an image and save it as a plant record
//! - `records`, `plants`, `record`: browse saved records
//! - `diseases`, `disease`: browse the disease catalogue
//! - `avatar`: replace the profile picture

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rootwise_core::{
    AppConfig, AppContext, Backend, CareAdvice, Disease, FileMediaDevice, FilterState,
    GalleryOptions, HttpClassifier, MediaSource, PipelineController, PlantDetail, PlantRecord,
    Stage,
};
use rootwise_store::{AppwriteClient, AppwriteConfig};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "rootwise")]
#[command(author = "RootWise Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Plant disease capture and classification", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output and JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange the configured login token for a session
    Login,

    /// End the current session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Classify a plant photo and save it as a record
    Scan {
        /// Image file to classify
        image: PathBuf,

        /// Name of the plant in the photo
        #[arg(short, long)]
        plant: String,
    },

    /// List your plant records, newest first
    Records {
        /// Only show records of this plant ("All" for every plant)
        #[arg(short, long, default_value = "All")]
        filter: String,
    },

    /// List the distinct plants you have recorded
    Plants,

    /// Show one record with its care advice
    Record {
        /// Record ID
        id: String,
    },

    /// Search the disease catalogue
    Diseases {
        /// Free-text search on the disease name
        #[arg(short, long, default_value = "")]
        search: String,

        /// Show the five oldest catalogue entries instead
        #[arg(long, conflicts_with = "search")]
        latest: bool,
    },

    /// Show one catalogue entry
    Disease {
        /// Disease ID
        id: String,
    },

    /// Replace your profile picture
    Avatar {
        /// Image file to upload
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    rootwise_core::init_tracing(cli.json, level);

    let config = AppConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load RootWise configuration")?;
    let backend_config = AppwriteConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load backend configuration")?;
    let client = Arc::new(
        AppwriteClient::new(backend_config).context("Failed to create backend client")?,
    );
    let ctx = AppContext::start(config, Backend::appwrite(Arc::clone(&client))).await;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Login => cmd_login(&ctx, &client, out).await,
        Commands::Logout => cmd_logout(&ctx, out).await,
        Commands::Whoami => cmd_whoami(&ctx, out).await,
        Commands::Scan { image, plant } => cmd_scan(&ctx, &image, &plant, out).await,
        Commands::Records { filter } => cmd_records(&ctx, &filter, out).await,
        Commands::Plants => cmd_plants(&ctx, out).await,
        Commands::Record { id } => cmd_record(&ctx, &id, out).await,
        Commands::Diseases { search, latest } => cmd_diseases(&ctx, &search, latest, out).await,
        Commands::Disease { id } => cmd_disease(&ctx, &id, out).await,
        Commands::Avatar { image } => cmd_avatar(&ctx, &image, out).await,
    }
}

/// Output mode selected by `--json`.
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    /// Print `value` as pretty JSON, or as `human` text.
    fn emit<T: Serialize>(self, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human(value));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SessionStatus {
    signed_in: bool,
    name: Option<String>,
    email: Option<String>,
    avatar: Option<String>,
    /// Secret to export as ROOTWISE_SESSION for later invocations
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<String>,
}

impl SessionStatus {
    fn of(ctx: &AppContext, avatar: Option<String>) -> Self {
        let user = ctx.user();
        Self {
            signed_in: user.is_some(),
            name: user.as_ref().map(|u| u.name.clone()),
            email: user.as_ref().map(|u| u.email.clone()),
            avatar: avatar.or_else(|| user.and_then(|u| u.avatar)),
            session: None,
        }
    }

    fn describe(&self) -> String {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) => {
                let mut text = format!("Signed in as {name} <{email}>");
                if let Some(avatar) = &self.avatar {
                    text.push_str(&format!("\nAvatar: {avatar}"));
                }
                if let Some(secret) = &self.session {
                    text.push_str(&format!("\nexport ROOTWISE_SESSION={secret}"));
                }
                text
            }
            _ => "Not signed in".to_string(),
        }
    }
}

/// Sign in with the configured login token
async fn cmd_login(ctx: &AppContext, client: &AppwriteClient, out: Output) -> Result<()> {
    if !ctx.sign_in().await.context("Sign in failed")? {
        bail!("No session and no login token; set ROOTWISE_LOGIN_USER_ID and ROOTWISE_LOGIN_SECRET");
    }
    let mut status = SessionStatus::of(ctx, None);
    status.session = client.session_secret();
    out.emit(&status, SessionStatus::describe)
}

/// Sign out
async fn cmd_logout(ctx: &AppContext, out: Output) -> Result<()> {
    ctx.sign_out().await.context("Sign out failed")?;
    out.emit(&SessionStatus::of(ctx, None), |_| "Signed out".to_string())
}

/// Show the signed-in user
async fn cmd_whoami(ctx: &AppContext, out: Output) -> Result<()> {
    let avatar = ctx.avatars().current_avatar().await?;
    out.emit(&SessionStatus::of(ctx, avatar), SessionStatus::describe)
}

/// Run one capture through classification and persistence
async fn cmd_scan(ctx: &AppContext, image: &Path, plant: &str, out: Output) -> Result<()> {
    if !ctx.is_logged_in() {
        bail!("Sign in before scanning plants (rootwise login)");
    }
    let classifier = Arc::new(HttpClassifier::new(&ctx.config().classifier_url));
    let home = ctx.home_binding(&FilterState::new(ctx.user().map(|u| u.email)));
    let pipeline = ctx.pipeline(classifier, home.clone());
    let camera = MediaSource::camera(Arc::new(FileMediaDevice::new(image)));

    run_scan(&pipeline, &camera, plant).await?;
    info!(
        records = ?home.data().map(|records| records.len()),
        "records refreshed"
    );

    let snapshot = pipeline.snapshot();
    let Some(record) = snapshot.record else {
        bail!("Scan finished without a saved record");
    };
    let detail = ctx.records().plant_detail(&record.id).await?;
    match detail {
        Some(detail) => out.emit(&detail, describe_detail),
        None => out.emit(&record, describe_record),
    }
}

async fn run_scan(pipeline: &PipelineController, camera: &MediaSource, plant: &str) -> Result<()> {
    if pipeline.acquire(camera).await? != Stage::Captured {
        bail!("No image captured");
    }
    if let Err(err) = pipeline.send().await {
        return Err(notice_error(pipeline, err));
    }
    if let Some(result) = pipeline.snapshot().classification {
        info!(label = %result.label, "classified");
    }
    if let Err(err) = pipeline.submit(plant).await {
        return Err(notice_error(pipeline, err));
    }
    Ok(())
}

/// Prefer the pipeline's user-facing notice over the raw error.
fn notice_error(pipeline: &PipelineController, err: rootwise_core::PipelineError) -> anyhow::Error {
    match pipeline.snapshot().notice {
        Some(notice) => anyhow::anyhow!("{}: {}", notice.title, notice.message),
        None => err.into(),
    }
}

/// List records, optionally narrowed to one plant
async fn cmd_records(ctx: &AppContext, filter: &str, out: Output) -> Result<()> {
    let mut state = FilterState::new(ctx.user().map(|u| u.email));
    state.select(filter);
    let binding = ctx.home_binding(&state);
    binding.refetch(None).await;

    if let Some(err) = binding.error() {
        return Err(err).context("Failed to load records");
    }
    let records = binding.data().unwrap_or_default();
    out.emit(&records, |records| {
        if records.is_empty() {
            return "No records found.".to_string();
        }
        records
            .iter()
            .map(describe_record)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Distinct plant names
async fn cmd_plants(ctx: &AppContext, out: Output) -> Result<()> {
    let Some(user) = ctx.user() else {
        bail!("Sign in to list your plants (rootwise login)");
    };
    let names = ctx.records().unique_plant_names(&user.email).await?;
    out.emit(&names, |names| {
        if names.is_empty() {
            "No plants recorded yet.".to_string()
        } else {
            names.join("\n")
        }
    })
}

/// One record with advice
async fn cmd_record(ctx: &AppContext, id: &str, out: Output) -> Result<()> {
    let detail = ctx
        .records()
        .plant_detail(id)
        .await
        .with_context(|| format!("Failed to load record '{}'", id))?;
    match detail {
        Some(detail) => out.emit(&detail, describe_detail),
        None => bail!("Sign in to view record '{}'", id),
    }
}

/// Search the catalogue
async fn cmd_diseases(ctx: &AppContext, search: &str, latest: bool, out: Output) -> Result<()> {
    let diseases = if latest {
        ctx.records().latest_diseases().await?
    } else {
        ctx.records().search_diseases(search).await?
    };
    out.emit(&diseases, |diseases| {
        if diseases.is_empty() {
            return "No diseases found.".to_string();
        }
        diseases
            .iter()
            .map(|d| format!("{}  {}", d.id, d.name))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// One catalogue entry
async fn cmd_disease(ctx: &AppContext, id: &str, out: Output) -> Result<()> {
    let disease = ctx
        .records()
        .disease(id)
        .await
        .with_context(|| format!("Failed to load disease '{}'", id))?;
    out.emit(&disease, describe_disease)
}

/// Upload a new avatar, deleting the previous one
async fn cmd_avatar(ctx: &AppContext, image: &Path, out: Output) -> Result<()> {
    let avatars = ctx.avatars();
    let old = avatars.current_avatar().await?;
    let gallery = MediaSource::gallery(
        Arc::new(FileMediaDevice::new(image)),
        GalleryOptions::square_crop(),
    );
    let Some(url) = avatars.replace_avatar(&gallery, old.as_deref()).await? else {
        bail!("No image selected");
    };
    out.emit(&url, |url| format!("Avatar updated: {url}"))
}

fn describe_record(record: &PlantRecord) -> String {
    format!(
        "{}  {:<16} {:<24} {}",
        record.id,
        record.plant_name,
        record.disease,
        record.created_at.format("%Y-%m-%d %H:%M")
    )
}

fn describe_detail(detail: &PlantDetail) -> String {
    let heading = match detail.advice {
        CareAdvice::Healthy => "Status",
        _ => "Cure",
    };
    format!(
        "Plant:   {}\nDisease: {}\nImage:   {}\n{heading}:    {}",
        detail.record.plant_name,
        detail.record.disease,
        detail.image_url,
        detail.advice.message()
    )
}

fn describe_disease(disease: &Disease) -> String {
    let mut text = format!("{}\n", disease.name);
    text.push_str(&format!(
        "Cure: {}",
        disease.cure.as_deref().unwrap_or("No cure recorded")
    ));
    if let Some(url) = &disease.image_url {
        text.push_str(&format!("\nImage: {url}"));
    }
    text
}
