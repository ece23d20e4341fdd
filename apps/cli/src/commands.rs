//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use leadflow_core::{Pipeline, ProgressReporter};
use leadflow_discovery::HttpSignalSource;
use leadflow_enrichment::{AdapterRegistry, HttpEnrichmentAdapter};
use leadflow_outreach::{HttpMessagingChannel, OpenRouterDrafter};
use leadflow_shared::{
    AppConfig, CallOutcome, LeadId, LeadStatus, LeadflowError, PipelineConfig, init_config,
    load_config, resolve_api_key, validate_api_key,
};
use leadflow_storage::{LeadFilter, Storage};
use serde::Serialize;
use serde_json::json;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Leadflow: find, enrich and reach out to B2B leads.
#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "Discover leads from buying signals, enrich them, and run outreach.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Find new leads for a business profile.
    Discover {
        /// Business profile name (defaults to the configured profile).
        #[arg(short, long)]
        profile: Option<String>,

        /// Maximum number of leads to create.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Enrich every created lead right away.
        #[arg(long)]
        auto_enrich: bool,
    },

    /// Enrich leads from the configured sources.
    Enrich {
        /// Lead ids to enrich.
        #[arg(required_unless_present = "all_new", conflicts_with = "all_new")]
        ids: Vec<LeadId>,

        /// Enrich every lead still in status `new`.
        #[arg(long)]
        all_new: bool,
    },

    /// Generate outreach drafts for a lead without sending anything.
    Draft { id: LeadId },

    /// Generate and store a research summary for a lead.
    Research { id: LeadId },

    /// Send outreach to a lead on the configured channel.
    Outreach {
        id: LeadId,

        /// Send again to a lead that was already contacted.
        #[arg(long)]
        follow_up: bool,
    },

    /// Log the outcome of a call.
    LogCall {
        id: LeadId,

        /// Outcome, e.g. positive_reply, no_answer, not_interested.
        outcome: CallOutcome,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Manually override a lead's status.
    SetStatus { id: LeadId, status: LeadStatus },

    /// Add a note to a lead's timeline.
    Note { id: LeadId, text: String },

    /// List leads.
    List {
        #[arg(long)]
        status: Option<LeadStatus>,

        /// Business segment (profile name).
        #[arg(long)]
        segment: Option<String>,

        /// Signal source name.
        #[arg(long)]
        source: Option<String>,

        /// Only hot leads.
        #[arg(long)]
        hot: bool,

        /// Substring of company or contact name.
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show a lead with its activity log.
    Show { id: LeadId },

    /// Lead counts per status.
    Stats,

    /// Delete a lead and its activity log.
    Delete { id: LeadId },

    /// Export leads as CSV.
    Export {
        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long)]
        status: Option<LeadStatus>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout
/// carries only command output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadflow=info",
        1 => "leadflow=debug",
        _ => "leadflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. Pipeline errors are printed as a structured JSON
/// payload and end the process with a non-zero status.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Err(report) = dispatch(cli.command).await else {
        return Ok(());
    };
    match report.downcast_ref::<LeadflowError>() {
        Some(err) => {
            print_json(&ErrorPayload::from(err))?;
            std::process::exit(1);
        }
        None => Err(report),
    }
}

async fn dispatch(command: Command) -> Result<()> {
    if let Command::Config { action } = &command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        };
    }

    let config = load_config()?;
    let pipeline = open_pipeline(&config).await?;

    match command {
        Command::Discover {
            profile,
            limit,
            auto_enrich,
        } => cmd_discover(&pipeline, &config, profile.as_deref(), limit, auto_enrich).await,
        Command::Enrich { ids, all_new } => cmd_enrich(&pipeline, ids, all_new).await,
        Command::Draft { id } => {
            validate_api_key(&config)?;
            print_json(&pipeline.generate_outreach(&id).await?)
        }
        Command::Research { id } => {
            validate_api_key(&config)?;
            let reporter = CliProgress::new("Researching lead");
            let lead = pipeline.generate_research_summary(&id).await;
            reporter.finish();
            print_json(&lead?)
        }
        Command::Outreach { id, follow_up } => {
            validate_api_key(&config)?;
            let reporter = CliProgress::new("Sending outreach");
            let report = pipeline.execute_outreach(&id, follow_up).await;
            reporter.finish();
            print_json(&report?)
        }
        Command::LogCall { id, outcome, notes } => {
            print_json(&pipeline.log_call_outcome(&id, outcome, notes.as_deref()).await?)
        }
        Command::SetStatus { id, status } => print_json(&pipeline.set_status(&id, status).await?),
        Command::Note { id, text } => print_json(&pipeline.add_note(&id, &text).await?),
        Command::List {
            status,
            segment,
            source,
            hot,
            search,
            limit,
        } => {
            let filter = LeadFilter {
                status,
                business_segment: segment,
                source,
                hot_only: hot,
                search,
                limit,
            };
            print_json(&pipeline.storage().list_leads(&filter).await?)
        }
        Command::Show { id } => {
            let lead = pipeline.storage().require_lead(&id).await?;
            let activities = pipeline.storage().list_activities(&id).await?;
            print_json(&json!({ "lead": lead, "activities": activities }))
        }
        Command::Stats => {
            let counts: serde_json::Map<String, serde_json::Value> = pipeline
                .storage()
                .count_leads_by_status()
                .await?
                .into_iter()
                .map(|(status, n)| (status.to_string(), json!(n)))
                .collect();
            print_json(&counts)
        }
        Command::Delete { id } => {
            pipeline.delete_lead(&id).await?;
            print_json(&json!({ "deleted": id }))
        }
        Command::Export { out, status } => {
            let csv = pipeline
                .export_csv(&LeadFilter {
                    status,
                    ..Default::default()
                })
                .await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &csv).map_err(|e| LeadflowError::io(&path, e))?;
                    info!(path = %path.display(), "export written");
                    print_json(&json!({ "path": path, "rows": csv.lines().count().saturating_sub(1) }))
                }
                None => {
                    print!("{csv}");
                    Ok(())
                }
            }
        }
        // Handled before the pipeline is opened.
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Pipeline assembly
// ---------------------------------------------------------------------------

/// Build the pipeline from config: HTTP capabilities, one enrichment
/// adapter per configured source, and the lead database.
async fn open_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let runtime = PipelineConfig::from(config);
    let storage = Storage::open(&config.database_path()?).await?;

    let signals = HttpSignalSource::new(
        config.signals.name.clone(),
        &config.signals.base_url,
        env_key(&config.signals.api_key_env),
        runtime.signal_timeout,
    )?;

    let mut adapters = AdapterRegistry::default();
    for source in &config.enrichment.sources {
        adapters.push(Arc::new(HttpEnrichmentAdapter::new(
            source.name.clone(),
            &source.base_url,
            source.api_key_env.as_deref().and_then(env_key),
            runtime.enrichment_timeout,
        )?));
    }

    // Commands that draft check the key up front; the rest never call it.
    let drafting = OpenRouterDrafter::new(
        &config.openrouter.base_url,
        env_key(&config.openrouter.api_key_env).unwrap_or_default(),
        config.openrouter.default_model.clone(),
        runtime.generation_timeout,
    )?;

    let messaging = HttpMessagingChannel::new(
        config.messaging.channel,
        &config.messaging.base_url,
        env_key(&config.messaging.api_key_env),
        runtime.send_timeout,
    )?;

    Ok(Pipeline::new(
        Arc::new(storage),
        Arc::new(signals),
        adapters,
        Arc::new(drafting),
        Arc::new(messaging),
        runtime,
    ))
}

fn env_key(var: &str) -> Option<String> {
    resolve_api_key(var, var).ok()
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_discover(
    pipeline: &Pipeline,
    config: &AppConfig,
    profile: Option<&str>,
    limit: Option<usize>,
    auto_enrich: bool,
) -> Result<()> {
    let profile = profile.map(|name| config.profile(name)).transpose()?;
    let limit = limit.unwrap_or(config.defaults.discovery_limit);

    info!(
        profile = profile.as_ref().map_or("default", |p| p.name.as_str()),
        limit, auto_enrich, "discovering leads"
    );

    let reporter = CliProgress::new("Starting discovery");
    let report = pipeline
        .find_leads(profile, limit, auto_enrich, &reporter)
        .await;
    reporter.finish();
    print_json(&report?)
}

async fn cmd_enrich(pipeline: &Pipeline, ids: Vec<LeadId>, all_new: bool) -> Result<()> {
    if let [id] = ids.as_slice() {
        let reporter = CliProgress::new("Enriching lead");
        let report = pipeline.enrich_lead(id).await;
        reporter.finish();
        return print_json(&report?);
    }

    let ids = if all_new {
        pipeline
            .storage()
            .list_leads(&LeadFilter {
                status: Some(LeadStatus::New),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|lead| lead.id)
            .collect()
    } else {
        ids
    };

    let reporter = CliProgress::new("Enriching leads");
    let results = pipeline.enrich_many(&ids, &reporter).await;
    reporter.finish();

    let payload: Vec<serde_json::Value> = results
        .into_iter()
        .map(|(id, result)| match result {
            Ok(report) => json!({ "lead_id": id, "ok": true, "report": report }),
            Err(e) => json!({ "lead_id": id, "ok": false, "error": ErrorPayload::from(&e).error }),
        })
        .collect();
    print_json(&payload)
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    http_status: u16,
    retryable: bool,
    message: String,
}

impl From<&LeadflowError> for ErrorPayload {
    fn from(err: &LeadflowError) -> Self {
        Self {
            error: ErrorBody {
                code: err.code(),
                http_status: err.http_status(),
                retryable: err.is_retryable(),
                message: err.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn lead_done(&self, label: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {label}"));
    }
}
