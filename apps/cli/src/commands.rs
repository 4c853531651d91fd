//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use sitebuilder_content::{
    CopyDrafter, CopyJudge, DesignTokenSource, OpenRouterClient, ScriptedContent,
};
use sitebuilder_core::pipeline::{Pipeline, ProgressReporter, SiteArtifact, Stage};
use sitebuilder_core::workspace::WorkspaceMaterializer;
use sitebuilder_shared::{
    AppConfig, BuildRequest, PipelineConfig, init_config, load_config, validate_api_key,
};
use sitebuilder_templates::TemplateStore;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteBuilder: one-page websites from organization records.
#[derive(Parser)]
#[command(
    name = "sitebuilder",
    version,
    about = "Generate, quality-gate and build a one-page website for an organization.",
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
    /// Draft, judge and build the site for one organization.
    Build(BuildArgs),

    /// Template store operations.
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },

    /// Remove build workspaces.
    Clean {
        /// Organization whose workspace should be removed.
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        org_id: Option<String>,

        /// Remove every workspace under the build root.
        #[arg(long)]
        all: bool,

        /// Build root (defaults to the configured one).
        #[arg(long)]
        build_root: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `sitebuilder build`.
#[derive(clap::Args)]
pub(crate) struct BuildArgs {
    /// Organization number.
    #[arg(long, required_unless_present = "payload")]
    pub org_id: Option<String>,

    /// Organization display name.
    #[arg(long, required_unless_present = "payload")]
    pub name: Option<String>,

    /// Template identifier.
    #[arg(long, required_unless_present = "payload")]
    pub template: Option<String>,

    /// Industry classification code.
    #[arg(long)]
    pub industry: Option<String>,

    /// JSON build request, inline or `@path/to/file.json`.
    #[arg(long, conflicts_with_all = ["org_id", "name", "template", "industry"])]
    pub payload: Option<String>,

    /// Use built-in deterministic content instead of OpenRouter.
    #[arg(long)]
    pub offline: bool,

    /// Template store root (defaults to the configured one).
    #[arg(long)]
    pub templates_dir: Option<PathBuf>,

    /// Build root (defaults to the configured one).
    #[arg(long)]
    pub build_root: Option<PathBuf>,
}

/// Template subcommands.
#[derive(Subcommand)]
pub(crate) enum TemplatesAction {
    /// List available templates.
    List {
        /// Template store root (defaults to the configured one).
        #[arg(long)]
        templates_dir: Option<PathBuf>,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitebuilder=info",
        1 => "sitebuilder=debug",
        _ => "sitebuilder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build(args) => cmd_build(args).await,
        Command::Templates { action } => match action {
            TemplatesAction::List { templates_dir } => cmd_templates_list(templates_dir),
        },
        Command::Clean {
            org_id,
            all,
            build_root,
        } => cmd_clean(org_id.as_deref(), all, build_root),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

async fn cmd_build(args: BuildArgs) -> Result<()> {
    let config = load_config()?;
    let request = build_request(&args)?;

    let mut pipeline_config = PipelineConfig::from(&config);
    if let Some(dir) = args.templates_dir {
        pipeline_config.templates_dir = dir;
    }
    if let Some(dir) = args.build_root {
        pipeline_config.build_root = dir;
    }

    info!(
        org = request.organization_id(),
        template = request.template_id(),
        offline = args.offline,
        "building site"
    );

    if args.offline {
        let content = Arc::new(ScriptedContent::new());
        let pipeline =
            Pipeline::new(&pipeline_config, content.clone(), content.clone(), content);
        run_pipeline(&pipeline, &request).await
    } else {
        let api_key = validate_api_key(&config)?;
        let client = OpenRouterClient::new(&config.openrouter, api_key)?;
        let pipeline =
            Pipeline::new(&pipeline_config, client.clone(), client.clone(), client);
        run_pipeline(&pipeline, &request).await
    }
}

/// Assemble the request from `--payload` or the individual flags.
fn build_request(args: &BuildArgs) -> Result<BuildRequest> {
    if let Some(payload) = &args.payload {
        let json = read_payload(payload)?;
        return Ok(BuildRequest::from_json(&json)?);
    }

    let (Some(org_id), Some(name), Some(template)) = (&args.org_id, &args.name, &args.template)
    else {
        return Err(eyre!("--org-id, --name and --template are required without --payload"));
    };

    Ok(BuildRequest::new(
        org_id.as_str(),
        name.as_str(),
        template.as_str(),
        args.industry.clone(),
    )?)
}

/// `@path` reads the payload from a file; anything else is inline JSON.
fn read_payload(payload: &str) -> Result<String> {
    match payload.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read payload file '{path}': {e}")),
        None => Ok(payload.to_string()),
    }
}

async fn run_pipeline<D, J, T>(pipeline: &Pipeline<D, J, T>, request: &BuildRequest) -> Result<()>
where
    D: CopyDrafter,
    J: CopyJudge,
    T: DesignTokenSource,
{
    let reporter = CliProgress::new();

    let result = pipeline
        .run_until(request, &reporter, interrupted())
        .await;

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            reporter.spinner.abandon_with_message("Build failed");
            return Err(eyre!("{}: {e}", e.category()));
        }
    };

    println!();
    println!("  Site built successfully!");
    println!("  Run:       {}", artifact.run_id);
    println!("  Org:       {}", artifact.organization_id);
    println!("  Score:     {}", artifact.score);
    println!("  Workspace: {}", artifact.workspace_root.display());
    println!("  Artifact:  {}", artifact.artifact_path.display());
    println!(
        "  Time:      {:.1}s",
        artifact.elapsed.as_secs_f64()
    );
    println!();

    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() -> String {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "interrupted by Ctrl-C".to_string(),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending().await
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage.to_string());
    }

    fn done(&self, _artifact: &SiteArtifact) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// templates / clean / config
// ---------------------------------------------------------------------------

fn cmd_templates_list(templates_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let root = templates_dir.unwrap_or(config.paths.templates_dir);
    let store = TemplateStore::new(&root);

    let templates = store.list()?;
    if templates.is_empty() {
        println!("No templates found in {}", root.display());
        return Ok(());
    }
    for id in templates {
        println!("{id}");
    }
    Ok(())
}

fn cmd_clean(org_id: Option<&str>, all: bool, build_root: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let build_root = build_root.unwrap_or(config.paths.build_root);
    let materializer =
        WorkspaceMaterializer::new(build_root, TemplateStore::new(config.paths.templates_dir));

    let targets = if all {
        materializer.list()?
    } else {
        let org_id = org_id.ok_or_else(|| eyre!("either --org-id or --all is required"))?;
        sitebuilder_shared::validate_path_segment("organization id", org_id)?;
        vec![org_id.to_string()]
    };

    let mut removed = 0;
    for org in &targets {
        if materializer.remove(org)? {
            removed += 1;
            println!("Removed {}", materializer.workspace_root(org).display());
        } else {
            println!("No workspace for organization {org}");
        }
    }
    info!(removed, "clean finished");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
