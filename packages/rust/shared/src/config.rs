//! Application configuration for SiteBuilder.
//!
//! User config lives at `~/.sitebuilder/sitebuilder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SiteBuilderError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitebuilder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitebuilder";

/// Placeholder replaced with the workspace root in builder args.
pub const ROOT_PLACEHOLDER: &str = "{root}";

/// Placeholder replaced with the output directory in builder args.
pub const OUT_PLACEHOLDER: &str = "{out}";

// ---------------------------------------------------------------------------
// Config structs (matching sitebuilder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Template store and workspace locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// OpenRouter settings for the content services.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// External static-site build tool.
    #[serde(default)]
    pub builder: BuilderConfig,

    /// Workspace retention.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the read-only template store.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Parent directory of per-organization build workspaces.
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            build_root: default_build_root(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}
fn default_build_root() -> PathBuf {
    PathBuf::from("var").join("builds")
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for drafting, judging and design tokens.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_request_timeout() -> u64 {
    60
}

impl OpenRouterConfig {
    /// Parse `base_url`.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            SiteBuilderError::config(format!("invalid openrouter.base_url '{}': {e}", self.base_url))
        })
    }
}

/// `[builder]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Executable of the static-site build tool.
    #[serde(default = "default_builder_command")]
    pub command: String,

    /// Arguments; `{root}` and `{out}` are substituted per run.
    #[serde(default = "default_builder_args")]
    pub args: Vec<String>,

    /// Directory the tool runs in (where its `node_modules` live).
    /// Defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Orchestrator-enforced limit on one build. `0` disables it.
    #[serde(default = "default_build_timeout")]
    pub timeout_secs: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            command: default_builder_command(),
            args: default_builder_args(),
            working_dir: None,
            timeout_secs: default_build_timeout(),
        }
    }
}

fn default_builder_command() -> String {
    "npx".into()
}
fn default_builder_args() -> Vec<String> {
    ["astro", "build", "--root", ROOT_PLACEHOLDER, "--out-dir", OUT_PLACEHOLDER]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_build_timeout() -> u64 {
    600
}

impl BuilderConfig {
    /// Substitute the workspace placeholders into the configured args.
    pub fn render_args(&self, root: &Path, out: &Path) -> Vec<String> {
        let root = root.to_string_lossy();
        let out = out.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(ROOT_PLACEHOLDER, &root)
                    .replace(OUT_PLACEHOLDER, &out)
            })
            .collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// What happens to a workspace once its run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Keep every workspace (the artifact lives inside it).
    #[default]
    Never,
    /// Remove the workspace of a run that failed after materializing.
    OnFailure,
}

/// `[workspace]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub templates_dir: PathBuf,
    pub build_root: PathBuf,
    pub builder: BuilderConfig,
    pub cleanup: CleanupPolicy,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            templates_dir: config.paths.templates_dir.clone(),
            build_root: config.paths.build_root.clone(),
            builder: config.builder.clone(),
            cleanup: config.workspace.cleanup,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitebuilder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteBuilderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitebuilder/sitebuilder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteBuilderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteBuilderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteBuilderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteBuilderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteBuilderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SiteBuilderError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable \
             or pass --offline to use the built-in content stubs."
        ))),
    }
}
