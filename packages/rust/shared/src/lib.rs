//! Shared types, error model, and configuration for SiteBuilder.
//!
//! This crate is the foundation depended on by all other SiteBuilder crates.
//! It provides:
//! - [`SiteBuilderError`] (the unified error type and its [`FailureCategory`])
//! - Domain types ([`BuildRequest`], [`CopyDraft`], [`QualityScore`], [`DesignTokens`], [`BuildOutcome`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuilderConfig, CleanupPolicy, OpenRouterConfig, PathsConfig, PipelineConfig,
    WorkspaceConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{FailureCategory, Result, SiteBuilderError};
pub use types::{
    BuildOutcome, BuildRequest, BuildRequestPayload, CopyDraft, DesignTokens, MAX_SCORE,
    QualityScore, RunId, Service, validate_path_segment,
};
