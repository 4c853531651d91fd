//! End-to-end site pipeline: draft → judge → gate → tokens → materialize → build.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::pin;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use sitebuilder_content::{CopyDrafter, CopyJudge, DesignTokenSource};
use sitebuilder_shared::{
    BuildRequest, CleanupPolicy, CopyDraft, DesignTokens, PipelineConfig, QualityScore, Result,
    RunId, Service, SiteBuilderError,
};
use sitebuilder_templates::TemplateStore;

use crate::gate::{self, GateDecision};
use crate::registry::InFlightRegistry;
use crate::supervisor::BuildSupervisor;
use crate::workspace::{BuildManifest, Workspace, WorkspaceMaterializer};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Drafting,
    Judging,
    GateCheck,
    TokenGen,
    Materializing,
    Building,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drafting => "Drafting copy",
            Self::Judging => "Judging copy",
            Self::GateCheck => "Checking quality gate",
            Self::TokenGen => "Generating design tokens",
            Self::Materializing => "Materializing workspace",
            Self::Building => "Building site",
        })
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct SiteArtifact {
    pub run_id: RunId,
    pub organization_id: String,
    /// Root of the build workspace.
    pub workspace_root: PathBuf,
    /// Built output directory.
    pub artifact_path: PathBuf,
    pub score: QualityScore,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, stage: Stage);
    /// Called when the pipeline completes successfully.
    fn done(&self, artifact: &SiteArtifact);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn done(&self, _artifact: &SiteArtifact) {}
}

/// Copy that passed the gate, plus the tokens to style it with.
struct ApprovedContent {
    copy: CopyDraft,
    score: QualityScore,
    tokens: DesignTokens,
}

/// Sequences the content services, the materializer and the build tool.
pub struct Pipeline<D, J, T> {
    drafter: D,
    judge: J,
    tokens: T,
    materializer: WorkspaceMaterializer,
    supervisor: BuildSupervisor,
    registry: InFlightRegistry,
    cleanup: CleanupPolicy,
    build_timeout: Option<Duration>,
}

impl<D, J, T> Pipeline<D, J, T>
where
    D: CopyDrafter,
    J: CopyJudge,
    T: DesignTokenSource,
{
    pub fn new(config: &PipelineConfig, drafter: D, judge: J, tokens: T) -> Self {
        Self {
            drafter,
            judge,
            tokens,
            materializer: WorkspaceMaterializer::new(
                &config.build_root,
                TemplateStore::new(&config.templates_dir),
            ),
            supervisor: BuildSupervisor::new(config.builder.clone()),
            registry: InFlightRegistry::new(),
            cleanup: config.cleanup,
            build_timeout: config.builder.timeout(),
        }
    }

    /// Share an in-flight registry with other pipelines.
    pub fn with_registry(mut self, registry: InFlightRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Run the pipeline to completion.
    pub async fn run(
        &self,
        request: &BuildRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<SiteArtifact> {
        self.run_until(request, progress, std::future::pending())
            .await
    }

    /// Run the pipeline until it finishes or `cancel` resolves.
    ///
    /// Each stage runs at most once and the first failure ends the run.
    /// Cancelling during the build kills the build tool's process group.
    #[instrument(skip_all, fields(org = %request.organization_id(), template = %request.template_id()))]
    pub async fn run_until<F>(
        &self,
        request: &BuildRequest,
        progress: &dyn ProgressReporter,
        cancel: F,
    ) -> Result<SiteArtifact>
    where
        F: Future<Output = String>,
    {
        let start = Instant::now();
        let _claim = self.registry.try_acquire(request.organization_id())?;
        let run_id = RunId::new();
        info!(%run_id, "starting site build");

        let mut cancel = pin!(cancel);

        let approved = tokio::select! {
            approved = self.approve_content(request, progress) => approved?,
            reason = &mut cancel => return Err(SiteBuilderError::BuildCancelled { reason }),
        };

        // --- Materialize ---
        progress.stage(Stage::Materializing);
        let workspace = self.materialize(run_id, request, &approved).await?;

        // --- Build ---
        progress.stage(Stage::Building);
        let build = self.build(&workspace, cancel).await;

        let artifact_path = match build {
            Ok(path) => path,
            Err(e) => {
                error!(%run_id, category = %e.category(), error = %e, "site build failed");
                self.cleanup_after_failure(request.organization_id());
                return Err(e);
            }
        };

        let artifact = SiteArtifact {
            run_id,
            organization_id: request.organization_id().to_string(),
            workspace_root: workspace.root,
            artifact_path,
            score: approved.score,
            elapsed: start.elapsed(),
        };

        progress.done(&artifact);

        info!(
            %run_id,
            artifact = %artifact.artifact_path.display(),
            elapsed_ms = artifact.elapsed.as_millis(),
            "site build complete"
        );

        Ok(artifact)
    }

    /// Draft, judge and gate the copy, then fetch design tokens.
    ///
    /// Tokens are only requested once the gate has passed.
    async fn approve_content(
        &self,
        request: &BuildRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ApprovedContent> {
        progress.stage(Stage::Drafting);
        let copy = self.drafter.draft(request).await?;
        info!(headline_len = copy.headline.len(), body_len = copy.body.len(), "copy drafted");

        progress.stage(Stage::Judging);
        let score = self.judge.judge(&copy).await?;
        info!(%score, "copy judged");

        progress.stage(Stage::GateCheck);
        if gate::evaluate(&score) == GateDecision::Reject {
            warn!(%score, "copy rejected by quality gate");
            return Err(SiteBuilderError::ContentRejected { score });
        }

        progress.stage(Stage::TokenGen);
        let tokens = self.tokens.tokens().await?;
        tokens
            .validate()
            .map_err(|msg| SiteBuilderError::upstream(Service::Tokens, msg))?;
        info!(accent = %tokens.accent_color(), font = %tokens.heading_font(), "design tokens ready");

        Ok(ApprovedContent {
            copy,
            score,
            tokens,
        })
    }

    async fn materialize(
        &self,
        run_id: RunId,
        request: &BuildRequest,
        approved: &ApprovedContent,
    ) -> Result<Workspace> {
        let materializer = self.materializer.clone();
        let owned_request = request.clone();
        let copy = approved.copy.clone();
        let tokens = approved.tokens.clone();
        let score = approved.score;

        let result = tokio::task::spawn_blocking(move || -> Result<Workspace> {
            let workspace = materializer.materialize(&owned_request, &copy, &tokens)?;
            let manifest =
                BuildManifest::new(run_id, &owned_request, score, &tokens, &workspace)?;
            workspace.write_manifest(&manifest)?;
            Ok(workspace)
        })
        .await
        .map_err(|e| {
            SiteBuilderError::workspace(
                "materializer task",
                self.materializer.build_root(),
                std::io::Error::other(e),
            )
        })?;

        if let Err(e) = &result {
            error!(category = %e.category(), error = %e, "materialization failed");
            // A missing template is detected before anything is written.
            if !matches!(e, SiteBuilderError::TemplateNotFound { .. }) {
                self.cleanup_after_failure(request.organization_id());
            }
        }
        result
    }

    /// Run the build tool, bounded by the configured timeout and `cancel`.
    async fn build<F>(&self, workspace: &Workspace, cancel: F) -> Result<PathBuf>
    where
        F: Future<Output = String>,
    {
        let timeout = self.build_timeout;
        let stop = async move {
            match timeout {
                Some(limit) => tokio::select! {
                    reason = cancel => reason,
                    _ = tokio::time::sleep(limit) => {
                        format!("build exceeded the {}s timeout", limit.as_secs())
                    }
                },
                None => cancel.await,
            }
        };

        let outcome = self
            .supervisor
            .build_until(&workspace.root, &workspace.output_dir, stop)
            .await?;

        if let Err(e) = workspace.record_outcome(&outcome) {
            warn!(error = %e, "failed to record build outcome in manifest");
        }

        match outcome.artifact_path {
            Some(path) if outcome.success => Ok(path),
            _ => Err(SiteBuilderError::BuildTool {
                exit_code: outcome.exit_code,
                diagnostics: outcome.diagnostics,
            }),
        }
    }

    fn cleanup_after_failure(&self, organization_id: &str) {
        if self.cleanup != CleanupPolicy::OnFailure {
            return;
        }
        match self.materializer.remove(organization_id) {
            Ok(true) => info!(org = organization_id, "removed workspace of failed run"),
            Ok(false) => {}
            Err(e) => warn!(org = organization_id, error = %e, "failed to remove workspace"),
        }
    }
}
