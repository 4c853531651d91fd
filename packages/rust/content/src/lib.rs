//! Content services used by the build pipeline.
//!
//! The pipeline only sees three narrow contracts:
//! - [`CopyDrafter`]: organization identity → headline + body
//! - [`CopyJudge`]: draft → fluency/originality scores
//! - [`DesignTokenSource`]: palette + font pairing
//!
//! [`OpenRouterClient`] implements all three against a chat-completions
//! backend; [`ScriptedContent`] is a deterministic implementation for tests
//! and offline runs.

mod openrouter;
mod prompts;
mod scripted;

use std::future::Future;
use std::sync::Arc;

use sitebuilder_shared::{BuildRequest, CopyDraft, DesignTokens, QualityScore, Result};

pub use openrouter::OpenRouterClient;
pub use scripted::ScriptedContent;

/// Drafts page copy for an organization.
pub trait CopyDrafter: Send + Sync {
    /// Uses the request's organization id, name and industry code.
    fn draft(&self, request: &BuildRequest) -> impl Future<Output = Result<CopyDraft>> + Send;
}

/// Scores drafted copy.
pub trait CopyJudge: Send + Sync {
    fn judge(&self, draft: &CopyDraft) -> impl Future<Output = Result<QualityScore>> + Send;
}

/// Produces the visual theme.
pub trait DesignTokenSource: Send + Sync {
    fn tokens(&self) -> impl Future<Output = Result<DesignTokens>> + Send;
}

impl<T: CopyDrafter> CopyDrafter for Arc<T> {
    fn draft(&self, request: &BuildRequest) -> impl Future<Output = Result<CopyDraft>> + Send {
        (**self).draft(request)
    }
}

impl<T: CopyJudge> CopyJudge for Arc<T> {
    fn judge(&self, draft: &CopyDraft) -> impl Future<Output = Result<QualityScore>> + Send {
        (**self).judge(draft)
    }
}

impl<T: DesignTokenSource> DesignTokenSource for Arc<T> {
    fn tokens(&self) -> impl Future<Output = Result<DesignTokens>> + Send {
        (**self).tokens()
    }
}
