//! Deterministic content services.
//!
//! Returns canned responses and counts calls, so the pipeline can run offline
//! and tests can assert which collaborators were reached.

use std::sync::atomic::{AtomicUsize, Ordering};

use sitebuilder_shared::{
    BuildRequest, CopyDraft, DesignTokens, QualityScore, Result, Service, SiteBuilderError,
};

use crate::{CopyDrafter, CopyJudge, DesignTokenSource};

/// Scripted implementation of every content service.
#[derive(Debug, Default)]
pub struct ScriptedContent {
    draft: Option<CopyDraft>,
    score: Option<QualityScore>,
    tokens: Option<DesignTokens>,
    failure: Option<(Service, String)>,
    draft_calls: AtomicUsize,
    judge_calls: AtomicUsize,
    token_calls: AtomicUsize,
}

impl ScriptedContent {
    /// Passing scores, a default theme, and copy derived from the request.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(mut self, headline: impl Into<String>, body: impl Into<String>) -> Self {
        self.draft = Some(CopyDraft {
            headline: headline.into(),
            body: body.into(),
        });
        self
    }

    pub fn with_score(mut self, fluency: f64, originality: f64) -> Self {
        self.score = Some(QualityScore {
            fluency,
            originality,
        });
        self
    }

    pub fn with_tokens(mut self, tokens: DesignTokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Make `service` fail with `message`.
    pub fn failing(mut self, service: Service, message: impl Into<String>) -> Self {
        self.failure = Some((service, message.into()));
        self
    }

    pub fn draft_calls(&self) -> usize {
        self.draft_calls.load(Ordering::SeqCst)
    }

    pub fn judge_calls(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    fn check(&self, service: Service) -> Result<()> {
        match &self.failure {
            Some((failing, message)) if *failing == service => {
                Err(SiteBuilderError::upstream(service, message.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn default_tokens() -> DesignTokens {
        DesignTokens {
            palette: vec![
                "#1f3a5f".into(),
                "#f4f1ea".into(),
                "#d97b29".into(),
            ],
            font_pair: vec!["Inter".into(), "Source Serif 4".into()],
        }
    }
}

impl CopyDrafter for ScriptedContent {
    async fn draft(&self, request: &BuildRequest) -> Result<CopyDraft> {
        self.draft_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Service::Drafting)?;
        Ok(self.draft.clone().unwrap_or_else(|| {
            let name = request.organization_name();
            CopyDraft {
                headline: format!("Welcome to {name}"),
                body: format!(
                    "{name} is registered under organization number {}. \
                     Get in touch to learn what we can do for you.",
                    request.organization_id()
                ),
            }
        }))
    }
}

impl CopyJudge for ScriptedContent {
    async fn judge(&self, _draft: &CopyDraft) -> Result<QualityScore> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Service::Judging)?;
        Ok(self.score.unwrap_or(QualityScore {
            fluency: 4.5,
            originality: 4.0,
        }))
    }
}

impl DesignTokenSource for ScriptedContent {
    async fn tokens(&self) -> Result<DesignTokens> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Service::Tokens)?;
        Ok(self.tokens.clone().unwrap_or_else(Self::default_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_derive_copy_from_request() {
        let content = ScriptedContent::new();
        let req = BuildRequest::new("999000999", "Acme", "basic", None).unwrap();

        let draft = content.draft(&req).await.unwrap();
        assert_eq!(draft.headline, "Welcome to Acme");
        assert!(draft.body.contains("999000999"));

        let tokens = content.tokens().await.unwrap();
        assert!(tokens.validate().is_ok());
        assert_eq!(content.draft_calls(), 1);
        assert_eq!(content.token_calls(), 1);
        assert_eq!(content.judge_calls(), 0);
    }

    #[tokio::test]
    async fn failure_applies_to_one_service() {
        let content = ScriptedContent::new().failing(Service::Judging, "backend down");
        let draft = CopyDraft {
            headline: "H".into(),
            body: "B".into(),
        };

        let err = content.judge(&draft).await.unwrap_err();
        assert_eq!(err.to_string(), "judging service error: backend down");
        assert!(content.tokens().await.is_ok());
    }
}
