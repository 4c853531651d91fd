//! OpenRouter chat-completions backend for all three content services.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use sitebuilder_shared::{
    BuildRequest, CopyDraft, DesignTokens, OpenRouterConfig, QualityScore, Result, Service,
    SiteBuilderError,
};

use crate::prompts;
use crate::{CopyDrafter, CopyJudge, DesignTokenSource};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("SiteBuilder/", env!("CARGO_PKG_VERSION"));

/// Longest upstream body quoted back in an error message.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(config: &OpenRouterConfig, api_key: String) -> Result<Self> {
        let base = config.base_url()?;
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            base.as_str().trim_end_matches('/')
        ))
        .map_err(|e| SiteBuilderError::config(format!("invalid chat endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteBuilderError::config(format!("client build: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            model: config.default_model.clone(),
        })
    }

    /// Send one system + user exchange and decode the reply as JSON.
    async fn chat_json<T: DeserializeOwned>(
        &self,
        service: Service,
        system: &str,
        prompt: &str,
    ) -> Result<T> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SiteBuilderError::upstream(service, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(SiteBuilderError::upstream(
                service,
                format!("HTTP {status}: {snippet}"),
            ));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            SiteBuilderError::upstream(service, format!("invalid response body: {e}"))
        })?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SiteBuilderError::upstream(service, "empty completion"))?;

        debug!(%service, len = content.len(), "completion received");

        serde_json::from_str(prompts::strip_code_fence(&content)).map_err(|e| {
            SiteBuilderError::upstream(service, format!("unexpected completion format: {e}"))
        })
    }
}

impl CopyDrafter for OpenRouterClient {
    #[instrument(skip_all, fields(org = %request.organization_id()))]
    async fn draft(&self, request: &BuildRequest) -> Result<CopyDraft> {
        let draft: CopyDraft = self
            .chat_json(
                Service::Drafting,
                prompts::DRAFT_SYSTEM,
                &prompts::draft_prompt(request),
            )
            .await?;
        if draft.headline.trim().is_empty() {
            return Err(SiteBuilderError::upstream(
                Service::Drafting,
                "draft has an empty headline",
            ));
        }
        Ok(draft)
    }
}

impl CopyJudge for OpenRouterClient {
    #[instrument(skip_all)]
    async fn judge(&self, draft: &CopyDraft) -> Result<QualityScore> {
        let score: QualityScore = self
            .chat_json(
                Service::Judging,
                prompts::JUDGE_SYSTEM,
                &prompts::judge_prompt(draft),
            )
            .await?;
        score
            .validate()
            .map_err(|msg| SiteBuilderError::upstream(Service::Judging, msg))?;
        Ok(score)
    }
}

impl DesignTokenSource for OpenRouterClient {
    #[instrument(skip_all)]
    async fn tokens(&self) -> Result<DesignTokens> {
        let tokens: DesignTokens = self
            .chat_json(Service::Tokens, prompts::TOKENS_SYSTEM, prompts::TOKENS_PROMPT)
            .await?;
        tokens
            .validate()
            .map_err(|msg| SiteBuilderError::upstream(Service::Tokens, msg))?;
        Ok(tokens)
    }
}
