//! Core domain types for a site build run.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SiteBuilderError};

/// Upper bound of the judging scale.
pub const MAX_SCORE: f64 = 5.0;

/// Identifiers that end up as path segments must match this.
static PATH_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The external content services the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Drafting,
    Judging,
    Tokens,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::Judging => "judging",
            Self::Tokens => "tokens",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BuildRequest
// ---------------------------------------------------------------------------

/// Raw inbound payload, before validation.
///
/// Accepts both the camelCase field names and the short names used by the
/// legacy intake form (`orgnr`, `name`, `template_id`, `nace_code`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequestPayload {
    #[serde(default, alias = "orgnr", alias = "organization_id")]
    pub organization_id: Option<String>,
    #[serde(default, alias = "name", alias = "organization_name")]
    pub organization_name: Option<String>,
    #[serde(default, alias = "template_id")]
    pub template_id: Option<String>,
    #[serde(default, alias = "nace_code", alias = "industry_code")]
    pub industry_code: Option<String>,
}

/// A validated request to build one organization's site.
///
/// Built only through [`BuildRequest::from_payload`]; not deserializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    organization_id: String,
    organization_name: String,
    template_id: String,
    industry_code: Option<String>,
}

impl BuildRequest {
    /// Validate and construct a request.
    pub fn new(
        organization_id: impl Into<String>,
        organization_name: impl Into<String>,
        template_id: impl Into<String>,
        industry_code: Option<String>,
    ) -> Result<Self> {
        Self::from_payload(BuildRequestPayload {
            organization_id: Some(organization_id.into()),
            organization_name: Some(organization_name.into()),
            template_id: Some(template_id.into()),
            industry_code,
        })
    }

    /// Validate an inbound payload. All missing fields are reported at once.
    pub fn from_payload(payload: BuildRequestPayload) -> Result<Self> {
        let organization_id = trimmed(payload.organization_id);
        let organization_name = trimmed(payload.organization_name);
        let template_id = trimmed(payload.template_id);
        let industry_code = trimmed(payload.industry_code);

        let mut missing = Vec::new();
        if organization_id.is_none() {
            missing.push("organizationId");
        }
        if organization_name.is_none() {
            missing.push("organizationName");
        }
        if template_id.is_none() {
            missing.push("templateId");
        }
        let (Some(organization_id), Some(organization_name), Some(template_id)) =
            (organization_id, organization_name, template_id)
        else {
            return Err(SiteBuilderError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        };

        validate_path_segment("organizationId", &organization_id)?;
        validate_path_segment("templateId", &template_id)?;

        Ok(Self {
            organization_id,
            organization_name,
            template_id,
            industry_code,
        })
    }

    /// Parse and validate a JSON payload.
    pub fn from_json(json: &str) -> Result<Self> {
        let payload: BuildRequestPayload = serde_json::from_str(json)
            .map_err(|e| SiteBuilderError::validation(format!("malformed request: {e}")))?;
        Self::from_payload(payload)
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn organization_name(&self) -> &str {
        &self.organization_name
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn industry_code(&self) -> Option<&str> {
        self.industry_code.as_deref()
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Check that `value` is usable as a single directory name.
pub fn validate_path_segment(field: &str, value: &str) -> Result<()> {
    if value == "." || value == ".." || !PATH_SEGMENT_RE.is_match(value) {
        return Err(SiteBuilderError::validation(format!(
            "{field} '{value}' must contain only letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Drafted page copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyDraft {
    pub headline: String,
    pub body: String,
}

/// Judging scores for a [`CopyDraft`], each on a 0–5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub fluency: f64,
    pub originality: f64,
}

impl QualityScore {
    /// Reject scores outside the judging scale.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [("fluency", self.fluency), ("originality", self.originality)] {
            if !value.is_finite() || !(0.0..=MAX_SCORE).contains(&value) {
                return Err(format!("{name} score {value} outside 0-{MAX_SCORE}"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fluency {:.2}, originality {:.2}",
            self.fluency, self.originality
        )
    }
}

/// Visual parameters applied to the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignTokens {
    /// Ordered color values; the first is the accent color.
    pub palette: Vec<String>,
    /// Heading font followed by body font.
    pub font_pair: Vec<String>,
}

impl DesignTokens {
    /// Require a non-blank accent color and exactly two fonts.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.palette.first().is_none_or(|c| c.trim().is_empty()) {
            return Err(format!(
                "palette must start with an accent color, got {:?}",
                self.palette
            ));
        }
        if self.font_pair.len() != 2 || self.font_pair.iter().any(|f| f.trim().is_empty()) {
            return Err(format!(
                "font pair must name exactly two fonts, got {:?}",
                self.font_pair
            ));
        }
        Ok(())
    }

    pub fn accent_color(&self) -> &str {
        self.palette.first().map(String::as_str).unwrap_or_default()
    }

    pub fn heading_font(&self) -> &str {
        self.font_pair.first().map(String::as_str).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// BuildOutcome
// ---------------------------------------------------------------------------

/// Terminal value of one build tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub success: bool,
    /// Output directory, set on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured output, set on failure.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub diagnostics: String,
}
