//! Build workspace materializer.
//!
//! Takes a validated request, drafted copy and design tokens, then writes a
//! buildable project for the static-site tool:
//!
//! ```text
//! <build_root>/build-<organization_id>/
//! ├── sitebuilder.json          (run manifest)
//! ├── src/
//! │   └── pages/
//! │       └── index.astro       (rendered entry page)
//! ├── templates/
//! │   └── <template_id>/        (copy of the template tree)
//! └── dist/                     (build output, written by the build tool)
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use sitebuilder_shared::{
    BuildOutcome, BuildRequest, CopyDraft, DesignTokens, QualityScore, Result, RunId,
    SiteBuilderError,
};
use sitebuilder_templates::{LAYOUT_COMPONENT, TemplateStore};

/// Prefix of every workspace directory under the build root.
pub const WORKSPACE_PREFIX: &str = "build-";

/// Current schema version for `sitebuilder.json`.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "sitebuilder.json";
const ENTRY_PAGE: &str = "index.astro";
const OUTPUT_DIR: &str = "dist";

/// A materialized build workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Project root handed to the build tool.
    pub root: PathBuf,
    /// Rendered entry page.
    pub entry_page: PathBuf,
    /// Copy of the template tree.
    pub template_dir: PathBuf,
    /// Where the build tool writes the artifact.
    pub output_dir: PathBuf,
}

impl Workspace {
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Write `sitebuilder.json` atomically.
    pub fn write_manifest(&self, manifest: &BuildManifest) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest).map_err(|e| {
            SiteBuilderError::validation(format!("JSON serialization failed: {e}"))
        })?;
        write_atomic(&self.manifest_path(), json.as_bytes())
    }

    /// Load `sitebuilder.json`.
    pub fn read_manifest(&self) -> Result<BuildManifest> {
        let path = self.manifest_path();
        let content =
            std::fs::read_to_string(&path).map_err(|e| SiteBuilderError::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| SiteBuilderError::validation(format!("invalid {MANIFEST_FILE}: {e}")))
    }

    /// Record the build result in the manifest.
    pub fn record_outcome(&self, outcome: &BuildOutcome) -> Result<()> {
        let mut manifest = self.read_manifest()?;
        manifest.build = Some(BuildRecord {
            success: outcome.success,
            exit_code: outcome.exit_code,
            finished_at: Utc::now(),
        });
        self.write_manifest(&manifest)?;
        debug!("manifest updated with build outcome");
        Ok(())
    }
}

/// The `sitebuilder.json` structure stored at the root of each workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub organization_id: String,
    pub organization_name: String,
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub score: QualityScore,
    pub tokens: DesignTokens,
    /// SHA-256 of the rendered entry page.
    pub entry_page_sha256: String,
    /// Populated once the build tool has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildRecord>,
}

/// Build tool result as stored in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub finished_at: DateTime<Utc>,
}

impl BuildManifest {
    pub fn new(
        run_id: RunId,
        request: &BuildRequest,
        score: QualityScore,
        tokens: &DesignTokens,
        workspace: &Workspace,
    ) -> Result<Self> {
        let page = std::fs::read(&workspace.entry_page)
            .map_err(|e| SiteBuilderError::io(&workspace.entry_page, e))?;
        Ok(Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id,
            organization_id: request.organization_id().to_string(),
            organization_name: request.organization_name().to_string(),
            template_id: request.template_id().to_string(),
            industry_code: request.industry_code().map(String::from),
            created_at: Utc::now(),
            score,
            tokens: tokens.clone(),
            entry_page_sha256: sha256_hex(&page),
            build: None,
        })
    }
}

/// Creates per-organization workspaces under a build root.
#[derive(Debug, Clone)]
pub struct WorkspaceMaterializer {
    build_root: PathBuf,
    templates: TemplateStore,
}

impl WorkspaceMaterializer {
    pub fn new(build_root: impl Into<PathBuf>, templates: TemplateStore) -> Self {
        Self {
            build_root: build_root.into(),
            templates,
        }
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Deterministic workspace location for an organization.
    pub fn workspace_root(&self, organization_id: &str) -> PathBuf {
        self.build_root
            .join(format!("{WORKSPACE_PREFIX}{organization_id}"))
    }

    /// Materialize the workspace for `request`.
    ///
    /// Re-running for the same organization reuses the directory and
    /// overwrites the entry page and template files.
    #[instrument(skip_all, fields(org = %request.organization_id(), template = %request.template_id()))]
    pub fn materialize(
        &self,
        request: &BuildRequest,
        copy: &CopyDraft,
        tokens: &DesignTokens,
    ) -> Result<Workspace> {
        // Resolve first so a missing template writes nothing.
        self.templates.resolve(request.template_id())?;

        let root = self.workspace_root(request.organization_id());
        let pages_dir = root.join("src").join("pages");
        let template_dir = root.join("templates").join(request.template_id());

        info!(path = %root.display(), "materializing workspace");

        std::fs::create_dir_all(&pages_dir)
            .map_err(|e| SiteBuilderError::workspace("create pages dir", &pages_dir, e))?;

        let entry_page = pages_dir.join(ENTRY_PAGE);
        let page = render_entry_page(request, copy, tokens);
        write_atomic(&entry_page, page.as_bytes())?;
        debug!(path = %entry_page.display(), "wrote entry page");

        let stats = self.templates.copy_into(request.template_id(), &template_dir)?;

        if !template_dir.join(LAYOUT_COMPONENT).is_file() {
            warn!(
                template = %request.template_id(),
                "template has no {LAYOUT_COMPONENT}; the build will likely fail"
            );
        }

        info!(
            files = stats.files,
            bytes = stats.bytes,
            "workspace ready"
        );

        Ok(Workspace {
            output_dir: root.join(OUTPUT_DIR),
            root,
            entry_page,
            template_dir,
        })
    }

    /// Delete one organization's workspace. Returns `false` if there was none.
    pub fn remove(&self, organization_id: &str) -> Result<bool> {
        let root = self.workspace_root(organization_id);
        if !root.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&root)
            .map_err(|e| SiteBuilderError::workspace("remove workspace", &root, e))?;
        info!(path = %root.display(), "workspace removed");
        Ok(true)
    }

    /// Organization ids that currently have a workspace, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.build_root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.build_root)
            .map_err(|e| SiteBuilderError::io(&self.build_root, e))?;

        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix(WORKSPACE_PREFIX))
                    .map(String::from)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Render the Astro entry page.
///
/// Copy and organization values are emitted as JSON string literals in the
/// frontmatter and referenced as `{expressions}` in the markup, so Astro
/// escapes them and no copy text is parsed as markup.
pub fn render_entry_page(request: &BuildRequest, copy: &CopyDraft, tokens: &DesignTokens) -> String {
    let body_font = tokens.font_pair.get(1).map(String::as_str).unwrap_or_default();
    let headline_style = format!(
        "color: {}; font-family: '{}'",
        css_color(tokens.accent_color()),
        css_font(tokens.heading_font())
    );
    let body_style = format!("font-family: '{}'", css_font(body_font));

    format!(
        r#"---
// Generated by SiteBuilder. Do not edit; rerun the build instead.
import Layout from '../../templates/{template}/{layout}';

const organizationId = {org_id};
const organizationName = {org_name};
const headline = {headline};
const body = {body};
const headlineStyle = {headline_style};
const bodyStyle = {body_style};
---
<Layout title={{organizationName}}>
  <h1 style={{headlineStyle}}>{{headline}}</h1>
  <p style={{bodyStyle}}>{{body}}</p>
  <footer data-organization-id={{organizationId}}>{{organizationName}}</footer>
</Layout>
"#,
        template = request.template_id(),
        layout = LAYOUT_COMPONENT,
        org_id = js_string(request.organization_id()),
        org_name = js_string(request.organization_name()),
        headline = js_string(&copy.headline),
        body = js_string(&copy.body),
        headline_style = js_string(&headline_style),
        body_style = js_string(&body_style),
    )
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Font names are quoted in CSS; drop characters that would end the quote.
fn css_font(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, '\'' | '"' | ';' | '\\')).collect()
}

/// Colors are unquoted; a value may not open another declaration or block.
fn css_color(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | ':' | '\'' | '"' | '\\' | '{' | '}' | '<' | '>'))
        .collect()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write to a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content)
        .map_err(|e| SiteBuilderError::workspace("write temp file", &temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SiteBuilderError::workspace("rename file", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sb-{label}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn materializer() -> WorkspaceMaterializer {
        let store = temp_dir("templates");
        let basic = store.join("basic");
        std::fs::create_dir_all(basic.join("styles")).unwrap();
        std::fs::write(basic.join(LAYOUT_COMPONENT), "<html><slot /></html>").unwrap();
        std::fs::write(basic.join("styles/site.css"), "h1{}").unwrap();
        WorkspaceMaterializer::new(temp_dir("builds"), TemplateStore::new(store))
    }

    fn request(template: &str) -> BuildRequest {
        BuildRequest::new("999000999", "Acme", template, Some("62.01".into())).unwrap()
    }

    fn copy() -> CopyDraft {
        CopyDraft {
            headline: "H".into(),
            body: "B".into(),
        }
    }

    fn tokens() -> DesignTokens {
        DesignTokens {
            palette: vec!["#1f3a5f".into(), "#ffffff".into()],
            font_pair: vec!["Inter".into(), "Lora".into()],
        }
    }

    #[test]
    fn workspace_root_is_deterministic() {
        let m = materializer();
        assert_eq!(m.workspace_root("42"), m.workspace_root("42"));
        assert!(m.workspace_root("42").ends_with("build-42"));
    }

    #[test]
    fn materialize_writes_page_and_template() {
        let m = materializer();
        let ws = m.materialize(&request("basic"), &copy(), &tokens()).unwrap();

        assert_eq!(ws.root, m.workspace_root("999000999"));
        assert_eq!(ws.output_dir, ws.root.join("dist"));
        assert!(ws.template_dir.join(LAYOUT_COMPONENT).is_file());
        assert!(ws.template_dir.join("styles/site.css").is_file());

        let page = std::fs::read_to_string(&ws.entry_page).unwrap();
        assert!(page.contains("import Layout from '../../templates/basic/Layout.astro'"));
        assert!(page.contains(r#"const headline = "H";"#));
        assert!(page.contains(r#"const body = "B";"#));
        assert!(page.contains(r#"const organizationId = "999000999";"#));
        assert!(page.contains("color: #1f3a5f; font-family: 'Inter'"));
        assert!(page.contains("<h1 style={headlineStyle}>{headline}</h1>"));
    }

    #[test]
    fn materialize_is_idempotent() {
        let m = materializer();
        let first = m.materialize(&request("basic"), &copy(), &tokens()).unwrap();

        let updated = CopyDraft {
            headline: "Second".into(),
            body: "Run".into(),
        };
        let second = m.materialize(&request("basic"), &updated, &tokens()).unwrap();

        assert_eq!(first.root, second.root);
        let page = std::fs::read_to_string(&second.entry_page).unwrap();
        assert!(page.contains(r#"const headline = "Second";"#));
    }

    #[test]
    fn missing_template_writes_nothing() {
        let m = materializer();
        let err = m
            .materialize(&request("does-not-exist"), &copy(), &tokens())
            .unwrap_err();

        assert!(matches!(err, SiteBuilderError::TemplateNotFound { .. }));
        assert!(!m.workspace_root("999000999").exists());
    }

    #[test]
    fn copy_text_cannot_break_out_of_the_template() {
        let m = materializer();
        let hostile = CopyDraft {
            headline: "\"; import x from 'y'; //".into(),
            body: "</Layout><script>alert(1)</script>\n---".into(),
        };
        let ws = m.materialize(&request("basic"), &hostile, &tokens()).unwrap();
        let page = std::fs::read_to_string(&ws.entry_page).unwrap();

        assert!(page.contains(r#"const headline = "\"; import x from 'y'; //";"#));
        assert!(page.contains(r#"const body = "</Layout><script>alert(1)</script>\n---";"#));
        // Frontmatter fences are the only lines that are exactly `---`.
        assert_eq!(page.lines().filter(|l| *l == "---").count(), 2);
    }

    #[test]
    fn font_names_are_sanitized() {
        let req = request("basic");
        let tokens = DesignTokens {
            palette: vec!["red".into()],
            font_pair: vec!["Evil'; color: red".into(), "Lora".into()],
        };
        let page = render_entry_page(&req, &copy(), &tokens);
        assert!(page.contains("font-family: 'Evil color: red'"));
    }

    #[test]
    fn accent_color_cannot_add_declarations() {
        let req = request("basic");
        let tokens = DesignTokens {
            palette: vec!["red; background:url(x)".into()],
            font_pair: vec!["Inter".into(), "Lora".into()],
        };
        let page = render_entry_page(&req, &copy(), &tokens);
        assert!(page.contains("color: red backgroundurl(x); font-family: 'Inter'"));
        assert!(!page.contains("background:"));

        let rgb = DesignTokens {
            palette: vec!["rgb(10, 20, 30)".into()],
            ..tokens
        };
        let page = render_entry_page(&req, &copy(), &rgb);
        assert!(page.contains("color: rgb(10, 20, 30);"));
    }

    #[test]
    fn manifest_roundtrip_and_outcome() {
        let m = materializer();
        let req = request("basic");
        let ws = m.materialize(&req, &copy(), &tokens()).unwrap();
        let score = QualityScore {
            fluency: 4.2,
            originality: 3.8,
        };

        let manifest = BuildManifest::new(RunId::new(), &req, score, &tokens(), &ws).unwrap();
        ws.write_manifest(&manifest).unwrap();

        let page = std::fs::read(&ws.entry_page).unwrap();
        let loaded = ws.read_manifest().unwrap();
        assert_eq!(loaded.entry_page_sha256, sha256_hex(&page));
        assert_eq!(loaded.industry_code.as_deref(), Some("62.01"));
        assert!(loaded.build.is_none());

        let outcome = BuildOutcome {
            success: false,
            artifact_path: None,
            exit_code: Some(1),
            diagnostics: "boom".into(),
        };
        ws.record_outcome(&outcome).unwrap();
        let loaded = ws.read_manifest().unwrap();
        let record = loaded.build.expect("build record");
        assert!(!record.success);
        assert_eq!(record.exit_code, Some(1));
    }

    #[test]
    fn remove_and_list_workspaces() {
        let m = materializer();
        assert!(m.list().unwrap().is_empty());

        m.materialize(&request("basic"), &copy(), &tokens()).unwrap();
        let other = BuildRequest::new("123", "Other", "basic", None).unwrap();
        m.materialize(&other, &copy(), &tokens()).unwrap();
        assert_eq!(m.list().unwrap(), vec!["123", "999000999"]);

        assert!(m.remove("123").unwrap());
        assert!(!m.remove("123").unwrap());
        assert_eq!(m.list().unwrap(), vec!["999000999"]);
    }
}
