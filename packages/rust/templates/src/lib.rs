//! Read-only access to the template store.
//!
//! A template store is a directory whose immediate subdirectories are
//! templates, each named by its template identifier:
//!
//! ```text
//! templates/
//! ├── basic/
//! │   ├── Layout.astro
//! │   └── assets/...
//! └── modern/
//!     └── ...
//! ```
//!
//! Nothing in this crate ever writes into the store.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use sitebuilder_shared::{Result, SiteBuilderError, validate_path_segment};

/// Layout component every template is expected to provide.
pub const LAYOUT_COMPONENT: &str = "Layout.astro";

/// Totals from a template copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub bytes: u64,
}

/// Handle on a template store rooted at a directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a template identifier to its source directory.
    ///
    /// Fails with [`SiteBuilderError::TemplateNotFound`] if the directory is
    /// absent (or the identifier is not a single path segment).
    pub fn resolve(&self, template_id: &str) -> Result<PathBuf> {
        let path = self.root.join(template_id);
        if validate_path_segment("templateId", template_id).is_err() || !path.is_dir() {
            return Err(SiteBuilderError::TemplateNotFound {
                template_id: template_id.to_string(),
                path,
            });
        }
        Ok(path)
    }

    /// Template identifiers present in the store, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| SiteBuilderError::io(&self.root, e))?;

        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(String::from))
            .filter(|name| !name.starts_with('.'))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Recursively copy a template's tree into `dest`.
    ///
    /// The template is resolved before `dest` is touched, so an unknown
    /// template leaves the destination untouched.
    #[instrument(skip_all, fields(template_id = %template_id, dest = %dest.display()))]
    pub fn copy_into(&self, template_id: &str, dest: &Path) -> Result<CopyStats> {
        let source = self.resolve(template_id)?;
        let mut stats = CopyStats::default();
        copy_tree(&source, dest, &mut stats)?;
        debug!(files = stats.files, bytes = stats.bytes, "template copied");
        Ok(stats)
    }
}

fn copy_tree(source: &Path, dest: &Path, stats: &mut CopyStats) -> Result<()> {
    std::fs::create_dir_all(dest)
        .map_err(|e| SiteBuilderError::workspace("create template dir", dest, e))?;

    let entries = std::fs::read_dir(source)
        .map_err(|e| SiteBuilderError::workspace("read template dir", source, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| SiteBuilderError::workspace("read template dir", source, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());

        // Follows symlinks, so linked assets are copied as regular files.
        let meta = std::fs::metadata(&from)
            .map_err(|e| SiteBuilderError::workspace("stat template entry", &from, e))?;

        if meta.is_dir() {
            copy_tree(&from, &to, stats)?;
        } else if meta.is_file() {
            let bytes = std::fs::copy(&from, &to)
                .map_err(|e| SiteBuilderError::workspace("copy template file", &to, e))?;
            stats.files += 1;
            stats.bytes += bytes;
        } else {
            debug!(path = %from.display(), "skipping special file");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sb-{label}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn seed_store() -> TemplateStore {
        let root = temp_dir("store");
        let basic = root.join("basic");
        std::fs::create_dir_all(basic.join("assets/css")).unwrap();
        std::fs::write(basic.join(LAYOUT_COMPONENT), "<slot />").unwrap();
        std::fs::write(basic.join("assets/css/site.css"), "body{}").unwrap();
        std::fs::create_dir_all(root.join("modern")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("README.md"), "not a template").unwrap();
        TemplateStore::new(root)
    }

    #[test]
    fn resolve_existing_template() {
        let store = seed_store();
        let path = store.resolve("basic").unwrap();
        assert!(path.join(LAYOUT_COMPONENT).is_file());
    }

    #[test]
    fn resolve_missing_template() {
        let store = seed_store();
        let err = store.resolve("does-not-exist").unwrap_err();
        assert!(matches!(err, SiteBuilderError::TemplateNotFound { .. }));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let store = seed_store();
        assert!(matches!(
            store.resolve(".."),
            Err(SiteBuilderError::TemplateNotFound { .. })
        ));
        assert!(store.resolve("basic/assets").is_err());
    }

    #[test]
    fn list_skips_files_and_hidden_dirs() {
        let store = seed_store();
        assert_eq!(store.list().unwrap(), vec!["basic", "modern"]);
    }

    #[test]
    fn copy_into_copies_whole_tree() {
        let store = seed_store();
        let dest = temp_dir("copy").join("templates").join("basic");

        let stats = store.copy_into("basic", &dest).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, ("<slot />".len() + "body{}".len()) as u64);
        assert_eq!(
            std::fs::read_to_string(dest.join("assets/css/site.css")).unwrap(),
            "body{}"
        );
    }

    #[test]
    fn copy_into_is_repeatable() {
        let store = seed_store();
        let dest = temp_dir("repeat").join("basic");
        store.copy_into("basic", &dest).unwrap();
        store.copy_into("basic", &dest).unwrap();
        assert!(dest.join(LAYOUT_COMPONENT).is_file());
    }

    #[test]
    fn copy_of_missing_template_writes_nothing() {
        let store = seed_store();
        let dest = temp_dir("missing").join("templates").join("ghost");

        let err = store.copy_into("ghost", &dest).unwrap_err();

        assert!(matches!(err, SiteBuilderError::TemplateNotFound { .. }));
        assert!(!dest.exists());
    }
}
