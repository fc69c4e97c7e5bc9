//! Directory loader for source documents.
//!
//! Walks a directory tree, selects files by include/exclude globs (matched
//! against the path relative to the root), extracts their text and
//! normalizes it into [`Document`]s that keep only their `source`. A PDF
//! becomes one document per non-empty page, all sharing the file's path.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::extract::{content_type_for, extract_pages};
use crate::models::Document;

/// Outcome of loading a directory.
#[derive(Debug, Default)]
pub struct Loaded {
    pub documents: Vec<Document>,
    /// Files that matched but could not be read or extracted.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Lists the files under `root` selected by the configured globs, sorted.
pub fn scan_files(root: &Path, settings: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Document directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&settings.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(settings.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(settings.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Loads and normalizes every selected file under `root`.
///
/// Unreadable or unextractable files are skipped and reported, never fatal.
pub async fn load_documents(root: &Path, settings: &IngestConfig) -> Result<Loaded> {
    let files = scan_files(root, settings)?;
    let mut loaded = Loaded::default();

    for path in files {
        let task_path = path.clone();
        let result = tokio::task::spawn_blocking(move || load_file(&task_path)).await?;
        match result {
            Ok(docs) => loaded.documents.extend(docs),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping document");
                loaded.skipped.push((path, e.to_string()));
            }
        }
    }

    Ok(loaded)
}

/// Reads one file into [`Document`]s, one per non-empty page; `source` is
/// the path as walked.
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let content_type = content_type_for(path)
        .ok_or_else(|| anyhow::anyhow!("no extractor for {}", path.display()))?;
    let bytes = std::fs::read(path)?;
    let pages = extract_pages(&bytes, content_type)?;
    let source = path.to_string_lossy().into_owned();

    Ok(pages
        .into_iter()
        .filter(|text| !text.trim().is_empty())
        .map(|text| Document {
            text,
            source: source.clone(),
        })
        .collect())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings(globs: &[&str]) -> IngestConfig {
        IngestConfig {
            include_globs: globs.iter().map(|g| g.to_string()).collect(),
            ..IngestConfig::default()
        }
    }

    #[test]
    fn test_scan_is_recursive_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("nested/deeper/b.txt"), "b").unwrap();
        fs::write(root.join("nested/c.png"), "c").unwrap();

        let files = scan_files(root, &settings(&["**/*.txt"])).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.txt", "nested/deeper/b.txt"]);
    }

    #[test]
    fn test_default_excludes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/notes.txt"), "x").unwrap();
        fs::write(root.join("kept.txt"), "y").unwrap();

        let files = scan_files(root, &settings(&["**/*.txt"])).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("kept.txt"));
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        let err = scan_files(&tmp.path().join("nope"), &settings(&["**/*.pdf"])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_load_keeps_path_as_source_and_skips_bad_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("good.txt"), "Migraine is a headache disorder.").unwrap();
        fs::write(root.join("broken.pdf"), "definitely not a pdf").unwrap();

        let loaded = load_documents(root, &settings(&["**/*.txt", "**/*.pdf"]))
            .await
            .unwrap();
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.skipped.len(), 1);
        assert!(loaded.skipped[0].0.ends_with("broken.pdf"));

        let doc = &loaded.documents[0];
        assert_eq!(doc.source, root.join("good.txt").to_string_lossy());
        assert_eq!(doc.text, "Migraine is a headache disorder.");
    }
}
