//! Document discovery and loading.
//!
//! Documents come from two places in `[documents]`:
//!
//! - `named`: an explicit logical name → path map (e.g.
//!   `"Company Policies" = "documents/CompanyPolicies.pdf"`).
//! - `directory`: scanned recursively with `include_globs` /
//!   `exclude_globs`; each file's stem becomes its name.
//!
//! A name configured in `named` wins over a scanned file with the same stem.
//! A document that cannot be read or extracted is reported as
//! [`Error::Ingestion`] and skipped by the caller; it never aborts the load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use nestie_core::error::Error;
use nestie_core::models::Document;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::extract::{content_type_for, extract_text};

/// A document to load: logical name plus file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub name: String,
    pub path: PathBuf,
}

/// Every configured document source, sorted by name.
pub fn discover(config: &DocumentsConfig) -> Result<Vec<DocumentSource>> {
    let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();

    if let Some(root) = &config.directory {
        for path in scan_directory(root, &config.include_globs, &config.exclude_globs)? {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            if let Some(previous) = sources.insert(stem.clone(), path.clone()) {
                tracing::warn!(
                    document = %stem,
                    kept = %path.display(),
                    dropped = %previous.display(),
                    "two files share a document name"
                );
            }
        }
    }

    for (name, path) in &config.named {
        sources.insert(name.clone(), path.clone());
    }

    Ok(sources
        .into_iter()
        .map(|(name, path)| DocumentSource { name, path })
        .collect())
}

fn scan_directory(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("documents.directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    excludes.extend(exclude.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push(path.to_path_buf());
    }
    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Read and extract one document.
pub fn load_document(source: &DocumentSource, max_bytes: u64) -> Result<Document, Error> {
    let content_type = content_type_for(&source.path).ok_or_else(|| {
        Error::ingestion(
            &source.name,
            format!("unsupported file type: {}", source.path.display()),
        )
    })?;

    let metadata = std::fs::metadata(&source.path)
        .map_err(|e| Error::ingestion(&source.name, format!("{}: {}", source.path.display(), e)))?;
    if metadata.len() > max_bytes {
        return Err(Error::ingestion(
            &source.name,
            format!("file is {} bytes, limit is {}", metadata.len(), max_bytes),
        ));
    }

    let bytes = std::fs::read(&source.path)
        .map_err(|e| Error::ingestion(&source.name, format!("{}: {}", source.path.display(), e)))?;
    let text = extract_text(&bytes, content_type).map_err(|e| Error::ingestion(&source.name, e))?;

    if text.trim().is_empty() {
        return Err(Error::ingestion(&source.name, "no extractable text"));
    }

    Ok(Document::new(
        &source.name,
        source.path.display().to_string(),
        content_type,
        text,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documents_config(dir: &Path) -> DocumentsConfig {
        DocumentsConfig {
            directory: Some(dir.to_path_buf()),
            ..DocumentsConfig::default()
        }
    }

    #[test]
    fn test_discover_directory_and_named() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("Handbook.md"), "# Handbook").unwrap();
        std::fs::write(tmp.path().join("sub/Faq.txt"), "faq").unwrap();
        std::fs::write(tmp.path().join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(tmp.path().join(".hidden.txt"), "no").unwrap();
        let named_path = tmp.path().join("policies.txt");
        std::fs::write(&named_path, "policy").unwrap();

        let mut config = documents_config(tmp.path());
        config
            .named
            .insert("Company Policies".to_string(), named_path.clone());

        let sources = discover(&config).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Company Policies", "Faq", "Handbook", "policies"]);
    }

    #[test]
    fn test_discover_missing_directory() {
        let config = documents_config(Path::new("/no/such/dir"));
        assert!(discover(&config).is_err());
    }

    #[test]
    fn test_load_text_document() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("wifi.txt");
        std::fs::write(&path, "The Wi-Fi password is Blueberry42").unwrap();
        let doc = load_document(
            &DocumentSource {
                name: "IT Guide".to_string(),
                path,
            },
            1024,
        )
        .unwrap();
        assert_eq!(doc.name, "IT Guide");
        assert_eq!(doc.content_type, "text/plain");
        assert!(doc.text.contains("Blueberry42"));
    }

    #[test]
    fn test_load_failures_are_ingestion_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = DocumentSource {
            name: "Missing".to_string(),
            path: tmp.path().join("missing.pdf"),
        };
        assert!(matches!(
            load_document(&missing, 1024),
            Err(Error::Ingestion { document, .. }) if document == "Missing"
        ));

        let corrupt_path = tmp.path().join("corrupt.pdf");
        std::fs::write(&corrupt_path, b"definitely not a pdf").unwrap();
        let corrupt = DocumentSource {
            name: "Corrupt".to_string(),
            path: corrupt_path,
        };
        assert!(matches!(
            load_document(&corrupt, 1024),
            Err(Error::Ingestion { .. })
        ));

        let big_path = tmp.path().join("big.txt");
        std::fs::write(&big_path, "x".repeat(100)).unwrap();
        let big = DocumentSource {
            name: "Big".to_string(),
            path: big_path,
        };
        assert!(load_document(&big, 10).is_err());
    }
}
