//! Project configuration: discovery and parsing of `jsonnet-ls.json`, plus
//! glob-based file discovery for the `check` CLI surface.
//!
//! `Config`/`find_config_file` resolve ordered include/exclude glob
//! patterns via `globset`/`ignore`, carrying search paths and formatter
//! options rather than schema mappings.

use globset::{Glob, GlobMatcher};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::diagnostic::Warning;
use crate::eval::format::FormatOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid glob pattern '{pattern}': {source}")]
    GlobError {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Configuration file for jsonnet-ls, the Jsonnet language server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "jsonnet-ls configuration")]
pub struct Config {
    /// URL to the config's own JSON Schema, for editor self-completion.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,

    /// Glob patterns for file discovery by the `check` subcommand. Patterns
    /// prefixed with `!` are excludes; later patterns override earlier ones.
    #[serde(default = "default_files")]
    pub files: Vec<String>,

    /// Additional import search paths (relative to this file's directory),
    /// consulted by [`crate::eval::FilesystemImporter`] when an import
    /// doesn't resolve relative to the importing file.
    #[serde(default)]
    pub search_paths: Vec<String>,

    /// Default formatter options, used by the LSP `formatting` handler
    /// when a real [`crate::eval::Formatter`] is plugged in.
    #[serde(default)]
    pub format: FormatOptions,
}

fn default_files() -> Vec<String> {
    vec!["**/*.jsonnet".into(), "**/*.libsonnet".into()]
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Default config when no config file is found.
    pub fn default_config() -> Self {
        Config {
            schema_url: None,
            files: default_files(),
            search_paths: Vec::new(),
            format: FormatOptions::default(),
        }
    }

    /// Search paths resolved to absolute paths under `project_root`.
    pub fn resolved_search_paths(&self, project_root: &Path) -> Vec<PathBuf> {
        self.search_paths.iter().map(|p| project_root.join(p)).collect()
    }
}

/// Discover the config file by walking up from the start path.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = if start.is_file() {
        start.parent()?
    } else {
        start
    };

    loop {
        let candidate = dir.join("jsonnet-ls.json");
        if candidate.exists() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}

/// A single pattern entry for ordered include/exclude evaluation.
struct PatternEntry {
    exclude: bool,
    glob: GlobMatcher,
}

fn build_ordered_patterns(patterns: &[String]) -> Result<Vec<PatternEntry>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            let (exclude, raw) = match pattern.strip_prefix('!') {
                Some(stripped) => (true, stripped),
                None => (false, pattern.as_str()),
            };
            let glob = Glob::new(raw)
                .map_err(|e| ConfigError::GlobError {
                    pattern: pattern.clone(),
                    source: e,
                })?
                .compile_matcher();
            Ok(PatternEntry { exclude, glob })
        })
        .collect()
}

fn matches_ordered_patterns(path: &str, patterns: &[PatternEntry]) -> bool {
    let mut matched = false;
    for entry in patterns {
        if entry.glob.is_match(path) {
            matched = !entry.exclude;
        }
    }
    matched
}

/// Discover files under each of `roots` using `config.files` patterns,
/// respecting `.gitignore`. Returns `(files, warnings)` where warnings
/// include any walk errors encountered.
pub fn discover_files(
    project_root: &Path,
    roots: &[PathBuf],
    config: &Config,
) -> Result<(Vec<PathBuf>, Vec<Warning>), ConfigError> {
    let patterns = build_ordered_patterns(&config.files)?;

    let mut files = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for root in roots {
        let walker = ignore::WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warnings.push(Warning {
                        code: "walk".into(),
                        message: format!("error walking directory: {e}"),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let relative = match path.strip_prefix(project_root) {
                Ok(r) => r,
                Err(_) => path,
            };
            let rel_str = relative.to_string_lossy();

            if matches_ordered_patterns(rel_str.as_ref(), &patterns) && seen.insert(path.to_path_buf()) {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok((files, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_jsonnet_globs() {
        let config = Config::default_config();
        assert!(config.files.contains(&"**/*.jsonnet".to_string()));
        assert!(config.search_paths.is_empty());
    }

    #[test]
    fn find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("jsonnet-ls.json"), "{}").unwrap();
        let found = find_config_file(&nested).expect("config found");
        assert_eq!(found, dir.path().join("jsonnet-ls.json"));
    }

    #[test]
    fn ordered_include_exclude_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vendor")).unwrap();
        std::fs::write(dir.path().join("top.jsonnet"), "{}").unwrap();
        std::fs::write(dir.path().join("vendor/blocked.jsonnet"), "{}").unwrap();
        std::fs::write(dir.path().join("vendor/allow.jsonnet"), "{}").unwrap();

        let config = Config {
            schema_url: None,
            files: vec![
                "**/*.jsonnet".into(),
                "!vendor/**".into(),
                "vendor/allow.jsonnet".into(),
            ],
            search_paths: Vec::new(),
            format: FormatOptions::default(),
        };

        let (files, _warnings) =
            discover_files(dir.path(), std::slice::from_ref(&dir.path().to_path_buf()), &config).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"top.jsonnet".to_string()));
        assert!(names.contains(&"vendor/allow.jsonnet".to_string()));
        assert!(!names.contains(&"vendor/blocked.jsonnet".to_string()));
    }
}
