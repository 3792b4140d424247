//! External collaborator traits: the seams a real Jsonnet toolchain plugs
//! into. The crate ships a default filesystem [`Importer`] and a default
//! no-op [`Evaluator`] so it builds and runs standalone; a real VM or
//! formatter is out of scope, but the capability is wired behind a
//! pluggable trait, matching [`crate::discover`]'s working-default
//! posture for file discovery.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::diagnostic::Diagnostic;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import '{path}' not found relative to '{from}' or any search path")]
    NotFound { from: String, path: String },
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// `import(from, path) -> (bytes, resolved_filename)`.
pub trait Importer: Send + Sync {
    fn import(&self, from: &str, path: &str) -> Result<(String, String), ImportError>;
}

/// Reads `(from, path)` relative to `from`'s directory, falling back to
/// configured search paths on a miss.
pub struct FilesystemImporter {
    pub search_paths: Vec<PathBuf>,
}

impl FilesystemImporter {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }
}

impl Importer for FilesystemImporter {
    fn import(&self, from: &str, path: &str) -> Result<(String, String), ImportError> {
        let from_dir = Path::new(from).parent().unwrap_or_else(|| Path::new(""));
        let mut candidates = vec![from_dir.join(path)];
        candidates.extend(self.search_paths.iter().map(|p| p.join(path)));

        for candidate in &candidates {
            match fs::read_to_string(candidate) {
                Ok(text) => {
                    return Ok((text, candidate.to_string_lossy().into_owned()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ImportError::Io {
                        path: candidate.to_string_lossy().into_owned(),
                        source: e,
                    });
                }
            }
        }
        Err(ImportError::NotFound {
            from: from.to_string(),
            path: path.to_string(),
        })
    }
}

/// `evaluate(filename, source) -> [diagnostic]`: runtime evaluation
/// diagnostics, enabled when a real VM is plugged in.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, filename: &str, source: &str) -> Vec<Diagnostic>;
}

/// Ships no runtime diagnostics: static analysis is this crate's whole
/// job. A real Jsonnet VM can be plugged in by implementing [`Evaluator`]
/// and handing it to [`crate::session::Session::new`].
pub struct NoopEvaluator;

impl Evaluator for NoopEvaluator {
    fn evaluate(&self, _filename: &str, _source: &str) -> Vec<Diagnostic> {
        Vec::new()
    }
}

#[derive(Debug, Error)]
#[error("formatting not supported: {0}")]
pub struct FormatError(pub String);

/// `format(filename, text, options) -> text`.
pub trait Formatter: Send + Sync {
    fn format(&self, filename: &str, text: &str, options: &format::FormatOptions) -> Result<String, FormatError>;
}

/// Returns `text` unchanged. A real Jsonnet formatter is out of scope for
/// this crate; this keeps the `formatting` LSP capability wired but inert
/// until a real collaborator is plugged in.
pub struct IdentityFormatter;

impl Formatter for IdentityFormatter {
    fn format(&self, _filename: &str, text: &str, _options: &format::FormatOptions) -> Result<String, FormatError> {
        Ok(text.to_string())
    }
}

pub mod format {
    /// The options a [`super::Formatter`] recognises.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
    pub struct FormatOptions {
        pub indent: u32,
        pub max_blank_lines: u32,
        pub string_style: StringStyle,
        pub comment_style: CommentStyle,
        pub pretty_field_names: bool,
        pub pad_arrays: bool,
        pub pad_objects: bool,
        pub sort_imports: bool,
        pub implicit_plus: bool,
    }

    impl Default for FormatOptions {
        fn default() -> Self {
            Self {
                indent: 2,
                max_blank_lines: 2,
                string_style: StringStyle::Leave,
                comment_style: CommentStyle::Leave,
                pretty_field_names: true,
                pad_arrays: false,
                pad_objects: true,
                sort_imports: false,
                implicit_plus: false,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
    #[serde(rename_all = "snake_case")]
    pub enum StringStyle {
        Single,
        Double,
        Leave,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
    #[serde(rename_all = "snake_case")]
    pub enum CommentStyle {
        Hash,
        Slash,
        Leave,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_importer_reads_relative_to_from() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.jsonnet");
        let imported = dir.path().join("b.jsonnet");
        std::fs::write(&imported, "{}").unwrap();

        let importer = FilesystemImporter::new(Vec::new());
        let (text, resolved) = importer
            .import(from.to_str().unwrap(), "b.jsonnet")
            .expect("import ok");
        assert_eq!(text, "{}");
        assert!(resolved.ends_with("b.jsonnet"));
    }

    #[test]
    fn filesystem_importer_falls_back_to_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("lib");
        std::fs::create_dir(&lib_dir).unwrap();
        std::fs::write(lib_dir.join("util.libsonnet"), "{}").unwrap();

        let importer = FilesystemImporter::new(vec![lib_dir]);
        let from = dir.path().join("a.jsonnet");
        let result = importer.import(from.to_str().unwrap(), "util.libsonnet");
        assert!(result.is_ok());
    }

    #[test]
    fn noop_evaluator_returns_nothing() {
        let evaluator = NoopEvaluator;
        assert!(evaluator.evaluate("a.jsonnet", "1").is_empty());
    }

    #[test]
    fn identity_formatter_is_identity() {
        let formatter = IdentityFormatter;
        let out = formatter
            .format("a.jsonnet", "{ a: 1 }", &format::FormatOptions::default())
            .unwrap();
        assert_eq!(out, "{ a: 1 }");
    }
}
