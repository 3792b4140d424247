//! One-shot file check driver: parse + lint (+ optional evaluation) a
//! single Jsonnet file, for the `check` CLI subcommand and for embedders
//! that want a synchronous "lint this file" API without standing up an
//! [`crate::overlay::Overlay`].
//!
//! One function threads a file's content through parsing, analysis, and
//! an optional external collaborator, returning a result plus any
//! non-fatal warnings.

use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::Range;
use crate::diagnostic::Diagnostic;
use crate::eval::{Evaluator, FilesystemImporter, Importer, NoopEvaluator};
use crate::jparser;
use crate::resolver::{ImportResolver, Resolver};
use crate::session::Session;
use crate::{ast, linter};

/// A parse failure: kept separate from [`Diagnostic`] because it isn't one
/// of the linter's fixed codes — it comes from the parser, before the
/// linter ever runs.
pub struct ParseFailure {
    pub message: String,
    pub range: Range,
}

/// The outcome of checking one file.
pub struct FileResult {
    pub path: String,
    /// Set when the file failed to parse outright (no recovery possible
    /// without a live edit stream — the `check` surface is a one-shot
    /// parse, so the incremental recovery shim never applies here).
    pub parse_error: Option<ParseFailure>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileResult {
    pub fn is_clean(&self) -> bool {
        self.parse_error.is_none() && !self.diagnostics.iter().any(|d| d.severity == crate::diagnostic::Severity::Error)
    }
}

/// Parse and lint one file's content, using a fresh, single-file
/// [`Session`] bound to `path` for import resolution.
///
/// `search_paths` are additional import roots; imports are otherwise
/// resolved relative to `path`'s directory via [`FilesystemImporter`].
pub fn check_file(path: &str, source: &str, search_paths: Vec<PathBuf>) -> FileResult {
    check_file_with(
        path,
        source,
        Box::new(FilesystemImporter::new(search_paths)),
        Box::new(NoopEvaluator),
    )
}

/// As [`check_file`], but with explicit [`Importer`]/[`Evaluator`]
/// collaborators — used by tests and by embedders wiring a real Jsonnet
/// VM.
pub fn check_file_with(
    path: &str,
    source: &str,
    importer: Box<dyn Importer>,
    evaluator: Box<dyn Evaluator>,
) -> FileResult {
    let outcome = jparser::parse(path, source);

    let Some(root) = outcome.ast else {
        return FileResult {
            path: path.to_string(),
            parse_error: outcome.error.map(|e| ParseFailure {
                message: e.message,
                range: e.range,
            }),
            diagnostics: Vec::new(),
        };
    };

    let session = Rc::new(Session::new(importer, evaluator));
    session.set_active_uri(path);

    let comments: Rc<Vec<ast::Comment>> = Rc::new(outcome.comments);
    let resolver = Resolver::new(
        root.clone(),
        Rc::from(path),
        comments,
        session.clone() as Rc<dyn ImportResolver>,
    );

    let mut diagnostics = linter::lint(&root, &resolver);
    diagnostics.extend(session.evaluate(path, source));
    crate::diagnostic::sort_diagnostics(&mut diagnostics);

    FileResult {
        path: path.to_string(),
        parse_error: None,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unused_local() {
        let result = check_file("t.jsonnet", "local x = 1; 42", Vec::new());
        assert!(result.parse_error.is_none());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.code == crate::diagnostic::DiagnosticCode::UnusedVar)
        );
    }

    #[test]
    fn surfaces_parse_error_separately() {
        let result = check_file("t.jsonnet", "local x = ", Vec::new());
        assert!(result.parse_error.is_some());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn s1_function_arity_and_type_checks() {
        let src = r#"
local tooFew = std.endsWith('');
local tooMany = std.endsWith('', '', '');
local wrong  = std.all(5);
local notFn  = "asdf";
local callNF = notFn(2);
local fn(a=null,b=null) = null;
local dupNamed = fn(a=2, a=3);
local typed(a/*:string*/, b/*:number*/, c=null) = null;
local mis = typed(2, false);
{used:[tooFew,tooMany,wrong,callNF,dupNamed,mis]}
"#;
        let result = check_file("t.jsonnet", src, Vec::new());
        assert!(result.parse_error.is_none());
        use crate::diagnostic::DiagnosticCode::*;
        let codes: Vec<_> = result.diagnostics.iter().map(|d| d.code).collect();
        assert!(codes.contains(&ArgumentCardinality));
        assert!(codes.contains(&TypeMismatch));
    }

    #[test]
    fn s2_unused_local() {
        let result = check_file("t.jsonnet", "local x = 1; 42", Vec::new());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, crate::diagnostic::DiagnosticCode::UnusedVar);
    }
}
