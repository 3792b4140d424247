//! Diagnostic model and sort/render utility.
//!
//! `Diagnostic`/`Severity`/`RenderableDiagnostic` wrap the linter's fixed
//! code table for rendering; the miette plumbing is "a labeled span over
//! named source text", which is all either the linter or a parse error
//! needs to describe itself.

use miette::SourceSpan;
use thiserror::Error;

use crate::ast::{self, Range};

/// The severity of a diagnostic. The linter's fixed code table uses the
/// full set below, though most codes only ever emit `Error` or `Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// The fixed set of diagnostic codes the linter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum DiagnosticCode {
    ImportNotFound,
    UnusedVar,
    ArgumentCardinality,
    UnknownArgument,
    TypeMismatch,
    UnknownField,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::ImportNotFound => "ImportNotFound",
            DiagnosticCode::UnusedVar => "UnusedVar",
            DiagnosticCode::ArgumentCardinality => "ArgumentCardinality",
            DiagnosticCode::UnknownArgument => "UnknownArgument",
            DiagnosticCode::TypeMismatch => "TypeMismatch",
            DiagnosticCode::UnknownField => "UnknownField",
        }
    }
}

/// One linter finding, addressed by source range within a single file.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub range: Range,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>, range: Range) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            range,
        }
    }
}

/// Sort diagnostics by `(start_line, start_col, end_line, end_col,
/// message)` — callers depend on this being a stable, total order
/// independent of emission order or thread count.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        (
            a.range.begin.line,
            a.range.begin.col,
            a.range.end.line,
            a.range.end.col,
            &a.message,
        )
            .cmp(&(
                b.range.begin.line,
                b.range.begin.col,
                b.range.end.line,
                b.range.end.col,
                &b.message,
            ))
    });
}

/// Miette-compatible error for rendering rich diagnostics: a message,
/// named source, optional labeled span, optional help text.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RenderableDiagnostic {
    pub message: String,
    pub src: miette::NamedSource<String>,
    pub span: Option<SourceSpan>,
    pub label: Option<String>,
    pub help: Option<String>,
    severity: miette::Severity,
}

impl miette::Diagnostic for RenderableDiagnostic {
    fn severity(&self) -> Option<miette::Severity> {
        Some(self.severity)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.span.map(|span| {
            Box::new(std::iter::once(miette::LabeledSpan::new(
                self.label.clone(),
                span.offset(),
                span.len(),
            ))) as Box<dyn Iterator<Item = miette::LabeledSpan>>
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h.as_str()) as Box<dyn std::fmt::Display>)
    }
}

impl Diagnostic {
    /// Convert to a miette-renderable diagnostic for the `check` CLI
    /// surface; `source` is the full text of the range's file.
    pub fn to_renderable(&self, source: &str) -> RenderableDiagnostic {
        let start = ast::pos_to_byte(source, self.range.begin);
        let end = ast::pos_to_byte(source, self.range.end).max(start);
        let severity = match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Info | Severity::Hint => miette::Severity::Advice,
        };
        RenderableDiagnostic {
            message: format!("{}: {}", self.code.as_str(), self.message),
            src: miette::NamedSource::new(&*self.range.filename, source.to_owned()),
            span: Some(SourceSpan::new(start.into(), end - start)),
            label: None,
            help: None,
            severity,
        }
    }
}

/// A tool-level warning with no associated source range — file-discovery
/// walk errors, deprecated config fields, and the like. Collected during a
/// `check` run and rendered after the per-file diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

/// A lightweight diagnostic for tool-level errors/warnings that don't have
/// source code (config errors, CLI argument issues).
///
/// Renders through miette as:
///   × failed to load config: parse error at line 3
///   ⚠ --jobs clamped to 1 (was 0)
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolDiagnostic {
    message: String,
    severity: miette::Severity,
    help_text: Option<String>,
}

impl ToolDiagnostic {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            severity: miette::Severity::Error,
            help_text: None,
        }
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            severity: miette::Severity::Warning,
            help_text: None,
        }
    }
}

impl miette::Diagnostic for ToolDiagnostic {
    fn severity(&self) -> Option<miette::Severity> {
        Some(self.severity)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.as_str()) as Box<dyn std::fmt::Display>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Pos;

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range {
            filename: Rc::from("t.jsonnet"),
            begin: Pos::new(sl, sc),
            end: Pos::new(el, ec),
        }
    }

    use std::rc::Rc;

    #[test]
    fn sorts_by_position_then_message() {
        let mut diags = vec![
            Diagnostic::new(DiagnosticCode::UnusedVar, Severity::Warning, "z", range(2, 1, 2, 2)),
            Diagnostic::new(DiagnosticCode::UnusedVar, Severity::Warning, "a", range(1, 5, 1, 6)),
            Diagnostic::new(DiagnosticCode::UnusedVar, Severity::Warning, "a", range(1, 1, 1, 2)),
        ];
        sort_diagnostics(&mut diags);
        assert_eq!(diags[0].range.begin.col, 1);
        assert_eq!(diags[1].range.begin.col, 5);
        assert_eq!(diags[2].range.begin.line, 2);
    }
}
