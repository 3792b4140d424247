//! Result rendering for the `check` CLI surface: human (miette-based,
//! colored) and JSON formats.
//!
//! `Summary`/`render_human`/`render_json`/`verbose_log` split results by
//! [`crate::diagnostic::Severity`] rather than a flat error list.

use crate::check::FileResult;
use crate::diagnostic::{Severity, ToolDiagnostic, Warning};
use owo_colors::Stream::Stderr;
use owo_colors::{OwoColorize, Style};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

/// Summary statistics for a `check` run.
pub struct Summary {
    pub checked_files: usize,
    pub clean_files: usize,
    pub files_with_errors: usize,
    pub parse_errors: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub duration: Duration,
    pub jobs: usize,
}

impl Summary {
    pub fn from_results(results: &[FileResult], jobs: usize, duration: Duration) -> Self {
        let mut clean_files = 0;
        let mut files_with_errors = 0;
        let mut parse_errors = 0;
        let mut total_errors = 0;
        let mut total_warnings = 0;

        for result in results {
            if result.parse_error.is_some() {
                parse_errors += 1;
                files_with_errors += 1;
                continue;
            }
            let errors = result
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .count();
            let warnings = result.diagnostics.len() - errors;
            total_errors += errors;
            total_warnings += warnings;
            if errors > 0 {
                files_with_errors += 1;
            } else {
                clean_files += 1;
            }
        }

        Summary {
            checked_files: results.len(),
            clean_files,
            files_with_errors,
            parse_errors,
            total_errors,
            total_warnings,
            duration,
            jobs,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Human,
    Json,
}

fn plural(n: usize, singular: &str, plural_form: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural_form}")
    }
}

fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        let secs = d.as_secs_f64();
        if secs < 10.0 {
            format!("{secs:.1}s")
        } else {
            format!("{}s", secs.round() as u64)
        }
    }
}

/// Write a verbose diagnostic message to stderr with dimmed styling.
pub fn verbose_log(stderr: &mut impl Write, msg: &str) {
    let line = format!("[verbose] {msg}");
    let _ = writeln!(
        stderr,
        "{}",
        line.if_supports_color(Stderr, |text| text.dimmed())
    );
}

/// Render results in human format using miette.
pub fn render_human(
    results: &[FileResult],
    warnings: &[Warning],
    summary: &Summary,
    sources: &HashMap<&str, &str>,
    stderr: &mut impl Write,
) {
    for warning in warnings {
        let diag = ToolDiagnostic::warning(format!("{}: {}", warning.code, warning.message));
        let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
    }

    for result in results {
        let source = sources.get(result.path.as_str()).copied().unwrap_or("");

        if let Some(parse_error) = &result.parse_error {
            let diag = ToolDiagnostic::error(format!("{}: {}", result.path, parse_error.message));
            let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
            continue;
        }

        for diag in &result.diagnostics {
            let renderable = diag.to_renderable(source);
            let report = miette::Report::new(renderable);
            let _ = writeln!(stderr, "{report:?}");
        }
    }

    let _ = writeln!(stderr);
    let duration = format_duration(summary.duration);
    if summary.files_with_errors == 0 {
        let msg = format!(
            "{} {} ({})",
            "✓",
            if summary.checked_files == 0 {
                "No files checked".to_string()
            } else {
                format!(
                    "All {} clean",
                    plural(summary.checked_files, "file", "files")
                )
            },
            duration,
        );
        let style = Style::new().green().bold();
        let _ = writeln!(
            stderr,
            "{}",
            msg.if_supports_color(Stderr, |text| text.style(style))
        );
        if summary.total_warnings > 0 {
            let meta = format!("  {}", plural(summary.total_warnings, "warning", "warnings"));
            let _ = writeln!(
                stderr,
                "{}",
                meta.if_supports_color(Stderr, |text| text.dimmed())
            );
        }
    } else {
        let primary = format!(
            "{} Found {} in {}",
            "✗",
            plural(summary.total_errors, "error", "errors"),
            plural(summary.files_with_errors, "file", "files"),
        );
        let style = Style::new().red().bold();
        let _ = writeln!(
            stderr,
            "{}",
            primary.if_supports_color(Stderr, |text| text.style(style))
        );

        let mut meta = format!("  Checked {}", plural(summary.checked_files, "file", "files"));
        if summary.parse_errors > 0 {
            meta.push_str(&format!(
                ", {} failed to parse",
                plural(summary.parse_errors, "file", "files"),
            ));
        }
        if summary.total_warnings > 0 {
            meta.push_str(&format!(
                ", {}",
                plural(summary.total_warnings, "warning", "warnings"),
            ));
        }
        meta.push_str(&format!(" ({duration})"));
        let _ = writeln!(
            stderr,
            "{}",
            meta.if_supports_color(Stderr, |text| text.dimmed())
        );
    }
}

// --- Typed JSON output structures ---

#[derive(Serialize)]
struct JsonOutput<'a> {
    version: u32,
    clean: bool,
    warnings: &'a [Warning],
    files: Vec<JsonFileResult>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonFileResult {
    path: String,
    clean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_error: Option<JsonParseError>,
    diagnostics: Vec<JsonDiagnostic>,
}

#[derive(Serialize)]
struct JsonParseError {
    message: String,
    location: JsonLocation,
}

#[derive(Serialize)]
struct JsonDiagnostic {
    code: &'static str,
    severity: Severity,
    message: String,
    location: JsonLocation,
}

#[derive(Serialize)]
struct JsonLocation {
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
}

#[derive(Serialize)]
struct JsonSummary {
    checked_files: usize,
    clean_files: usize,
    files_with_errors: usize,
    parse_errors: usize,
    errors: usize,
    warnings: usize,
    duration_ms: u64,
}

/// Render results in JSON format.
pub fn render_json(
    results: &[FileResult],
    warnings: &[Warning],
    summary: &Summary,
    stdout: &mut impl Write,
) {
    let json_output = build_json_output(results, warnings, summary);
    let json_str = serde_json::to_string_pretty(&json_output).unwrap();
    let _ = writeln!(stdout, "{json_str}");
}

fn build_json_output<'a>(
    results: &[FileResult],
    warnings: &'a [Warning],
    summary: &Summary,
) -> JsonOutput<'a> {
    let files: Vec<JsonFileResult> = results
        .iter()
        .map(|r| {
            let parse_error = r.parse_error.as_ref().map(|e| JsonParseError {
                message: e.message.clone(),
                location: JsonLocation {
                    start_line: e.range.begin.line,
                    start_col: e.range.begin.col,
                    end_line: e.range.end.line,
                    end_col: e.range.end.col,
                },
            });

            let diagnostics: Vec<JsonDiagnostic> = r
                .diagnostics
                .iter()
                .map(|d| JsonDiagnostic {
                    code: d.code.as_str(),
                    severity: d.severity,
                    message: d.message.clone(),
                    location: JsonLocation {
                        start_line: d.range.begin.line,
                        start_col: d.range.begin.col,
                        end_line: d.range.end.line,
                        end_col: d.range.end.col,
                    },
                })
                .collect();

            JsonFileResult {
                path: r.path.clone(),
                clean: r.is_clean(),
                parse_error,
                diagnostics,
            }
        })
        .collect();

    JsonOutput {
        version: 1,
        clean: summary.files_with_errors == 0,
        warnings,
        files,
        summary: JsonSummary {
            checked_files: summary.checked_files,
            clean_files: summary.clean_files,
            files_with_errors: summary.files_with_errors,
            parse_errors: summary.parse_errors,
            errors: summary.total_errors,
            warnings: summary.total_warnings,
            duration_ms: u64::try_from(summary.duration.as_millis()).unwrap_or(u64::MAX),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_file;

    #[test]
    fn summary_counts_clean_and_warning_files() {
        let clean = check_file("clean.jsonnet", "{a: 1}", Vec::new());
        let dirty = check_file("dirty.jsonnet", "local x = 1; 42", Vec::new());
        let results = vec![clean, dirty];
        let summary = Summary::from_results(&results, 1, Duration::from_millis(5));
        assert_eq!(summary.checked_files, 2);
        assert_eq!(summary.clean_files, 2);
        assert_eq!(summary.total_warnings, 1);
        assert_eq!(summary.files_with_errors, 0);
    }

    #[test]
    fn json_output_round_trips_through_serde() {
        let result = check_file("t.jsonnet", "local x = 1; 42", Vec::new());
        let summary =
            Summary::from_results(std::slice::from_ref(&result), 1, Duration::from_millis(1));
        let mut buf = Vec::new();
        render_json(std::slice::from_ref(&result), &[], &summary, &mut buf);
        let text = String::from_utf8(buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["summary"]["checked_files"], 1);
        assert_eq!(parsed["files"][0]["diagnostics"][0]["code"], "UnusedVar");
    }
}
