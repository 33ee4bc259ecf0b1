// SPDX-License-Identifier: Apache-2.0

//! Finding records, summary aggregation, and the text/JSON renderers.
//!
//! The analysis core only ever produces [`Finding`] values and hands them to
//! a [`Report`]; it has no opinion about how they end up on the screen.
//! Rendering is a pure function of an already-built [`Report`] plus a
//! [`Format`] and [`ColorMode`], mirroring "listing findings" being treated
//! as an external collaborator's concern.

use console::{Color, Style};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::PathBuf;

use selint_config::{CheckId, Severity};

/// The output format for a [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Human,
    Json,
}

/// When to emit ANSI color escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    Always,
    Never,
    #[default]
    Auto,
}

impl ColorMode {
    fn enabled(self, stream_is_tty: bool) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stream_is_tty,
        }
    }
}

/// A single emitted finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub file: PathBuf,
    pub line: u32,
    pub check_id: CheckId,
    pub message: String,
}

impl Finding {
    pub fn new(file: PathBuf, line: u32, check_id: CheckId, message: impl Into<String>) -> Finding {
        Finding {
            file,
            line,
            check_id,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.check_id.severity()
    }
}

/// One row of the end-of-run summary table: a check id and how many
/// findings it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub check_id: CheckId,
    pub count: usize,
}

/// The full result of a run: every finding, in emission (DFS dispatch)
/// order, plus the aggregated summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn new() -> Report {
        Report::default()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Aggregate findings into the summary table described in §4.H:
    /// sorted by severity (`C < S < W < E`, `F` last), then numeric id,
    /// duplicates collapsed, zero-count checks omitted.
    pub fn summary(&self) -> Vec<SummaryRow> {
        let mut counts: Vec<(CheckId, usize)> = Vec::new();

        for finding in &self.findings {
            match counts.iter_mut().find(|(id, _)| *id == finding.check_id) {
                Some((_, count)) => *count += 1,
                None => counts.push((finding.check_id.clone(), 1)),
            }
        }

        counts.sort_by(|(a, _), (b, _)| compare_check_ids(a, b));

        counts
            .into_iter()
            .map(|(check_id, count)| SummaryRow { check_id, count })
            .collect()
    }

    pub fn render(&self, format: Format, color: ColorMode, stream_is_tty: bool) -> String {
        match format {
            Format::Human => render_human(self, color.enabled(stream_is_tty)),
            Format::Json => serde_json::to_string_pretty(&ReportJson {
                findings: &self.findings,
                summary: self.summary(),
            })
            .expect("Report serializes without error"),
        }
    }
}

/// Severity order for the summary table: `C < S < W < E`, `F` sorts last.
fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Convention => 0,
        Severity::Style => 1,
        Severity::Warning => 2,
        Severity::Error => 3,
        Severity::Fatal => 4,
    }
}

fn compare_check_ids(a: &CheckId, b: &CheckId) -> Ordering {
    severity_rank(a.severity())
        .cmp(&severity_rank(b.severity()))
        .then_with(|| numeric_suffix(a).cmp(&numeric_suffix(b)))
}

fn numeric_suffix(id: &CheckId) -> u32 {
    id.as_str()
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Convention => Style::new().fg(Color::Blue),
        Severity::Style => Style::new().fg(Color::Magenta),
        Severity::Warning => Style::new().fg(Color::Yellow),
        Severity::Error | Severity::Fatal => Style::new().fg(Color::Red),
    }
}

fn severity_word(severity: Severity) -> &'static str {
    match severity {
        Severity::Convention => "convention",
        Severity::Style => "style",
        Severity::Warning => "warning",
        Severity::Error => "error",
        Severity::Fatal => "fatal",
    }
}

fn render_human(report: &Report, color: bool) -> String {
    let mut out = String::new();

    for finding in &report.findings {
        let location = format!("{}:{}", finding.file.display(), finding.line);
        let padded = if location.len() < 22 {
            format!("{location:<22}")
        } else {
            location
        };

        let severity = finding.severity();
        let tag = format!(
            "{}({})",
            severity_word(severity),
            severity
        );

        let line = format!("{padded}: {tag}: {} ({})", finding.message, finding.check_id);

        if color {
            let styled_tag = severity_style(severity).apply_to(&tag);
            let _ = writeln!(
                out,
                "{padded}: {styled_tag}: {} ({})",
                finding.message, finding.check_id
            );
        } else {
            let _ = writeln!(out, "{line}");
        }
    }

    out.push('\n');
    out.push_str("Summary:\n");

    let summary = report.summary();
    if summary.is_empty() {
        out.push_str("(none)\n");
    } else {
        for row in summary {
            let _ = writeln!(out, "{}: {}", row.check_id, row.count);
        }
    }

    out
}

#[derive(Serialize)]
struct ReportJson<'r> {
    findings: &'r [Finding],
    summary: Vec<SummaryRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, line: u32) -> Finding {
        Finding::new(
            PathBuf::from("foo.te"),
            line,
            CheckId::new(id).unwrap(),
            "test message",
        )
    }

    #[test]
    fn summary_sorts_by_severity_then_numeric_id() {
        let mut report = Report::new();
        report.push(finding("W-009", 1));
        report.push(finding("C-005", 2));
        report.push(finding("C-001", 3));
        report.push(finding("S-010", 4));

        let ids: Vec<String> = report.summary().into_iter().map(|r| r.check_id.to_string()).collect();
        assert_eq!(ids, vec!["C-001", "C-005", "S-010", "W-009"]);
    }

    #[test]
    fn summary_collapses_duplicates() {
        let mut report = Report::new();
        report.push(finding("C-005", 1));
        report.push(finding("C-005", 2));

        let summary = report.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 2);
    }

    #[test]
    fn empty_report_prints_none() {
        let report = Report::new();
        let rendered = report.render(Format::Human, ColorMode::Never, false);
        assert!(rendered.contains("(none)"));
    }

    #[test]
    fn json_round_trips_check_ids() {
        let mut report = Report::new();
        report.push(finding("E-007", 9));
        let rendered = report.render(Format::Json, ColorMode::Never, false);
        assert!(rendered.contains("E-007"));
    }
}
