use crate::model::{FindingStatus, ScanReport};
use chrono::Local;
use std::fmt::Write as _;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Repos")]
    repositories: usize,
    #[tabled(rename = "Indicators")]
    indicators: usize,
    #[tabled(rename = "Error")]
    error: String,
}

#[derive(Tabled)]
struct IndicatorRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Evidence")]
    evidence: String,
    #[tabled(rename = "Path")]
    path: String,
}

#[derive(Tabled)]
struct RepoErrorRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub fn print_cli_table(report: &ScanReport) {
    print!("{}", render_table(report, true));
}

/// Renders the report as tables. `color` enables ANSI status colors.
pub fn render_table(report: &ScanReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Scan completed at: {}",
        report.scan_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z")
    );
    let _ = writeln!(out);

    if report.targets.is_empty() {
        let _ = writeln!(out, "No accounts scanned.");
    } else {
        let rows: Vec<TargetRow> = report
            .targets
            .iter()
            .map(|t| TargetRow {
                user: t.target.login().to_string(),
                status: format_status(t.status, color),
                repositories: t.findings.len(),
                indicators: t.indicator_count(),
                error: t
                    .error
                    .as_ref()
                    .map(|e| truncate(&e.message, 50))
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    let indicator_rows: Vec<IndicatorRow> = report
        .targets
        .iter()
        .flat_map(|t| t.compromised_repositories())
        .flat_map(|finding| {
            finding.indicators.iter().map(move |indicator| IndicatorRow {
                repository: finding.repository.full_name(),
                kind: indicator.kind.display_name().to_string(),
                evidence: truncate(&indicator.evidence.matched, 50),
                path: indicator
                    .evidence
                    .path
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            })
        })
        .collect();

    if !indicator_rows.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Found {} indicators of compromise:", indicator_rows.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", Table::new(indicator_rows).with(Style::rounded()));
    }

    let error_rows: Vec<RepoErrorRow> = report
        .targets
        .iter()
        .flat_map(|t| t.findings.iter())
        .filter_map(|finding| {
            let error = finding.error.as_ref()?;
            Some(RepoErrorRow {
                repository: finding.repository.full_name(),
                reason: error.reason.clone(),
                message: truncate(&error.message, 60),
            })
        })
        .collect();

    if !error_rows.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Could not inspect {} repositories:", error_rows.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", Table::new(error_rows).with(Style::rounded()));
    }

    let _ = writeln!(out);
    render_summary(&mut out, report);
    out
}

fn render_summary(out: &mut String, report: &ScanReport) {
    let summary = &report.summary;
    let _ = writeln!(out, "Summary:");
    let _ = writeln!(out, "  Accounts scanned: {}", summary.targets_scanned);
    let _ = writeln!(
        out,
        "  Repositories: {} ({} could not be inspected)",
        summary.repositories_scanned, summary.repositories_errored
    );
    let _ = writeln!(out, "  Compromised accounts: {}", summary.compromised);
    if summary.errored > 0 {
        let _ = writeln!(out, "  Accounts with errors: {}", summary.errored);
    }
    if !report.skipped.is_empty() {
        let _ = writeln!(
            out,
            "  Skipped invalid entries: {}",
            truncate(&report.skipped.join(", "), 80)
        );
    }
    if report.cancelled {
        let _ = writeln!(out, "  Scan interrupted: results are partial");
    }
}

fn format_status(status: FindingStatus, color: bool) -> String {
    let label = status.as_str().to_uppercase();
    if !color {
        return label;
    }
    match status {
        FindingStatus::Compromised => format!("\x1b[31m{label}\x1b[0m"),
        FindingStatus::Error => format!("\x1b[33m{label}\x1b[0m"),
        FindingStatus::Clean => format!("\x1b[32m{label}\x1b[0m"),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
