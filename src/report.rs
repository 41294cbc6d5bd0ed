//! Human and machine readable rendering of a [`RunReport`].

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};

use crate::config::OutputFormat;
use crate::monitor::{DomainReport, Outcome, RunReport};

const EXPIRY_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub fn render(report: &RunReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Summary => summary(report),
        OutputFormat::Text => text(report),
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
    }
}

/// Banner printed before the domains are checked.
pub fn header(test_mode: bool, threshold_days: i64) -> String {
    let rule = "=".repeat(60);
    format!(
        "{rule}\nSSL certificate check\nMode: {}\nWarning threshold: {} days\n{rule}",
        if test_mode { "TEST" } else { "PRODUCTION" },
        threshold_days,
    )
}

fn summary(report: &RunReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Domain", "Expires (UTC)", "Days left", "Status"]);

    for domain in &report.domains {
        table.add_row(vec![
            Cell::new(&domain.domain),
            Cell::new(expiry_cell(domain)),
            Cell::new(
                domain
                    .days_left
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(&domain.outcome).fg(status_color(&domain.outcome)),
        ]);
    }

    let failed = report.count(|o| matches!(o, Outcome::ProbeFailed { .. }));
    format!(
        "{}\n{} checked, {} alerted, {} failed",
        table,
        report.domains.len(),
        report.count(|o| *o == Outcome::Alerted),
        failed
    )
}

fn text(report: &RunReport) -> String {
    let mut out = String::new();
    for domain in &report.domains {
        out.push_str(&format!("\nChecking domain: {}\n", domain.domain));
        if let Some(days) = domain.days_left {
            out.push_str(&format!("  Valid until: {} UTC\n", expiry_cell(domain)));
            out.push_str(&format!("  Days left: {}\n", days));
        }
        let line = match &domain.outcome {
            Outcome::Healthy => "Certificate is fine".to_string(),
            Outcome::Renewed => "Certificate renewed, alert state reset".to_string(),
            Outcome::Suppressed { last_notified_days } => {
                format!("Alert already sent at {} days", last_notified_days)
            }
            Outcome::Alerted => "Alert sent to Telegram".to_string(),
            Outcome::DeliveryFailed => "Failed to send alert to Telegram".to_string(),
            Outcome::ProbeFailed { error } => format!("Could not fetch certificate: {}", error),
        };
        out.push_str(&format!("  {}\n", line));
    }
    out.push_str(&format!("\n{}\nCheck finished", "=".repeat(60)));
    out
}

fn expiry_cell(domain: &DomainReport) -> String {
    domain
        .expiry
        .map(|e| e.format(EXPIRY_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_color(outcome: &Outcome) -> Color {
    match outcome {
        Outcome::Healthy | Outcome::Renewed => Color::Green,
        Outcome::Suppressed { .. } | Outcome::Alerted => Color::Yellow,
        Outcome::DeliveryFailed | Outcome::ProbeFailed { .. } => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn report() -> RunReport {
        let expiry = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        RunReport {
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            test_mode: false,
            threshold_days: 5,
            domains: vec![
                DomainReport {
                    domain: "example.com".to_string(),
                    expiry: Some(expiry),
                    days_left: Some(3),
                    outcome: Outcome::Alerted,
                },
                DomainReport {
                    domain: "down.example".to_string(),
                    expiry: None,
                    days_left: None,
                    outcome: Outcome::ProbeFailed {
                        error: "connection refused".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_summary_lists_every_domain() {
        let out = render(&report(), OutputFormat::Summary);
        assert!(out.contains("example.com"));
        assert!(out.contains("04.03.2024 12:00:00"));
        assert!(out.contains("down.example"));
        assert!(out.contains("2 checked, 1 alerted, 1 failed"));
    }

    #[test]
    fn test_text_output() {
        let out = render(&report(), OutputFormat::Text);
        assert!(out.contains("Checking domain: example.com"));
        assert!(out.contains("Days left: 3"));
        assert!(out.contains("Alert sent to Telegram"));
        assert!(out.contains("Could not fetch certificate: connection refused"));
    }

    #[test]
    fn test_json_output() {
        let out = render(&report(), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["domains"][0]["outcome"]["status"], "alerted");
        assert_eq!(value["domains"][1]["outcome"]["status"], "probe_failed");
        assert_eq!(
            value["domains"][1]["outcome"]["detail"]["error"],
            "connection refused"
        );
        assert_eq!(value["threshold_days"], 5);
    }

    #[test]
    fn test_header() {
        let out = header(true, 7);
        assert!(out.contains("Mode: TEST"));
        assert!(out.contains("Warning threshold: 7 days"));
    }
}
