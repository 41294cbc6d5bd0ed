use std::collections::HashMap;

use lazy_static::lazy_static;
use prometheus::{labels, register_gauge, register_gauge_vec, Gauge, GaugeVec};
use tracing::{info, warn};

use certnotify::{DomainReport, Outcome, RunReport};

lazy_static! {
    static ref CERTNOTIFY_DAYS_BEFORE_EXPIRY: Gauge =
        register_gauge!("certnotify_days_before_expiry", "whole days before expiry").unwrap();
    static ref CERTNOTIFY_PROBE_SUCCESS: Gauge = register_gauge!(
        "certnotify_probe_success",
        "1 if the certificate could be read"
    )
    .unwrap();
    static ref CERTNOTIFY_ALERT_SENT: Gauge =
        register_gauge!("certnotify_alert_sent", "1 if an alert was delivered this run").unwrap();
    static ref CERTNOTIFY_OUTCOME: GaugeVec = register_gauge_vec!(
        "certnotify_outcome",
        "1 for the outcome of the domain's latest check",
        &["status"]
    )
    .unwrap();
}

/// Push gateway grouping key for one domain.
///
/// The outcome changes from run to run, so it stays out of the key;
/// otherwise every outcome would leave its own group behind on the gateway.
fn grouping_labels(domain: &DomainReport, test_mode: bool) -> HashMap<String, String> {
    labels! {
        "instance".to_owned() => "certnotify".to_owned(),
        "domain".to_owned() => domain.domain.to_owned(),
        "test_mode".to_owned() => test_mode.to_string(),
    }
}

fn record(domain: &DomainReport) {
    let probed = domain.days_left.is_some();
    CERTNOTIFY_PROBE_SUCCESS.set(if probed { 1.0 } else { 0.0 });
    CERTNOTIFY_DAYS_BEFORE_EXPIRY.set(domain.days_left.map(|d| d as f64).unwrap_or(f64::NAN));
    CERTNOTIFY_ALERT_SENT.set(if domain.outcome == Outcome::Alerted {
        1.0
    } else {
        0.0
    });
    // Only the current outcome is exported for this group
    CERTNOTIFY_OUTCOME.reset();
    CERTNOTIFY_OUTCOME
        .with_label_values(&[domain.outcome.to_string().as_str()])
        .set(1.0);
}

/// Pushes one group of gauges per domain to the push gateway.
/// # Arguments
/// * `report` - Result of the run
/// * `prometheus_address` - Push gateway base URL
pub fn prometheus_metrics(report: &RunReport, prometheus_address: &str) {
    let push_url = format!("{}/metrics/job", prometheus_address.trim_end_matches('/'));
    for domain in &report.domains {
        record(domain);

        let metric_families = prometheus::gather();
        let pushed = prometheus::push_metrics(
            "certnotify",
            grouping_labels(domain, report.test_mode),
            &push_url,
            metric_families,
            None,
        );

        match pushed {
            Ok(_) => info!(domain = %domain.domain, "metrics pushed"),
            Err(e) => warn!(domain = %domain.domain, error = %e, "failed to push metrics to prometheus"),
        }
    }
}
