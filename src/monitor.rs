//! One monitoring run.
//!
//! The monitor owns the alert history for the duration of the run. Domains
//! are handled strictly one after another: probe, compute days left,
//! decide, alert, record. The history is written once, after the last
//! domain.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::Settings;
use crate::error::RunError;
use crate::expiry::days_left;
use crate::notify::{format_alert, AlertSink};
use crate::policy::{decide, Decision};
use crate::probe::{ExpiryProbe, Target};
use crate::state::StateStore;

/// What happened to one domain during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum Outcome {
    /// Above the threshold, nothing outstanding
    #[strum(to_string = "ok")]
    Healthy,
    /// Back above the threshold; the outstanding alert was cleared
    #[strum(to_string = "renewed")]
    Renewed,
    /// Inside the window but already alerted at this level
    #[strum(to_string = "already notified")]
    Suppressed { last_notified_days: i64 },
    #[strum(to_string = "alert sent")]
    Alerted,
    /// The alert could not be delivered; history left as it was
    #[strum(to_string = "alert failed")]
    DeliveryFailed,
    /// Certificate could not be read; domain skipped
    #[strum(to_string = "check failed")]
    ProbeFailed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub domain: String,
    pub expiry: Option<DateTime<Utc>>,
    pub days_left: Option<i64>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub test_mode: bool,
    pub threshold_days: i64,
    pub domains: Vec<DomainReport>,
}

impl RunReport {
    pub fn count(&self, matches: impl Fn(&Outcome) -> bool) -> usize {
        self.domains.iter().filter(|d| matches(&d.outcome)).count()
    }
}

pub struct Monitor<'a, P, S, C> {
    settings: &'a Settings,
    probe: P,
    sink: S,
    clock: C,
    state: StateStore,
}

impl<'a, P: ExpiryProbe, S: AlertSink, C: Clock> Monitor<'a, P, S, C> {
    pub fn new(settings: &'a Settings, probe: P, sink: S, clock: C, state: StateStore) -> Self {
        Monitor {
            settings,
            probe,
            sink,
            clock,
            state,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Checks every configured domain and saves the history once.
    ///
    /// Fails without touching any domain or the state file when the alert
    /// channel rejects its credentials.
    pub fn run(&mut self) -> Result<RunReport, RunError> {
        let started_at = self.clock.now();
        info!(
            domains = self.settings.targets.len(),
            threshold_days = self.settings.threshold_days,
            test_mode = self.settings.test_mode,
            "run started"
        );

        if !self.sink.validate_credentials() {
            error!("alert channel unavailable, aborting run before checking any domain");
            return Err(RunError::CredentialValidation);
        }

        let mut report = RunReport {
            started_at,
            test_mode: self.settings.test_mode,
            threshold_days: self.settings.threshold_days,
            domains: Vec::with_capacity(self.settings.targets.len()),
        };
        let settings = self.settings;
        for target in &settings.targets {
            let domain_report = self.check(target);
            report.domains.push(domain_report);
        }

        self.state.save()?;
        info!(
            checked = report.domains.len(),
            alerts = report.count(|o| *o == Outcome::Alerted),
            failures = report.count(|o| matches!(o, Outcome::ProbeFailed { .. } | Outcome::DeliveryFailed)),
            "run finished"
        );
        Ok(report)
    }

    fn check(&mut self, target: &Target) -> DomainReport {
        let domain = target.name.as_str();
        let expiry = match self.probe.probe(target) {
            Ok(expiry) => expiry,
            Err(e) => {
                return DomainReport {
                    domain: domain.to_string(),
                    expiry: None,
                    days_left: None,
                    outcome: Outcome::ProbeFailed {
                        error: e.to_string(),
                    },
                }
            }
        };

        let now = self.clock.now();
        let days = days_left(expiry, now);
        info!(domain, expiry = %expiry, days_left = days, "certificate checked");
        self.state.touch(domain, now);

        let prior = self.state.get(domain);
        let threshold = self.settings.threshold_days;
        let decision = decide(days, prior, threshold, self.settings.test_mode);
        debug!(domain, ?prior, ?decision, "decision");

        let outcome = match decision {
            Decision::Alert { store } => {
                let text = format_alert(domain, days, expiry, self.settings.test_mode);
                if !self.sink.send(&text) {
                    error!(domain, days_left = days, "alert not delivered, will retry next run");
                    Outcome::DeliveryFailed
                } else {
                    if self.settings.test_mode {
                        debug!(domain, "test mode, alert not recorded");
                    } else {
                        self.state.update(domain, store, now);
                    }
                    Outcome::Alerted
                }
            }
            Decision::NoAlert { clear_prior: true } => {
                self.state.clear(domain);
                Outcome::Renewed
            }
            Decision::NoAlert { clear_prior: false } => match prior {
                Some(last) if days <= threshold => {
                    warn!(domain, days_left = days, last_notified_days = last, "already notified");
                    Outcome::Suppressed {
                        last_notified_days: last,
                    }
                }
                _ => Outcome::Healthy,
            },
        };

        DomainReport {
            domain: domain.to_string(),
            expiry: Some(expiry),
            days_left: Some(days),
            outcome,
        }
    }
}
