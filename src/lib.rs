//! Certificate expiry monitoring with deduplicated Telegram alerts.
//!
//! A run probes every configured domain over TLS, works out how many whole
//! days its certificate has left and alerts once per approach to expiry,
//! re-alerting only when the certificate gets strictly closer to expiring.
//! Alert history lives in a small JSON file between runs.
//!
//! ```no_run
//! use certnotify::{
//!     CertificateProbe, Config, HttpTransport, Monitor, StateStore, SystemClock, TelegramSink,
//!     TlsSource,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Config::defaults()
//!     .merge_with(Config::from_file("certnotify.toml")?)
//!     .resolve()?;
//! let probe = CertificateProbe::new(TlsSource::new(settings.probe_timeout), settings.probe_retry);
//! let transport = HttpTransport::new(settings.api_url.clone(), settings.request_timeout)?;
//! let sink = TelegramSink::new(
//!     transport,
//!     settings.token.clone(),
//!     settings.chat_id.clone(),
//!     settings.send_retry,
//! );
//! let state = StateStore::open(&settings.state_file);
//!
//! let report = Monitor::new(&settings, probe, sink, SystemClock, state).run()?;
//! println!("{} domains checked", report.domains.len());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod expiry;
pub mod monitor;
pub mod notify;
pub mod policy;
pub mod probe;
pub mod report;
pub mod retry;
pub mod state;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, ConfigError, OutputFormat, Settings};
pub use error::{AlertError, CertificateFetchError, RunError, StateError, TlsError};
pub use expiry::days_left;
pub use monitor::{DomainReport, Monitor, Outcome, RunReport};
pub use notify::{AlertSink, ApiTransport, ChatId, HttpTransport, TelegramSink};
pub use policy::{decide, Decision};
pub use probe::{CertificateProbe, CertificateSource, ExpiryProbe, Target, TlsSource};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use state::{CheckTime, DomainRecord, StateStore};
