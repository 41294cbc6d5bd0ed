use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use certnotify::config::{
    CheckSettings, Config, PrometheusConfig, Settings, DEFAULT_CONFIG_FILE,
};
use certnotify::{
    report, CertificateProbe, HttpTransport, Monitor, OutputFormat, RunError, StateStore,
    SystemClock, TelegramSink, TlsSource,
};

mod metrics;

/// Checks TLS certificate expiry and alerts through Telegram once per approach to expiry.
#[derive(Parser, Debug)]
#[command(name = "certnotify", version, about, long_about = None)]
struct Cli {
    /// Domains to check (host or host:port); replaces the configured list
    domains: Vec<String>,

    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Alert history file
    #[arg(short, long, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Alert for every domain without recording anything
    #[arg(long)]
    test_mode: bool,

    /// Days left at or below which an alert is sent
    #[arg(long, value_name = "DAYS")]
    threshold: Option<i64>,

    /// Report format: summary, text or json
    #[arg(short, long)]
    output: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Push metrics to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Push gateway address
    #[arg(long, value_name = "URL")]
    prometheus_address: Option<String>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

impl Cli {
    /// The command-line layer, holding only what was actually given.
    fn to_config(&self) -> Config {
        Config {
            domains: if self.domains.is_empty() {
                None
            } else {
                Some(self.domains.clone())
            },
            state_file: self.state.clone(),
            log_file: self.log_file.clone(),
            output: self.output.clone(),
            telegram: None,
            settings: Some(CheckSettings {
                expiry_threshold_days: self.threshold,
                test_mode: self.test_mode.then_some(true),
                ..CheckSettings::default()
            }),
            prometheus: Some(PrometheusConfig {
                enabled: self.prometheus.then_some(true),
                address: self.prometheus_address.clone(),
            }),
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, certnotify::ConfigError> {
    let file = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    Config::defaults()
        .merge_with(file)
        .merge_with(Config::from_env()?)
        .merge_with(cli.to_config())
        .resolve()
}

fn init_logging(log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run(settings: &Settings) -> Result<(), RunError> {
    let probe = CertificateProbe::new(TlsSource::new(settings.probe_timeout), settings.probe_retry);
    let transport = HttpTransport::new(settings.api_url.clone(), settings.request_timeout)?;
    let sink = TelegramSink::new(
        transport,
        settings.token.clone(),
        settings.chat_id.clone(),
        settings.send_retry,
    );
    let state = StateStore::open(&settings.state_file);

    let mut monitor = Monitor::new(settings, probe, sink, SystemClock, state);
    let run_report = monitor.run()?;

    println!("{}", report::render(&run_report, settings.output));

    if let Some(address) = &settings.prometheus_address {
        metrics::prom::prometheus_metrics(&run_report, address.as_str());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.generate_config {
        println!("{}", Config::example_toml());
        return ExitCode::SUCCESS;
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(settings.log_file.as_deref()) {
        eprintln!("Could not open log file: {}", e);
        return ExitCode::from(2);
    }

    std::panic::set_hook(Box::new(|panic| {
        error!(panic = %panic, "unexpected failure");
        eprintln!("Error: {}", panic);
    }));

    if settings.output != OutputFormat::Json {
        println!(
            "{}",
            report::header(settings.test_mode, settings.threshold_days)
        );
    }
    info!(state_file = %settings.state_file.display(), "configuration loaded");

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
