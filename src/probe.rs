//! Reads a server certificate's expiry over a live TLS handshake.
//!
//! The handshake uses OpenSSL's default verification: the system trust
//! store plus hostname checking. A certificate that fails verification
//! counts as a failed attempt like any network error.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::ssl::{SslConnector, SslMethod};
use tracing::{debug, error};
use url::{Host, Url};

use crate::error::{CertificateFetchError, TlsError};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};

pub const DEFAULT_PORT: u16 = 443;

/// A host to probe, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The entry as written in the configuration; used as the state key.
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Parses `host`, `host:port` or `https://host[:port]`.
    ///
    /// Entries without an explicit port use `default_port`.
    pub fn parse(entry: &str, default_port: u16) -> Result<Target, String> {
        let name = entry.trim();
        if name.is_empty() {
            return Err("domain cannot be empty".to_string());
        }

        let with_scheme = if name.contains("://") {
            name.to_string()
        } else {
            format!("https://{}", name)
        };
        let url = Url::parse(&with_scheme).map_err(|e| format!("invalid domain '{}': {}", name, e))?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(format!("invalid domain '{}': no host", name)),
        };
        // Url drops the scheme's default port, so an explicit ":443" reads as None
        let port = url
            .port()
            .or_else(|| authority_port(name))
            .unwrap_or(default_port);

        Ok(Target {
            name: name.to_string(),
            host,
            port,
        })
    }
}

/// Port written in the authority part of `entry`, if any.
fn authority_port(entry: &str) -> Option<u16> {
    let rest = entry.split_once("://").map_or(entry, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let (_, port) = authority.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok()
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// One attempt at reading a certificate's "not valid after" instant.
pub trait CertificateSource {
    fn fetch_expiry(&self, target: &Target) -> Result<DateTime<Utc>, TlsError>;
}

/// Probes a target with retries; the monitor depends on this seam.
pub trait ExpiryProbe {
    fn probe(&self, target: &Target) -> Result<DateTime<Utc>, CertificateFetchError>;
}

/// Real TLS handshake through OpenSSL.
#[derive(Debug, Clone)]
pub struct TlsSource {
    timeout: Duration,
}

impl TlsSource {
    /// `timeout` bounds the TCP connect and every read/write of the handshake.
    pub fn new(timeout: Duration) -> Self {
        TlsSource { timeout }
    }

    fn connect(&self, target: &Target) -> Result<TcpStream, TlsError> {
        let addresses = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|source| TlsError::DnsResolution {
                hostname: target.host.clone(),
                source,
            })?;

        let mut last_error = None;
        for address in addresses {
            match TcpStream::connect_timeout(&address, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(address = %address, error = %e, "connect failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) => Err(TlsError::ConnectionFailed {
                address: target.to_string(),
                source,
            }),
            None => Err(TlsError::NoAddress {
                hostname: target.host.clone(),
            }),
        }
    }
}

impl CertificateSource for TlsSource {
    fn fetch_expiry(&self, target: &Target) -> Result<DateTime<Utc>, TlsError> {
        let tcp_stream = self.connect(target)?;
        tcp_stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| tcp_stream.set_write_timeout(Some(self.timeout)))
            .map_err(|source| TlsError::ConnectionFailed {
                address: target.to_string(),
                source,
            })?;

        let connector = SslConnector::builder(SslMethod::tls())?.build();
        let stream = connector.connect(&target.host, tcp_stream)?;

        let certificate = stream
            .ssl()
            .peer_certificate()
            .ok_or(TlsError::NoPeerCertificate)?;
        not_after_to_utc(certificate.not_after())
    }
}

/// Converts an ASN.1 validity time to a UTC instant.
pub fn not_after_to_utc(not_after: &Asn1TimeRef) -> Result<DateTime<Utc>, TlsError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(not_after)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| TlsError::CertificateParse {
        reason: format!("not_after {} is out of range", not_after),
    })
}

/// Certificate probe with bounded, fixed-delay retries.
pub struct CertificateProbe<S, Z = ThreadSleeper> {
    source: S,
    policy: RetryPolicy,
    sleeper: Z,
}

impl<S: CertificateSource> CertificateProbe<S, ThreadSleeper> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self::with_sleeper(source, policy, ThreadSleeper)
    }
}

impl<S: CertificateSource, Z: Sleeper> CertificateProbe<S, Z> {
    pub fn with_sleeper(source: S, policy: RetryPolicy, sleeper: Z) -> Self {
        CertificateProbe {
            source,
            policy,
            sleeper,
        }
    }
}

impl<S: CertificateSource, Z: Sleeper> ExpiryProbe for CertificateProbe<S, Z> {
    fn probe(&self, target: &Target) -> Result<DateTime<Utc>, CertificateFetchError> {
        let label = target.to_string();
        self.policy
            .run(&self.sleeper, &label, |_| self.source.fetch_expiry(target))
            .map_err(|(attempts, last)| {
                error!(
                    domain = %target.name,
                    attempts,
                    error = %last,
                    "certificate fetch failed, giving up"
                );
                CertificateFetchError {
                    target: label,
                    attempts,
                    last,
                }
            })
    }
}
