//! Error types for certificate probing, alert delivery and state handling.
//!
//! Probe and delivery failures are recovered per domain by the monitor;
//! only [`RunError`] ends a run early.

use std::io;
use thiserror::Error;

/// A single failed attempt to read a peer certificate.
#[derive(Debug, Error)]
pub enum TlsError {
    /// DNS resolution failed for the given hostname
    #[error("failed to resolve hostname {hostname}: {source}")]
    DnsResolution {
        hostname: String,
        #[source]
        source: io::Error,
    },

    /// The hostname resolved to no usable address
    #[error("hostname {hostname} resolved to no addresses")]
    NoAddress { hostname: String },

    /// TCP connection failed to the target address
    #[error("connection failed to {address}: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// TLS handshake failed, including trust or hostname verification
    #[error("TLS handshake failed: {details}")]
    HandshakeFailed { details: String },

    /// The server completed the handshake without presenting a certificate
    #[error("server presented no certificate")]
    NoPeerCertificate,

    /// The certificate's validity field could not be read
    #[error("certificate parse error: {reason}")]
    CertificateParse { reason: String },

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

impl<S: std::fmt::Debug> From<openssl::ssl::HandshakeError<S>> for TlsError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::HandshakeFailed {
            details: e.to_string(),
        }
    }
}

/// Returned by the probe once every attempt has failed.
#[derive(Debug, Error)]
#[error("could not fetch certificate for {target} after {attempts} attempt(s): {last}")]
pub struct CertificateFetchError {
    pub target: String,
    pub attempts: u32,
    #[source]
    pub last: TlsError,
}

/// Failures talking to the messaging provider.
///
/// Call failures never escape [`crate::notify::AlertSink`]; they are logged
/// and turned into a `false` return.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("bot token is not set")]
    MissingToken,

    #[error("request to {method} failed: {details}")]
    Transport { method: String, details: String },

    #[error("{method} rejected with status {status}: {description}")]
    Api {
        method: String,
        status: u16,
        description: String,
    },

    #[error("could not decode {method} response: {details}")]
    Decode { method: String, details: String },
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("could not read state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not write state file {path}: {details}")]
    Persist { path: String, details: String },
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("messaging credentials missing or rejected; no domain was checked")]
    CredentialValidation,

    #[error("alert channel could not be set up: {0}")]
    Channel(#[from] AlertError),

    #[error(transparent)]
    State(#[from] StateError),
}
