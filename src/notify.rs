//! Alert delivery through the Telegram Bot API.
//!
//! Two calls are used: `getMe` to check the bot token once per run, and
//! `sendMessage` to deliver an alert. Delivery is retried with a fixed
//! delay; a `true` return always means Telegram acknowledged the message.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use url::Url;

use crate::error::AlertError;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Delivers alert text to an operator.
pub trait AlertSink {
    /// Checks that the channel is usable. Called once before any domain is checked.
    fn validate_credentials(&self) -> bool;
    /// Sends `text`; returns true only on confirmed delivery.
    fn send(&self, text: &str) -> bool;
}

/// Destination chat: a numeric id or a public `@channel` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Name(String),
}

impl From<&str> for ChatId {
    fn from(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(id) => ChatId::Id(id),
            Err(_) => ChatId::Name(value.trim().to_string()),
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{}", id),
            ChatId::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Bot API envelope shared by every method.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Performs one Bot API call.
pub trait ApiTransport {
    fn call(&self, token: &str, method: &str, params: Option<&Value>)
        -> Result<ApiResponse, AlertError>;
}

/// HTTPS transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("certnotify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AlertError::Transport {
                method: "client".to_string(),
                details: e.to_string(),
            })?;
        Ok(HttpTransport { client, base })
    }

    fn endpoint(&self, token: &str, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base.as_str().trim_end_matches('/'),
            token,
            method
        )
    }
}

impl ApiTransport for HttpTransport {
    fn call(
        &self,
        token: &str,
        method: &str,
        params: Option<&Value>,
    ) -> Result<ApiResponse, AlertError> {
        let request = self.client.post(self.endpoint(token, method));
        let request = match params {
            Some(params) => request.json(params),
            None => request,
        };

        // The URL carries the token, so it is stripped from every error
        let response = request.send().map_err(|e| AlertError::Transport {
            method: method.to_string(),
            details: e.without_url().to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| AlertError::Transport {
            method: method.to_string(),
            details: e.without_url().to_string(),
        })?;
        interpret(method, status, &body)
    }
}

/// Turns an HTTP status and body into the Bot API envelope.
///
/// Non-2xx statuses are errors carrying Telegram's `description` when the
/// body has one, otherwise the start of the body.
pub fn interpret(method: &str, status: u16, body: &str) -> Result<ApiResponse, AlertError> {
    let parsed = serde_json::from_str::<ApiResponse>(body);

    if !(200..300).contains(&status) {
        let description = parsed
            .ok()
            .and_then(|r| r.description)
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(AlertError::Api {
            method: method.to_string(),
            status,
            description,
        });
    }

    parsed.map_err(|e| AlertError::Decode {
        method: method.to_string(),
        details: e.to_string(),
    })
}

pub struct TelegramSink<T, Z = ThreadSleeper> {
    transport: T,
    token: String,
    chat_id: ChatId,
    policy: RetryPolicy,
    sleeper: Z,
}

impl<T: ApiTransport> TelegramSink<T, ThreadSleeper> {
    pub fn new(transport: T, token: String, chat_id: ChatId, policy: RetryPolicy) -> Self {
        Self::with_sleeper(transport, token, chat_id, policy, ThreadSleeper)
    }
}

impl<T: ApiTransport, Z: Sleeper> TelegramSink<T, Z> {
    pub fn with_sleeper(
        transport: T,
        token: String,
        chat_id: ChatId,
        policy: RetryPolicy,
        sleeper: Z,
    ) -> Self {
        TelegramSink {
            transport,
            token,
            chat_id,
            policy,
            sleeper,
        }
    }

    fn check_token(&self) -> Result<String, AlertError> {
        if self.token.trim().is_empty() {
            return Err(AlertError::MissingToken);
        }
        let response = self.transport.call(&self.token, "getMe", None)?;
        if !response.ok {
            return Err(rejected("getMe", response));
        }
        Ok(response
            .result
            .as_ref()
            .and_then(|r| r.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    fn deliver(&self, params: &Value) -> Result<(), AlertError> {
        let response = self
            .transport
            .call(&self.token, "sendMessage", Some(params))?;
        if response.ok {
            Ok(())
        } else {
            Err(rejected("sendMessage", response))
        }
    }
}

fn rejected(method: &str, response: ApiResponse) -> AlertError {
    AlertError::Api {
        method: method.to_string(),
        status: 200,
        description: response
            .description
            .unwrap_or_else(|| "ok=false without description".to_string()),
    }
}

impl<T: ApiTransport, Z: Sleeper> AlertSink for TelegramSink<T, Z> {
    fn validate_credentials(&self) -> bool {
        match self.check_token() {
            Ok(username) => {
                info!(bot = %username, "Telegram token is valid");
                true
            }
            Err(e) => {
                error!(error = %e, "Telegram credential check failed");
                false
            }
        }
    }

    fn send(&self, text: &str) -> bool {
        if self.token.trim().is_empty() {
            error!(error = %AlertError::MissingToken, "alert not sent");
            return false;
        }
        let params = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match self
            .policy
            .run(&self.sleeper, "sendMessage", |_| self.deliver(&params))
        {
            Ok(()) => {
                info!(chat_id = %self.chat_id, "alert delivered");
                true
            }
            Err((attempts, e)) => {
                error!(attempts, error = %e, "alert delivery failed");
                false
            }
        }
    }
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Builds the alert text for one domain.
pub fn format_alert(
    domain: &str,
    days_left: i64,
    expiry: DateTime<Utc>,
    test_mode: bool,
) -> String {
    let header = if test_mode {
        "🧪 <b>TEST</b>"
    } else {
        "⚠️ <b>WARNING</b>"
    };
    let when = if days_left < 0 {
        format!("expired <b>{} days ago</b>", -days_left)
    } else {
        format!("expires in <b>{} days</b>", days_left)
    };
    format!(
        "{}\n\nCertificate for <b>{}</b> {}\n📅 Until: {} UTC",
        header,
        escape_html(domain),
        when,
        expiry.format("%d.%m.%Y %H:%M:%S")
    )
}
