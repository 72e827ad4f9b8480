//! Outbound transports and the ordered fallback chain over them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::models::Channel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Gateway rejected message: {0}")]
    Rejected(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No delivery channel configured")]
    NoChannels,
}

/// A transport that takes an address and a message body.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

/// Formats `to` for `channel`. Numbers with fewer than ten digits are refused.
pub fn normalize_address(channel: Channel, to: &str) -> Result<String, NotifyError> {
    let bare = to.trim().trim_start_matches("whatsapp:");
    let digits = bare.chars().filter(char::is_ascii_digit).count();
    if digits < 10 {
        return Err(NotifyError::InvalidAddress(to.to_string()));
    }

    Ok(match channel {
        Channel::WhatsApp => format!("whatsapp:{bare}"),
        Channel::Sms | Channel::DryRun => bare.to_string(),
    })
}

/// Posts `{ "to", "body", "channel" }` to an HTTP messaging gateway.
pub struct HttpGatewayNotifier {
    client: reqwest::Client,
    channel: Channel,
    url: String,
    token: Option<String>,
}

impl HttpGatewayNotifier {
    pub fn new(channel: Channel, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            channel,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Notifier for HttpGatewayNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let to = normalize_address(self.channel, to)?;
        let mut request = self.client.post(&self.url).json(&json!({
            "to": to,
            "body": body,
            "channel": self.channel.as_str(),
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(format!("HTTP {status}")))
        }
    }
}

/// Logs instead of sending. Used with `--dry-run`.
pub struct DryRunNotifier;

#[async_trait]
impl Notifier for DryRunNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let to = normalize_address(Channel::DryRun, to)?;
        tracing::info!(to = %to, chars = body.chars().count(), "Dry run: message not sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAttempt {
    pub channel: Channel,
    pub result: Result<(), NotifyError>,
}

/// Per-channel results of one delivery attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: Vec<ChannelAttempt>,
}

impl DeliveryReport {
    pub fn delivered_via(&self) -> Option<Channel> {
        self.attempts
            .iter()
            .find(|attempt| attempt.result.is_ok())
            .map(|attempt| attempt.channel)
    }

    /// The error that ended the attempt, when no channel succeeded.
    pub fn final_error(&self) -> Option<NotifyError> {
        if self.delivered_via().is_some() {
            return None;
        }
        Some(
            self.attempts
                .last()
                .and_then(|attempt| attempt.result.clone().err())
                .unwrap_or(NotifyError::NoChannels),
        )
    }
}

/// Tries each channel in order until one accepts the message. Each send
/// is bounded by `send_timeout`; a timeout counts as a failure.
pub struct ChannelChain {
    channels: Vec<(Channel, Arc<dyn Notifier>)>,
    send_timeout: Duration,
}

impl ChannelChain {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            send_timeout,
        }
    }

    pub fn with_channel(mut self, channel: Channel, notifier: Arc<dyn Notifier>) -> Self {
        self.channels.push((channel, notifier));
        self
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|(channel, _)| *channel).collect()
    }

    pub async fn deliver(&self, to: &str, body: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for (channel, notifier) in &self.channels {
            let result = match tokio::time::timeout(self.send_timeout, notifier.send(to, body)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(self.send_timeout)),
            };

            match &result {
                Ok(()) => tracing::debug!(channel = %channel, "Channel accepted message"),
                Err(e) => tracing::warn!(channel = %channel, error = %e, "Channel failed, trying next"),
            }

            let delivered = result.is_ok();
            report.attempts.push(ChannelAttempt {
                channel: *channel,
                result,
            });
            if delivered {
                break;
            }
        }

        report
    }
}

#[async_trait]
impl Notifier for ChannelChain {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        match self.deliver(to, body).await.final_error() {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
