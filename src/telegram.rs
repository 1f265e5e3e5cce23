//! Telegram Bot API client
//!
//! Only the two calls the bot needs: long-polling `getUpdates` and
//! `sendMessage`. Long texts are split to fit the 4096-character limit.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Base URL for the Bot API
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum characters per message
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Incoming update; only text messages are modelled
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Split `text` into chunks of at most `limit` characters, breaking on
/// newlines where possible
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            // A single line longer than the limit is cut by characters
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                let piece: String = piece.iter().collect();
                if piece.chars().count() == limit {
                    chunks.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Telegram Bot API client
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client; the HTTP timeout is padded past the long-poll timeout
    pub fn new(token: &str, long_poll_secs: u64) -> Result<Self> {
        Self::with_base_url(TELEGRAM_API_BASE, token, long_poll_secs)
    }

    pub fn with_base_url(base: &str, token: &str, long_poll_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(long_poll_secs + 10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(TelegramClient {
            client,
            base_url: format!("{}/bot{}", base.trim_end_matches('/'), token),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn unwrap_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        method: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Telegram {} error ({}): {}", method, status, text);
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            _ => bail!(
                "Telegram {} rejected: {}",
                method,
                body.description.unwrap_or_else(|| "no description".to_string())
            ),
        }
    }

    /// Long-poll for updates with id >= `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .send()
            .await
            .context("Failed to send getUpdates request")?;

        let updates: Vec<Update> = Self::unwrap_response(response, "getUpdates").await?;
        debug!("Received {} updates (offset {})", updates.len(), offset);
        Ok(updates)
    }

    /// Send a text message, split into several when it is too long
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        if chunks.len() > 1 {
            warn!("Message of {} chars split into {} parts", text.chars().count(), chunks.len());
        }

        for chunk in &chunks {
            let response = self
                .client
                .post(self.url("sendMessage"))
                .json(&SendMessage {
                    chat_id,
                    text: chunk,
                })
                .send()
                .await
                .context("Failed to send sendMessage request")?;

            let _: serde_json::Value = Self::unwrap_response(response, "sendMessage").await?;
        }
        Ok(())
    }
}
