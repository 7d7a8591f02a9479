use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_SEND_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const MAX_BUTTONS: usize = 3;
pub const MAX_LIST_ROWS: usize = 10;
pub const BUTTON_TITLE_MAX_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

impl ReplyButton {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("whatsapp rejected the request with status {status}: {body}")]
    Client { status: u16, body: String },
    #[error("whatsapp kept returning {status} after {attempts} attempts: {body}")]
    ServerExhausted {
        status: u16,
        attempts: u32,
        body: String,
    },
    #[error("unexpected whatsapp response: {0}")]
    Malformed(String),
    #[error("whatsapp channel is not configured")]
    NotConfigured,
    #[error("transport error talking to whatsapp: {0}")]
    Transport(#[from] reqwest::Error),
}

pub trait ChatChannel: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), SendError>;
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), SendError>;
    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), SendError>;
    async fn mark_read(&self, message_id: &str) -> Result<(), SendError>;
    async fn media_url(&self, media_id: &str) -> Result<String, SendError>;
}

#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    graph_base: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppClient {
    pub fn new(
        graph_base: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .connect_timeout(Duration::from_secs(6))
                .timeout(Duration::from_secs(20))
                .build()
                .context("failed to build WhatsApp HTTP client")?,
            graph_base: graph_base.into(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.graph_base.trim_end_matches('/'),
            self.phone_number_id
        )
    }

    // One attempt per loop pass; only 5xx responses are worth another try.
    async fn post_message(&self, payload: Value) -> Result<(), SendError> {
        let mut attempt = 1_u32;
        loop {
            let response = self
                .http
                .post(self.messages_url())
                .bearer_auth(&self.access_token)
                .json(&payload)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                debug!(status = status.as_u16(), "whatsapp message accepted");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                if attempt < MAX_SEND_ATTEMPTS {
                    let delay =
                        Duration::from_millis(RETRY_BASE_DELAY_MS * 2_u64.pow(attempt - 1));
                    warn!(
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "whatsapp returned a server error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(SendError::ServerExhausted {
                    status: status.as_u16(),
                    attempts: attempt,
                    body,
                });
            }

            return Err(SendError::Client {
                status: status.as_u16(),
                body,
            });
        }
    }
}

impl ChatChannel for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), SendError> {
        self.post_message(text_payload(to, body)).await
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), SendError> {
        self.post_message(buttons_payload(to, body, buttons)).await
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), SendError> {
        self.post_message(list_payload(to, body, button_label, sections))
            .await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SendError> {
        self.post_message(read_payload(message_id)).await
    }

    async fn media_url(&self, media_id: &str) -> Result<String, SendError> {
        let url = format!("{}/{}", self.graph_base.trim_end_matches('/'), media_id);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Client {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| SendError::Malformed(e.to_string()))?;
        value["url"]
            .as_str()
            .map(|url| url.to_string())
            .ok_or_else(|| SendError::Malformed("media lookup response missing url".to_string()))
    }
}

fn truncate_title(title: &str) -> String {
    title.chars().take(BUTTON_TITLE_MAX_CHARS).collect()
}

fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}

fn buttons_payload(to: &str, body: &str, buttons: &[ReplyButton]) -> Value {
    let rendered: Vec<Value> = buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|button| {
            json!({
                "type": "reply",
                "reply": { "id": button.id, "title": truncate_title(&button.title) }
            })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": rendered }
        }
    })
}

fn list_payload(to: &str, body: &str, button_label: &str, sections: &[ListSection]) -> Value {
    let mut remaining = MAX_LIST_ROWS;
    let rendered: Vec<Value> = sections
        .iter()
        .map(|section| {
            let rows: Vec<Value> = section
                .rows
                .iter()
                .take(remaining)
                .map(|row| {
                    let mut value = json!({
                        "id": row.id,
                        "title": truncate_title(&row.title)
                    });
                    if let Some(description) = &row.description {
                        value["description"] = json!(description);
                    }
                    value
                })
                .collect();
            remaining = remaining.saturating_sub(rows.len());
            json!({ "title": section.title, "rows": rows })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "list",
            "body": { "text": body },
            "action": { "button": button_label, "sections": rendered }
        }
    })
}

fn read_payload(message_id: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "status": "read",
        "message_id": message_id
    })
}

#[derive(Clone, Copy, Default)]
pub struct ConsoleChannel;

impl ChatChannel for ConsoleChannel {
    async fn send_text(&self, _to: &str, body: &str) -> Result<(), SendError> {
        println!("{}\n", body);
        Ok(())
    }

    async fn send_buttons(
        &self,
        _to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), SendError> {
        println!("{}", body);
        for button in buttons.iter().take(MAX_BUTTONS) {
            println!("  [{}] {}", button.id, button.title);
        }
        println!();
        Ok(())
    }

    async fn send_list(
        &self,
        _to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), SendError> {
        println!("{}", body);
        println!("  ({})", button_label);
        let mut remaining = MAX_LIST_ROWS;
        for section in sections {
            for row in section.rows.iter().take(remaining) {
                println!("  [{}] {}", row.id, row.title);
            }
            remaining = remaining.saturating_sub(section.rows.len().min(remaining));
        }
        println!();
        Ok(())
    }

    async fn mark_read(&self, _message_id: &str) -> Result<(), SendError> {
        Ok(())
    }

    async fn media_url(&self, media_id: &str) -> Result<String, SendError> {
        Ok(format!("file://local-media/{}", media_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRecord {
    Text {
        to: String,
        body: String,
    },
    Buttons {
        to: String,
        body: String,
        buttons: Vec<ReplyButton>,
    },
    List {
        to: String,
        body: String,
        rows: Vec<ListRow>,
    },
    Read {
        message_id: String,
    },
}

#[derive(Clone, Default)]
pub struct RecordingChannel {
    records: Arc<Mutex<Vec<OutboundRecord>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<OutboundRecord> {
        self.records.lock().drain(..).collect()
    }

    pub fn records(&self) -> Vec<OutboundRecord> {
        self.records.lock().clone()
    }
}

impl ChatChannel for RecordingChannel {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), SendError> {
        self.records.lock().push(OutboundRecord::Text {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), SendError> {
        self.records.lock().push(OutboundRecord::Buttons {
            to: to.to_string(),
            body: body.to_string(),
            buttons: buttons.iter().take(MAX_BUTTONS).cloned().collect(),
        });
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        _button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), SendError> {
        let rows: Vec<ListRow> = sections
            .iter()
            .flat_map(|section| section.rows.iter().cloned())
            .take(MAX_LIST_ROWS)
            .collect();
        self.records.lock().push(OutboundRecord::List {
            to: to.to_string(),
            body: body.to_string(),
            rows,
        });
        Ok(())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SendError> {
        self.records.lock().push(OutboundRecord::Read {
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn media_url(&self, media_id: &str) -> Result<String, SendError> {
        Ok(format!("https://media.test/{}", media_id))
    }
}

#[derive(Clone, Copy, Default)]
pub struct DisabledChannel;

impl ChatChannel for DisabledChannel {
    async fn send_text(&self, to: &str, _body: &str) -> Result<(), SendError> {
        warn!(to = %to, "whatsapp channel not configured, dropping text message");
        Ok(())
    }

    async fn send_buttons(
        &self,
        to: &str,
        _body: &str,
        _buttons: &[ReplyButton],
    ) -> Result<(), SendError> {
        warn!(to = %to, "whatsapp channel not configured, dropping button message");
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        _body: &str,
        _button_label: &str,
        _sections: &[ListSection],
    ) -> Result<(), SendError> {
        warn!(to = %to, "whatsapp channel not configured, dropping list message");
        Ok(())
    }

    async fn mark_read(&self, _message_id: &str) -> Result<(), SendError> {
        Ok(())
    }

    async fn media_url(&self, _media_id: &str) -> Result<String, SendError> {
        Err(SendError::NotConfigured)
    }
}

#[derive(Clone)]
pub enum Channel {
    Cloud(WhatsAppClient),
    Console(ConsoleChannel),
    Recording(RecordingChannel),
    Disabled(DisabledChannel),
}

impl ChatChannel for Channel {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), SendError> {
        match self {
            Channel::Cloud(channel) => channel.send_text(to, body).await,
            Channel::Console(channel) => channel.send_text(to, body).await,
            Channel::Recording(channel) => channel.send_text(to, body).await,
            Channel::Disabled(channel) => channel.send_text(to, body).await,
        }
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), SendError> {
        match self {
            Channel::Cloud(channel) => channel.send_buttons(to, body, buttons).await,
            Channel::Console(channel) => channel.send_buttons(to, body, buttons).await,
            Channel::Recording(channel) => channel.send_buttons(to, body, buttons).await,
            Channel::Disabled(channel) => channel.send_buttons(to, body, buttons).await,
        }
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), SendError> {
        match self {
            Channel::Cloud(channel) => channel.send_list(to, body, button_label, sections).await,
            Channel::Console(channel) => channel.send_list(to, body, button_label, sections).await,
            Channel::Recording(channel) => {
                channel.send_list(to, body, button_label, sections).await
            }
            Channel::Disabled(channel) => {
                channel.send_list(to, body, button_label, sections).await
            }
        }
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), SendError> {
        match self {
            Channel::Cloud(channel) => channel.mark_read(message_id).await,
            Channel::Console(channel) => channel.mark_read(message_id).await,
            Channel::Recording(channel) => channel.mark_read(message_id).await,
            Channel::Disabled(channel) => channel.mark_read(message_id).await,
        }
    }

    async fn media_url(&self, media_id: &str) -> Result<String, SendError> {
        match self {
            Channel::Cloud(channel) => channel.media_url(media_id).await,
            Channel::Console(channel) => channel.media_url(media_id).await,
            Channel::Recording(channel) => channel.media_url(media_id).await,
            Channel::Disabled(channel) => channel.media_url(media_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_payload_caps_and_truncates() {
        let buttons = vec![
            ReplyButton::new("a", "Un título muchísimo más largo que veinte"),
            ReplyButton::new("b", "B"),
            ReplyButton::new("c", "C"),
            ReplyButton::new("d", "D"),
        ];
        let payload = buttons_payload("+56911111111", "elige", &buttons);
        let rendered = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(rendered.len(), MAX_BUTTONS);
        let title = rendered[0]["reply"]["title"].as_str().unwrap();
        assert_eq!(title.chars().count(), BUTTON_TITLE_MAX_CHARS);
    }

    #[test]
    fn list_payload_caps_total_rows() {
        let sections = vec![ListSection {
            title: "Espacios".to_string(),
            rows: (1..=12)
                .map(|n| ListRow::new(format!("espacios_{n}"), format!("{n}")))
                .collect(),
        }];
        let payload = list_payload("+56911111111", "elige", "Ver opciones", &sections);
        let rows = payload["interactive"]["action"]["sections"][0]["rows"]
            .as_array()
            .unwrap();
        assert_eq!(rows.len(), MAX_LIST_ROWS);
    }

    #[test]
    fn text_payload_matches_cloud_api_shape() {
        let payload = text_payload("+56911111111", "hola");
        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["recipient_type"], "individual");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["text"]["body"], "hola");
    }

    #[tokio::test]
    async fn recording_channel_captures_sends() {
        let channel = RecordingChannel::new();
        channel.send_text("+56911111111", "hola").await.unwrap();
        channel.mark_read("wamid.1").await.unwrap();
        let records = channel.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            OutboundRecord::Text {
                to: "+56911111111".to_string(),
                body: "hola".to_string()
            }
        );
        assert!(channel.drain().is_empty());
    }
}
