use serde::Deserialize;
use vista_core::{InboundMessage, InboundPayload};

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<ChannelMetadata>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<WireText>,
    pub image: Option<WireImage>,
    pub interactive: Option<WireInteractive>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireText {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireImage {
    pub id: String,
    pub caption: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireInteractive {
    #[serde(rename = "type")]
    pub kind: String,
    pub button_reply: Option<WireReply>,
    pub list_reply: Option<WireReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireReply {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

// Status-only deliveries (sent/read receipts) carry no messages and flatten
// to nothing.
pub fn flatten(envelope: &WebhookEnvelope) -> Vec<InboundMessage> {
    let mut inbound = Vec::new();
    for entry in &envelope.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                continue;
            }
            for message in &change.value.messages {
                inbound.push(InboundMessage {
                    from: message.from.clone(),
                    id: message.id.clone(),
                    payload: parse_payload(message),
                });
            }
        }
    }
    inbound
}

fn parse_payload(message: &WireMessage) -> InboundPayload {
    match message.kind.as_str() {
        "text" => match &message.text {
            Some(text) => InboundPayload::Text {
                body: text.body.clone(),
            },
            None => InboundPayload::Unsupported {
                kind: message.kind.clone(),
            },
        },
        "image" => match &message.image {
            Some(image) => InboundPayload::Image {
                media_id: image.id.clone(),
                caption: image.caption.clone(),
            },
            None => InboundPayload::Unsupported {
                kind: message.kind.clone(),
            },
        },
        "interactive" => match &message.interactive {
            Some(interactive) => {
                if let Some(reply) = &interactive.button_reply {
                    InboundPayload::Button {
                        id: reply.id.clone(),
                        title: reply.title.clone(),
                    }
                } else if let Some(reply) = &interactive.list_reply {
                    InboundPayload::ListReply {
                        id: reply.id.clone(),
                        title: reply.title.clone(),
                    }
                } else {
                    InboundPayload::Unsupported {
                        kind: interactive.kind.clone(),
                    }
                }
            }
            None => InboundPayload::Unsupported {
                kind: message.kind.clone(),
            },
        },
        other => InboundPayload::Unsupported {
            kind: other.to_string(),
        },
    }
}
