pub mod client;
pub mod webhook;

pub use client::{
    Channel, ChatChannel, ConsoleChannel, DisabledChannel, ListRow, ListSection, OutboundRecord,
    RecordingChannel, ReplyButton, SendError, WhatsAppClient, BUTTON_TITLE_MAX_CHARS, MAX_BUTTONS,
    MAX_LIST_ROWS, MAX_SEND_ATTEMPTS, RETRY_BASE_DELAY_MS,
};
pub use webhook::{flatten, WebhookEnvelope, WebhookChange, WebhookEntry, WireMessage};
