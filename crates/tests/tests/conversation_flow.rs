use std::sync::Arc;

use serde_json::json;
use vista_bot::IntakeBot;
use vista_core::{BusinessInfo, FieldId, InboundMessage, InboundPayload, IntakeStep, ServiceKind};
use vista_export::{LeadSink, RecordingSink};
use vista_observability::BotMetrics;
use vista_storage::{LeadRepository, MemoryStore};
use vista_wa::{OutboundRecord, RecordingChannel, WebhookEnvelope};

struct Harness {
    bot: IntakeBot<MemoryStore, RecordingChannel>,
    store: Arc<MemoryStore>,
    channel: RecordingChannel,
    sink: RecordingSink,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let channel = RecordingChannel::new();
    let sink = RecordingSink::new();
    let bot = IntakeBot::new(
        store.clone(),
        Arc::new(channel.clone()),
        LeadSink::Recording(sink.clone()),
        BusinessInfo::default(),
        BotMetrics::shared(),
    );
    Harness {
        bot,
        store,
        channel,
        sink,
    }
}

async fn text(harness: &Harness, phone: &str, body: &str) {
    harness
        .bot
        .handle_message(InboundMessage {
            from: phone.to_string(),
            id: "wamid.test".to_string(),
            payload: InboundPayload::Text {
                body: body.to_string(),
            },
        })
        .await
        .expect("text message should be handled");
}

async fn tap(harness: &Harness, phone: &str, id: &str, title: &str) {
    harness
        .bot
        .handle_message(InboundMessage {
            from: phone.to_string(),
            id: "wamid.test".to_string(),
            payload: InboundPayload::Button {
                id: id.to_string(),
                title: title.to_string(),
            },
        })
        .await
        .expect("button reply should be handled");
}

fn sent_bodies(harness: &Harness) -> Vec<String> {
    harness
        .channel
        .drain()
        .into_iter()
        .filter_map(|record| match record {
            OutboundRecord::Text { body, .. }
            | OutboundRecord::Buttons { body, .. }
            | OutboundRecord::List { body, .. } => Some(body),
            OutboundRecord::Read { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn wire_delivery_drives_the_welcome_menu() {
    let harness = harness();
    let envelope: WebhookEnvelope = serde_json::from_value(json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "entry-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messages": [{
                        "from": "+56944440001",
                        "id": "wamid.hello",
                        "type": "text",
                        "text": { "body": "hola" }
                    }]
                }
            }]
        }]
    }))
    .unwrap();

    harness.bot.handle_webhook(&envelope).await;

    let records = harness.channel.drain();
    assert!(records
        .iter()
        .any(|record| matches!(record, OutboundRecord::Read { .. })));
    let menu = records.iter().find_map(|record| match record {
        OutboundRecord::List { rows, .. } => Some(rows),
        _ => None,
    });
    let rows = menu.expect("welcome list should be sent");
    assert_eq!(rows.len(), ServiceKind::all().len());

    let lead = harness
        .store
        .load("+56944440001")
        .await
        .unwrap()
        .expect("lead should be stored");
    assert_eq!(lead.step, IntakeStep::Welcome);
}

#[tokio::test]
async fn answers_walk_the_question_cursor_in_order() {
    let harness = harness();
    let phone = "+56944440002";

    text(&harness, phone, "hola").await;
    tap(&harness, phone, "restaurante", "Restaurante").await;
    harness.channel.drain();

    text(&harness, phone, "Providencia").await;
    let bodies = sent_bodies(&harness);
    let next_question = bodies.last().expect("a follow-up question is asked");
    assert!(next_question.contains("dirección"));

    let lead = harness.store.load(phone).await.unwrap().unwrap();
    assert_eq!(lead.service, Some(ServiceKind::Restaurante));
    assert_eq!(lead.answers.text(FieldId::Comuna), Some("Providencia"));
    assert_eq!(lead.step, IntakeStep::CollectingInfo);
}

#[tokio::test]
async fn conversations_stay_isolated_per_phone() {
    let harness = harness();

    text(&harness, "+56944440003", "hola").await;
    tap(&harness, "+56944440003", "hotel", "Hotel").await;
    text(&harness, "+56944440003", "Las Condes").await;

    text(&harness, "+56944440004", "hola").await;

    let first = harness.store.load("+56944440003").await.unwrap().unwrap();
    assert_eq!(first.service, Some(ServiceKind::Hotel));
    assert_eq!(first.answers.len(), 1);

    let second = harness.store.load("+56944440004").await.unwrap().unwrap();
    assert_eq!(second.step, IntakeStep::Welcome);
    assert!(second.answers.is_empty());
    assert_eq!(second.service, None);
}

#[tokio::test]
async fn wire_images_attach_media_and_resume_the_questions() {
    let harness = harness();
    let phone = "+56944440005";

    text(&harness, phone, "hola").await;
    tap(&harness, phone, "restaurante", "Restaurante").await;
    harness.channel.drain();

    let envelope: WebhookEnvelope = serde_json::from_value(json!({
        "entry": [{
            "changes": [{
                "field": "messages",
                "value": {
                    "messages": [{
                        "from": phone,
                        "id": "wamid.img",
                        "type": "image",
                        "image": { "id": "MEDIA-77", "caption": "la terraza" }
                    }]
                }
            }]
        }]
    }))
    .unwrap();
    harness.bot.handle_webhook(&envelope).await;

    let bodies = sent_bodies(&harness);
    assert!(bodies.iter().any(|body| body.contains("Recibí tu imagen")));

    let lead = harness.store.load(phone).await.unwrap().unwrap();
    assert_eq!(lead.media_urls, vec!["https://media.test/MEDIA-77"]);
    assert!(harness.sink.is_empty());
}

#[tokio::test]
async fn menu_command_reopens_the_list_without_losing_answers() {
    let harness = harness();
    let phone = "+56944440006";

    text(&harness, phone, "hola").await;
    tap(&harness, phone, "restaurante", "Restaurante").await;
    text(&harness, phone, "Providencia").await;
    harness.channel.drain();

    text(&harness, phone, "menú").await;

    let records = harness.channel.drain();
    assert!(records
        .iter()
        .any(|record| matches!(record, OutboundRecord::List { .. })));

    let lead = harness.store.load(phone).await.unwrap().unwrap();
    assert_eq!(lead.step, IntakeStep::Welcome);
    assert_eq!(lead.answers.text(FieldId::Comuna), Some("Providencia"));
}
