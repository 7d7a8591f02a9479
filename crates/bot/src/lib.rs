use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use tracing::{debug, error, info, instrument, warn};

use vista_core::{
    calculate_quote, classify_service, extract_context, extract_url, is_contact_field,
    nav_command, next_contact_field, next_intake_field, parse_count, parse_date, quote_ready,
    render_summary, validate_comuna, validate_email, validate_rut, AnswerValue, BusinessInfo,
    DocKind, EditLevel, FieldId, InboundMessage, InboundPayload, IntakeStep, Lead, NavCommand,
    QuoteRequest, ServiceKind,
};
use vista_export::{build_payload, LeadSink};
use vista_observability::BotMetrics;
use vista_storage::LeadRepository;
use vista_wa::{flatten, ChatChannel, ListSection, ReplyButton, WebhookEnvelope};

mod prompts;

// Classification has to clear this score before the service menu is skipped.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

const SCHEDULE_SLOTS: usize = 3;

#[derive(Clone)]
pub struct IntakeBot<S, C> {
    store: Arc<S>,
    channel: Arc<C>,
    sink: LeadSink,
    business: BusinessInfo,
    metrics: Arc<BotMetrics>,
}

impl<S, C> IntakeBot<S, C>
where
    S: LeadRepository,
    C: ChatChannel,
{
    pub fn new(
        store: Arc<S>,
        channel: Arc<C>,
        sink: LeadSink,
        business: BusinessInfo,
        metrics: Arc<BotMetrics>,
    ) -> Self {
        Self {
            store,
            channel,
            sink,
            business,
            metrics,
        }
    }

    // One bad message must not poison the rest of the delivery batch.
    pub async fn handle_webhook(&self, envelope: &WebhookEnvelope) {
        for message in flatten(envelope) {
            let phone = message.from.clone();
            if let Err(err) = self.handle_message(message).await {
                error!(phone = %phone, error = %err, "message handling failed");
            }
        }
    }

    #[instrument(skip(self, message), fields(phone = %message.from))]
    pub async fn handle_message(&self, message: InboundMessage) -> Result<()> {
        let started = Instant::now();
        self.metrics.inc_message();

        if let Err(err) = self.channel.mark_read(&message.id).await {
            warn!(error = %err, "read receipt failed");
        }

        match &message.payload {
            InboundPayload::Text { body } => self.handle_text(&message.from, body).await?,
            InboundPayload::Button { id, .. } => self.handle_button(&message.from, id).await?,
            InboundPayload::ListReply { id, .. } => {
                self.handle_list_reply(&message.from, id).await?
            }
            InboundPayload::Image { media_id, .. } => {
                self.handle_image(&message.from, media_id).await?
            }
            InboundPayload::Unsupported { kind } => {
                self.send_text(&message.from, &prompts::unsupported_kind(kind))
                    .await?
            }
        }

        self.metrics.observe_latency(started.elapsed());
        info!(
            latency_ms = started.elapsed().as_millis() as u64,
            "message handled"
        );
        Ok(())
    }

    pub async fn purge_expired_leads(&self) -> Result<u64> {
        self.store.purge_stale(Utc::now()).await
    }

    // Admin-triggered confirmation; sends the courtesy note and exports.
    pub async fn confirm_lead(&self, phone: &str) -> Result<Option<Lead>> {
        let Some(mut lead) = self.store.load(phone).await? else {
            return Ok(None);
        };
        lead.confirmed = true;
        let lead = self.save(lead).await?;
        self.metrics.inc_lead_confirmed();

        self.send_text(
            phone,
            "✅ ¡Tu solicitud fue confirmada! Nuestro equipo te contactará para coordinar los detalles.",
        )
        .await?;
        self.export_lead(&lead).await;
        Ok(Some(lead))
    }

    async fn handle_text(&self, from: &str, body: &str) -> Result<()> {
        if let Some(command) = nav_command(body) {
            return self.handle_nav(from, command).await;
        }
        self.dispatch_step(from, body).await
    }

    async fn dispatch_step(&self, from: &str, body: &str) -> Result<()> {
        let lead = self.current_lead(from).await?;
        match lead.step {
            IntakeStep::Welcome => self.handle_welcome(from, body, lead).await,
            IntakeStep::CollectingInfo => self.handle_intake_answer(from, body, lead).await,
            IntakeStep::ConfirmingData => self.handle_confirmation(from, body, lead).await,
            IntakeStep::ShowingPricing => self.handle_pricing_choice(from, body, lead).await,
            IntakeStep::CollectingContact => self.handle_contact_answer(from, body, lead).await,
            IntakeStep::Scheduling => self.handle_scheduling(from, body, lead).await,
        }
    }

    async fn handle_welcome(&self, from: &str, body: &str, lead: Lead) -> Result<()> {
        let classification = classify_service(body);
        let context = extract_context(body);
        debug!(
            kind = classification.kind.as_id(),
            confidence = classification.confidence,
            matched = classification.matched.len(),
            urgent = context.urgent,
            budget = ?context.budget,
            "first message classified"
        );

        if classification.confidence > CONFIDENCE_THRESHOLD {
            return self.select_service(from, lead, classification.kind).await;
        }
        self.show_welcome(from, lead).await
    }

    async fn show_welcome(&self, from: &str, mut lead: Lead) -> Result<()> {
        lead.step = IntakeStep::Welcome;
        self.save(lead).await?;
        self.send_list(
            from,
            &prompts::welcome_body(&self.business),
            "Ver opciones",
            &prompts::service_sections(),
        )
        .await
    }

    async fn select_service(&self, from: &str, mut lead: Lead, kind: ServiceKind) -> Result<()> {
        lead.service = Some(kind);
        lead.step = IntakeStep::CollectingInfo;
        let lead = self.save(lead).await?;
        self.send_text(from, &prompts::service_selected(kind)).await?;
        self.ask_next_question(from, &lead).await
    }

    async fn handle_intake_answer(&self, from: &str, body: &str, mut lead: Lead) -> Result<()> {
        let Some(field) = next_intake_field(&lead.answers) else {
            return self.show_summary(from, lead).await;
        };

        let value = match Self::parse_answer(field, body) {
            Ok(value) => value,
            Err(reply) => return self.send_text(from, reply).await,
        };

        lead.answers.set(field, value);
        let lead = self.save(lead).await?;
        self.ask_next_question(from, &lead).await
    }

    async fn handle_contact_answer(&self, from: &str, body: &str, mut lead: Lead) -> Result<()> {
        let Some(field) = next_contact_field(&lead.answers) else {
            return self.start_scheduling(from, lead).await;
        };

        let value = match Self::parse_answer(field, body) {
            Ok(value) => value,
            Err(reply) => return self.send_text(from, reply).await,
        };

        lead.answers.set(field, value);
        let lead = self.save(lead).await?;

        if field == FieldId::Documento && lead.answers.document() == Some(DocKind::Factura) {
            return self.send_text(from, prompts::FACTURA_FOLLOWUP).await;
        }
        match next_contact_field(&lead.answers) {
            Some(next) => self.ask_field(from, &lead, next).await,
            None => self.start_scheduling(from, lead).await,
        }
    }

    async fn handle_confirmation(&self, from: &str, body: &str, lead: Lead) -> Result<()> {
        let lower = body.to_lowercase();
        if ["sí", "si", "yes", "ok"].into_iter().any(|w| lower.contains(w)) {
            return self.show_pricing(from, lead).await;
        }
        if ["editar", "edit", "cambiar"].into_iter().any(|w| lower.contains(w)) {
            return self.begin_edit(from, lead).await;
        }
        self.send_text(from, prompts::CONFIRM_REPROMPT).await
    }

    async fn handle_pricing_choice(&self, from: &str, body: &str, lead: Lead) -> Result<()> {
        let lower = body.to_lowercase();
        if ["agendar", "agenda", "sí", "si"]
            .into_iter()
            .any(|w| lower.contains(w))
        {
            return self.start_contact(from, lead).await;
        }
        if ["editar", "edit"].into_iter().any(|w| lower.contains(w)) {
            return self.begin_edit(from, lead).await;
        }
        if ["humano", "persona"].into_iter().any(|w| lower.contains(w)) {
            return self.human_handoff(from).await;
        }
        self.send_text(from, prompts::PRICING_REPROMPT).await
    }

    async fn handle_scheduling(&self, from: &str, body: &str, mut lead: Lead) -> Result<()> {
        let Some(parsed) = parse_date(body.trim(), Utc::now().date_naive()) else {
            return self.send_text(from, prompts::INVALID_SCHEDULE_DATE).await;
        };

        lead.answers.set(
            FieldId::FechaAgendada,
            AnswerValue::Text(parsed.display.clone()),
        );
        lead.confirmed = true;
        let lead = self.save(lead).await?;
        self.metrics.inc_lead_confirmed();

        self.send_text(
            from,
            &prompts::scheduled_confirmation(&parsed.display, &self.business),
        )
        .await?;
        self.export_lead(&lead).await;
        Ok(())
    }

    async fn handle_nav(&self, from: &str, command: NavCommand) -> Result<()> {
        match command {
            NavCommand::Menu => {
                let lead = self.current_lead(from).await?;
                self.show_welcome(from, lead).await
            }
            NavCommand::Back => self.rewind_question(from).await,
            NavCommand::Reset => {
                self.store.remove(from).await?;
                self.show_welcome(from, Lead::new(from)).await
            }
            NavCommand::Human => self.human_handoff(from).await,
        }
    }

    async fn rewind_question(&self, from: &str) -> Result<()> {
        let mut lead = self.current_lead(from).await?;
        match lead.answers.rewind() {
            Some(field) => {
                lead.step = if is_contact_field(field) {
                    IntakeStep::CollectingContact
                } else {
                    IntakeStep::CollectingInfo
                };
                let lead = self.save(lead).await?;
                self.send_text(from, &format!("Volvamos a: {}", field.label()))
                    .await?;
                self.ask_field(from, &lead, field).await
            }
            None => self.show_welcome(from, lead).await,
        }
    }

    async fn handle_button(&self, from: &str, id: &str) -> Result<()> {
        if let Some(kind) = ServiceKind::parse_id(id) {
            let lead = self.current_lead(from).await?;
            return self.select_service(from, lead, kind).await;
        }

        match id {
            "agendar" => {
                let lead = self.current_lead(from).await?;
                self.start_contact(from, lead).await
            }
            "editar_datos" => {
                let lead = self.current_lead(from).await?;
                self.begin_edit(from, lead).await
            }
            "hablar_humano" => self.human_handoff(from).await,
            // Answer buttons reuse the text path so typed and tapped replies behave alike.
            other => match Self::button_reply_text(other) {
                Some(text) => self.dispatch_step(from, text).await,
                None => self.unknown_option(from, other).await,
            },
        }
    }

    async fn handle_list_reply(&self, from: &str, id: &str) -> Result<()> {
        if let Some(kind) = ServiceKind::parse_id(id) {
            let lead = self.current_lead(from).await?;
            return self.select_service(from, lead, kind).await;
        }

        if let Some(count) = id
            .strip_prefix("espacios_")
            .and_then(|raw| raw.parse::<u32>().ok())
        {
            let mut lead = self.current_lead(from).await?;
            if lead.step == IntakeStep::CollectingInfo {
                lead.answers.set(FieldId::Espacios, AnswerValue::Count(count));
                let lead = self.save(lead).await?;
                return self.continue_intake(from, &lead).await;
            }
        }

        self.unknown_option(from, id).await
    }

    async fn handle_image(&self, from: &str, media_id: &str) -> Result<()> {
        let mut lead = self.current_lead(from).await?;

        match self.channel.media_url(media_id).await {
            Ok(url) => {
                lead.media_urls.push(url);
                let lead = self.save(lead).await?;
                self.send_text(from, prompts::IMAGE_ACK).await?;
                if lead.step == IntakeStep::CollectingInfo {
                    return self.continue_intake(from, &lead).await;
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, media_id, "media lookup failed");
                self.send_text(from, prompts::IMAGE_ERROR).await
            }
        }
    }

    async fn ask_next_question(&self, from: &str, lead: &Lead) -> Result<()> {
        if let Some(field) = next_intake_field(&lead.answers) {
            return self.ask_field(from, lead, field).await;
        }
        if lead.step == IntakeStep::CollectingContact {
            if let Some(field) = next_contact_field(&lead.answers) {
                return self.ask_field(from, lead, field).await;
            }
        }
        self.show_summary(from, lead.clone()).await
    }

    // List and image replies resume here: once the quote inputs are complete
    // the remaining optional questions are skipped.
    async fn continue_intake(&self, from: &str, lead: &Lead) -> Result<()> {
        if quote_ready(&lead.answers) {
            return self.show_summary(from, lead.clone()).await;
        }
        self.ask_next_question(from, lead).await
    }

    async fn ask_field(&self, from: &str, lead: &Lead, field: FieldId) -> Result<()> {
        match field {
            FieldId::Espacios => self.ask_espacios(from, lead).await,
            FieldId::Edicion => {
                self.send_buttons(from, prompts::EDITION_QUESTION, &prompts::edition_buttons())
                    .await
            }
            FieldId::Embed => {
                self.send_buttons(from, prompts::EMBED_QUESTION, &prompts::embed_buttons())
                    .await
            }
            FieldId::Urgente => {
                self.send_buttons(
                    from,
                    prompts::DELIVERY_QUESTION,
                    &prompts::delivery_buttons(),
                )
                .await
            }
            FieldId::Documento => {
                self.send_buttons(
                    from,
                    prompts::DOCUMENT_QUESTION,
                    &prompts::document_buttons(),
                )
                .await
            }
            other => self.send_text(from, prompts::question_text(other)).await,
        }
    }

    async fn ask_espacios(&self, from: &str, lead: &Lead) -> Result<()> {
        let multi_space = matches!(
            lead.service,
            Some(ServiceKind::Restaurante | ServiceKind::VenueEventos | ServiceKind::Hotel)
        );
        if multi_space {
            let body = format!(
                "{}\n\nPuedes elegir de la lista o escribir un número específico.",
                prompts::ESPACIOS_QUESTION
            );
            self.send_list(from, &body, "Seleccionar cantidad", &prompts::espacios_sections())
                .await
        } else {
            self.send_text(from, prompts::ESPACIOS_QUESTION).await
        }
    }

    async fn show_summary(&self, from: &str, mut lead: Lead) -> Result<()> {
        lead.step = IntakeStep::ConfirmingData;
        let lead = self.save(lead).await?;
        self.send_text(from, &prompts::data_summary(&lead)).await
    }

    async fn show_pricing(&self, from: &str, mut lead: Lead) -> Result<()> {
        let Some(request) = Self::quote_request(&lead) else {
            // A required answer disappeared; fall back to the question cursor.
            lead.step = IntakeStep::CollectingInfo;
            let lead = self.save(lead).await?;
            return self.ask_next_question(from, &lead).await;
        };

        let quote = calculate_quote(&request);
        let summary = render_summary(&quote);
        lead.quote = Some(quote);
        lead.step = IntakeStep::ShowingPricing;
        self.save(lead).await?;
        self.metrics.inc_quote();

        self.send_buttons(from, &summary, &prompts::pricing_buttons())
            .await
    }

    fn quote_request(lead: &Lead) -> Option<QuoteRequest> {
        Some(QuoteRequest {
            spaces: lead.answers.count(FieldId::Espacios)?,
            edition: lead.answers.edition()?,
            embed: lead.answers.flag(FieldId::Embed)?,
            urgent: lead.answers.flag(FieldId::Urgente)?,
            comuna: lead.answers.text(FieldId::Comuna)?.to_string(),
        })
    }

    async fn start_contact(&self, from: &str, mut lead: Lead) -> Result<()> {
        lead.step = IntakeStep::CollectingContact;
        self.save(lead).await?;
        self.send_text(from, prompts::CONTACT_INTRO).await
    }

    async fn begin_edit(&self, from: &str, mut lead: Lead) -> Result<()> {
        lead.step = IntakeStep::CollectingInfo;
        self.save(lead).await?;
        self.send_text(from, prompts::EDIT_HINT).await
    }

    async fn start_scheduling(&self, from: &str, mut lead: Lead) -> Result<()> {
        lead.step = IntakeStep::Scheduling;
        self.save(lead).await?;
        let dates = upcoming_business_days(Utc::now().date_naive(), SCHEDULE_SLOTS);
        self.send_text(from, &prompts::schedule_offer(&dates)).await
    }

    async fn human_handoff(&self, from: &str) -> Result<()> {
        self.send_text(from, &prompts::handoff_text(&self.business))
            .await?;

        if let Some(mut lead) = self.store.load(from).await? {
            lead.confirmed = true;
            let lead = self.save(lead).await?;
            self.metrics.inc_lead_confirmed();
            self.export_lead(&lead).await;
        }
        Ok(())
    }

    async fn unknown_option(&self, from: &str, id: &str) -> Result<()> {
        warn!(option = id, "unrecognized interactive reply");
        self.send_text(from, prompts::UNKNOWN_OPTION).await
    }

    async fn current_lead(&self, phone: &str) -> Result<Lead> {
        Ok(self
            .store
            .load(phone)
            .await?
            .unwrap_or_else(|| Lead::new(phone)))
    }

    async fn save(&self, mut lead: Lead) -> Result<Lead> {
        lead.last_updated = Utc::now();
        self.store.upsert(&lead).await?;
        Ok(lead)
    }

    async fn export_lead(&self, lead: &Lead) {
        let payload = build_payload(lead, &self.business);
        let delivered = self.sink.deliver(&payload).await;
        if self.sink.is_configured() && !delivered {
            self.metrics.inc_export_failure();
        }
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        if let Err(err) = self.channel.send_text(to, body).await {
            self.metrics.inc_send_failure();
            return Err(err.into());
        }
        Ok(())
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[ReplyButton]) -> Result<()> {
        if let Err(err) = self.channel.send_buttons(to, body, buttons).await {
            self.metrics.inc_send_failure();
            return Err(err.into());
        }
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<()> {
        if let Err(err) = self.channel.send_list(to, body, button_label, sections).await {
            self.metrics.inc_send_failure();
            return Err(err.into());
        }
        Ok(())
    }

    fn button_reply_text(id: &str) -> Option<&'static str> {
        match id {
            "basica" => Some("básica"),
            "avanzada" => Some("avanzada"),
            "si_embed" => Some("sí"),
            "no_embed" => Some("no"),
            "normal" => Some("normal"),
            "urgente" => Some("urgente"),
            "boleta" => Some("boleta"),
            "factura" => Some("factura"),
            _ => None,
        }
    }

    fn parse_answer(field: FieldId, body: &str) -> Result<AnswerValue, &'static str> {
        let trimmed = body.trim();
        let lower = trimmed.to_lowercase();
        match field {
            FieldId::Comuna => validate_comuna(trimmed)
                .map(AnswerValue::Text)
                .ok_or(prompts::INVALID_COMUNA),
            FieldId::Direccion => Ok(AnswerValue::Text(trimmed.to_string())),
            FieldId::Fecha => parse_date(trimmed, Utc::now().date_naive())
                .map(|parsed| AnswerValue::Text(parsed.display))
                .ok_or(prompts::INVALID_DATE),
            FieldId::Link => {
                if let Some(extracted) = extract_url(trimmed) {
                    Ok(AnswerValue::Text(extracted.url))
                } else if lower.contains("no") || lower.contains("ninguno") {
                    Ok(AnswerValue::Text("No especificado".to_string()))
                } else {
                    Err(prompts::INVALID_LINK)
                }
            }
            FieldId::Espacios => parse_count(trimmed)
                .map(|reply| AnswerValue::Count(reply.effective()))
                .ok_or(prompts::INVALID_COUNT),
            FieldId::Edicion => {
                if lower.contains("básica") || lower.contains("basica") {
                    Ok(AnswerValue::Edition(EditLevel::Basica))
                } else if lower.contains("avanzada") {
                    Ok(AnswerValue::Edition(EditLevel::Avanzada))
                } else {
                    Err(prompts::INVALID_EDITION)
                }
            }
            FieldId::Embed => {
                if lower.contains("sí") || lower.contains("si") || lower.contains("yes") {
                    Ok(AnswerValue::Flag(true))
                } else if lower.contains("no") {
                    Ok(AnswerValue::Flag(false))
                } else {
                    Err(prompts::INVALID_YES_NO)
                }
            }
            FieldId::Urgente => {
                if lower.contains("urgente") || lower.contains("urgent") {
                    Ok(AnswerValue::Flag(true))
                } else if lower.contains("normal") {
                    Ok(AnswerValue::Flag(false))
                } else {
                    Err(prompts::INVALID_DELIVERY)
                }
            }
            FieldId::Presupuesto => {
                if lower.contains("no") || lower.contains("ninguno") {
                    Ok(AnswerValue::Text("No especificado".to_string()))
                } else {
                    Ok(AnswerValue::Text(trimmed.to_string()))
                }
            }
            FieldId::Nombre => Ok(AnswerValue::Text(trimmed.to_string())),
            FieldId::Correo => validate_email(trimmed)
                .map(AnswerValue::Text)
                .ok_or(prompts::INVALID_EMAIL),
            FieldId::Documento => {
                if lower.contains("factura") {
                    Ok(AnswerValue::Document(DocKind::Factura))
                } else {
                    Ok(AnswerValue::Document(DocKind::Boleta))
                }
            }
            FieldId::RazonSocial => Ok(AnswerValue::Text(trimmed.to_string())),
            FieldId::Rut => validate_rut(trimmed)
                .map(AnswerValue::Text)
                .ok_or(prompts::INVALID_RUT),
            FieldId::FechaAgendada => parse_date(trimmed, Utc::now().date_naive())
                .map(|parsed| AnswerValue::Text(parsed.display))
                .ok_or(prompts::INVALID_SCHEDULE_DATE),
        }
    }
}

fn upcoming_business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = start;
    while dates.len() < count {
        day += Duration::days(1);
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_export::RecordingSink;
    use vista_storage::MemoryStore;
    use vista_wa::{OutboundRecord, RecordingChannel};

    const PHONE: &str = "56912345678";

    fn bot() -> (
        IntakeBot<MemoryStore, RecordingChannel>,
        Arc<MemoryStore>,
        Arc<RecordingChannel>,
        RecordingSink,
    ) {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::new());
        let sink = RecordingSink::new();
        let bot = IntakeBot::new(
            Arc::clone(&store),
            Arc::clone(&channel),
            LeadSink::Recording(sink.clone()),
            BusinessInfo::default(),
            BotMetrics::shared(),
        );
        (bot, store, channel, sink)
    }

    async fn send(bot: &IntakeBot<MemoryStore, RecordingChannel>, payload: InboundPayload) {
        bot.handle_message(InboundMessage {
            from: PHONE.to_string(),
            id: "wamid.test".to_string(),
            payload,
        })
        .await
        .unwrap();
    }

    async fn text(bot: &IntakeBot<MemoryStore, RecordingChannel>, body: &str) {
        send(bot, InboundPayload::Text { body: body.to_string() }).await;
    }

    async fn tap(bot: &IntakeBot<MemoryStore, RecordingChannel>, id: &str) {
        send(
            bot,
            InboundPayload::Button {
                id: id.to_string(),
                title: id.to_string(),
            },
        )
        .await;
    }

    fn bodies(records: &[OutboundRecord]) -> Vec<&str> {
        records
            .iter()
            .filter_map(|record| match record {
                OutboundRecord::Text { body, .. } => Some(body.as_str()),
                OutboundRecord::Buttons { body, .. } => Some(body.as_str()),
                OutboundRecord::List { body, .. } => Some(body.as_str()),
                OutboundRecord::Read { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn greeting_shows_the_service_menu() {
        let (bot, store, channel, _) = bot();
        text(&bot, "hola, buenas tardes").await;

        let records = channel.drain();
        let list = records
            .iter()
            .find_map(|record| match record {
                OutboundRecord::List { rows, .. } => Some(rows),
                _ => None,
            })
            .unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list[0].id, "restaurante");

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert_eq!(lead.step, IntakeStep::Welcome);
    }

    #[tokio::test]
    async fn service_selection_starts_the_question_cursor() {
        let (bot, store, channel, _) = bot();
        send(
            &bot,
            InboundPayload::ListReply {
                id: "airbnb_arriendo".to_string(),
                title: "Airbnb / Arriendo".to_string(),
            },
        )
        .await;

        let records = channel.drain();
        let texts = bodies(&records);
        assert!(texts[0].contains("Airbnb / Arriendo"));
        assert!(texts[1].contains("comuna o ciudad"));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert_eq!(lead.step, IntakeStep::CollectingInfo);
        assert_eq!(lead.service, Some(ServiceKind::AirbnbArriendo));
    }

    #[tokio::test]
    async fn full_conversation_reaches_a_scheduled_export() {
        let (bot, store, channel, sink) = bot();

        send(
            &bot,
            InboundPayload::ListReply {
                id: "restaurante".to_string(),
                title: "Restaurante".to_string(),
            },
        )
        .await;
        text(&bot, "Providencia").await;
        text(&bot, "Av. Italia 1234").await;
        text(&bot, "mañana").await;
        text(&bot, "no tengo").await;
        send(
            &bot,
            InboundPayload::ListReply {
                id: "espacios_3".to_string(),
                title: "3 espacios".to_string(),
            },
        )
        .await;
        tap(&bot, "basica").await;
        tap(&bot, "si_embed").await;
        tap(&bot, "normal").await;
        channel.drain();

        text(&bot, "no").await;
        let summary = bodies(&channel.drain()).join("\n");
        assert!(summary.contains("Resumen"));
        assert!(summary.contains("Comuna: Providencia"));
        assert!(summary.contains("Espacios/ambientes: 3"));

        text(&bot, "sí").await;
        let pricing = bodies(&channel.drain()).join("\n");
        // 40000 base + 3x15000 spaces + 20000 embed = 105000, banded 95%..115%.
        assert!(pricing.contains("Total estimado: entre $100.000 y $121.000 CLP"));

        tap(&bot, "agendar").await;
        text(&bot, "Ana Rojas, dueña").await;
        text(&bot, "ana@rojas.cl").await;
        tap(&bot, "boleta").await;
        let offer = bodies(&channel.drain()).join("\n");
        assert!(offer.contains("agendar tu sesión") || offer.contains("ofrecer estas fechas"));

        text(&bot, "mañana").await;
        let closing = bodies(&channel.drain()).join("\n");
        assert!(closing.contains("ha sido agendada"));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert!(lead.confirmed);
        assert_eq!(lead.step, IntakeStep::Scheduling);
        assert_eq!(lead.answers.text(FieldId::FechaAgendada), Some("mañana"));
        assert!(lead.quote.is_some());

        let exports = sink.drain();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].phone, PHONE);
        assert_eq!(exports[0].service, Some("Restaurante"));
        assert!(exports[0].confirmed);
    }

    #[tokio::test]
    async fn back_rewinds_the_latest_answer() {
        let (bot, store, channel, _) = bot();
        tap(&bot, "hotel").await;
        text(&bot, "Vitacura").await;
        channel.drain();

        text(&bot, "atrás").await;
        let texts = bodies(&channel.drain())
            .into_iter()
            .map(|body| body.to_string())
            .collect::<Vec<_>>();
        assert!(texts[0].contains("Volvamos a"));
        assert!(texts[1].contains("comuna o ciudad"));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert!(lead.answers.is_empty());
        assert_eq!(lead.step, IntakeStep::CollectingInfo);
    }

    #[tokio::test]
    async fn reset_wipes_answers_and_reopens_the_menu() {
        let (bot, store, channel, _) = bot();
        tap(&bot, "hotel").await;
        text(&bot, "Vitacura").await;
        channel.drain();

        text(&bot, "reiniciar").await;
        let records = channel.drain();
        assert!(records
            .iter()
            .any(|record| matches!(record, OutboundRecord::List { .. })));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert!(lead.answers.is_empty());
        assert_eq!(lead.step, IntakeStep::Welcome);
        assert_eq!(lead.service, None);
    }

    #[tokio::test]
    async fn human_handoff_confirms_and_exports_known_leads() {
        let (bot, store, channel, sink) = bot();
        tap(&bot, "venue_eventos").await;
        channel.drain();

        text(&bot, "quiero hablar con un humano").await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("representante"));
        assert!(texts.contains("+56 9 5555 0360"));

        assert!(store.load(PHONE).await.unwrap().unwrap().confirmed);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn invalid_answers_reprompt_without_advancing() {
        let (bot, store, channel, _) = bot();
        tap(&bot, "otro").await;
        channel.drain();

        text(&bot, "!!!").await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("comuna o ciudad válida"));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert!(lead.answers.is_empty());
    }

    #[tokio::test]
    async fn factura_branch_collects_company_details() {
        let (bot, store, channel, _) = bot();
        let mut lead = Lead::new(PHONE);
        lead.step = IntakeStep::CollectingContact;
        lead.answers
            .set(FieldId::Nombre, AnswerValue::Text("Ana".into()));
        lead.answers
            .set(FieldId::Correo, AnswerValue::Text("ana@rojas.cl".into()));
        store.upsert(&lead).await.unwrap();

        tap(&bot, "factura").await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("razón social"));

        text(&bot, "Rojas y Cía Ltda").await;
        text(&bot, "12.345.678-5").await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("RUT de la empresa"));
        assert!(texts.contains("agendar tu sesión"));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert_eq!(lead.step, IntakeStep::Scheduling);
        assert_eq!(lead.answers.text(FieldId::Rut), Some("12345678-5"));
    }

    #[tokio::test]
    async fn images_append_media_and_resume_the_cursor() {
        let (bot, store, channel, _) = bot();
        tap(&bot, "restaurante").await;
        channel.drain();

        send(
            &bot,
            InboundPayload::Image {
                media_id: "MEDIA9".to_string(),
                caption: None,
            },
        )
        .await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("Recibí tu imagen"));
        assert!(texts.contains("comuna o ciudad"));

        let lead = store.load(PHONE).await.unwrap().unwrap();
        assert_eq!(lead.media_urls, vec!["https://media.test/MEDIA9".to_string()]);
    }

    #[tokio::test]
    async fn unsupported_payloads_get_a_polite_notice() {
        let (bot, _, channel, _) = bot();
        send(
            &bot,
            InboundPayload::Unsupported {
                kind: "audio".to_string(),
            },
        )
        .await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("\"audio\""));
    }

    #[tokio::test]
    async fn stale_interactive_ids_get_guidance() {
        let (bot, _, channel, _) = bot();
        tap(&bot, "algo_viejo").await;
        let texts = bodies(&channel.drain()).join("\n");
        assert!(texts.contains("No reconozco esa opción"));
    }

    #[test]
    fn business_days_skip_weekends() {
        let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let dates = upcoming_business_days(friday, 3);
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            ]
        );
    }
}
