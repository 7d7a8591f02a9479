use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, warn};
use vista_core::flow::{FieldId, CONTACT_FIELDS, INTAKE_FIELDS};
use vista_core::{format_clp, AnswerSet, BusinessInfo, Lead, Quote};

#[derive(Debug, Clone, Serialize)]
pub struct LeadPayload {
    pub timestamp: DateTime<Utc>,
    pub phone: String,
    pub service: Option<&'static str>,
    pub answers: AnswerSet,
    pub media_urls: Vec<String>,
    pub quote: Option<Quote>,
    pub confirmed: bool,
    pub business: BusinessInfo,
}

pub fn build_payload(lead: &Lead, business: &BusinessInfo) -> LeadPayload {
    LeadPayload {
        timestamp: Utc::now(),
        phone: lead.phone.clone(),
        service: lead.service.map(|kind| kind.label()),
        answers: lead.answers.clone(),
        media_urls: lead.media_urls.clone(),
        quote: lead.quote.clone(),
        confirmed: lead.confirmed,
        business: business.clone(),
    }
}

#[derive(Clone)]
pub struct HttpLeadExporter {
    http: Client,
    url: String,
}

impl HttpLeadExporter {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .context("failed to build lead exporter HTTP client")?,
            url: url.into(),
        })
    }

    // Export is best effort: the conversation never waits on a failed sink.
    pub async fn deliver(&self, payload: &LeadPayload) -> bool {
        let response = self.http.post(&self.url).json(payload).send().await;
        match response {
            Ok(response) if response.status().is_success() => {
                debug!(phone = %payload.phone, "lead exported");
                true
            }
            Ok(response) => {
                warn!(
                    phone = %payload.phone,
                    status = response.status().as_u16(),
                    "lead sink rejected the payload"
                );
                false
            }
            Err(err) => {
                error!(phone = %payload.phone, error = %err, "lead export failed");
                false
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    payloads: Arc<Mutex<Vec<LeadPayload>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<LeadPayload> {
        self.payloads.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }
}

#[derive(Clone)]
pub enum LeadSink {
    Http(HttpLeadExporter),
    Recording(RecordingSink),
    Disabled,
}

impl LeadSink {
    pub async fn deliver(&self, payload: &LeadPayload) -> bool {
        match self {
            LeadSink::Http(exporter) => exporter.deliver(payload).await,
            LeadSink::Recording(sink) => {
                sink.payloads.lock().push(payload.clone());
                true
            }
            LeadSink::Disabled => {
                debug!(phone = %payload.phone, "lead sink not configured, skipping export");
                false
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, LeadSink::Disabled)
    }
}

fn export_fields() -> impl Iterator<Item = FieldId> {
    INTAKE_FIELDS
        .into_iter()
        .chain(CONTACT_FIELDS)
        .chain([FieldId::FechaAgendada])
}

pub fn leads_to_csv(leads: &[Lead]) -> String {
    let mut header: Vec<String> = vec![
        "Timestamp".to_string(),
        "Teléfono".to_string(),
        "Servicio".to_string(),
    ];
    header.extend(export_fields().map(|field| field.label().to_string()));
    header.push("Confirmado".to_string());
    header.push("Media URLs".to_string());

    let mut out = String::new();
    out.push_str(&header.join(","));
    out.push('\n');

    for lead in leads {
        let mut row: Vec<String> = vec![
            lead.last_updated.to_rfc3339(),
            lead.phone.clone(),
            lead.service.map(|kind| kind.label()).unwrap_or("").to_string(),
        ];
        for field in export_fields() {
            let cell = lead
                .answers
                .get(field)
                .map(|value| value.to_string())
                .unwrap_or_default();
            row.push(cell);
        }
        row.push(if lead.confirmed { "Sí" } else { "No" }.to_string());
        row.push(lead.media_urls.join(" | "));

        let escaped: Vec<String> = row.iter().map(|cell| csv_escape(cell)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }

    out
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadStats {
    pub total: usize,
    pub confirmed: usize,
    pub pending: usize,
    pub by_service: BTreeMap<String, usize>,
    pub by_date: BTreeMap<String, usize>,
}

pub fn lead_stats(leads: &[Lead]) -> LeadStats {
    let confirmed = leads.iter().filter(|lead| lead.confirmed).count();
    let mut by_service: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_date: BTreeMap<String, usize> = BTreeMap::new();
    for lead in leads {
        let service = lead
            .service
            .map(|kind| kind.label().to_string())
            .unwrap_or_else(|| "Sin clasificar".to_string());
        *by_service.entry(service).or_default() += 1;
        let day = lead.last_updated.format("%Y-%m-%d").to_string();
        *by_date.entry(day).or_default() += 1;
    }

    LeadStats {
        total: leads.len(),
        confirmed,
        pending: leads.len() - confirmed,
        by_service,
        by_date,
    }
}

pub fn format_lead_summary(lead: &Lead) -> String {
    let mut lines = vec![
        format!("📋 Lead {}", lead.phone),
        format!(
            "Servicio: {}",
            lead.service.map(|kind| kind.label()).unwrap_or("Sin clasificar")
        ),
    ];
    for (field, value) in lead.answers.iter() {
        lines.push(format!("• {}: {}", field.label(), value));
    }
    if !lead.media_urls.is_empty() {
        lines.push(format!("📸 Media: {} archivo(s)", lead.media_urls.len()));
    }
    if let Some(quote) = &lead.quote {
        lines.push(format!(
            "💰 Estimación: entre {} y {} CLP",
            format_clp(quote.min),
            format_clp(quote.max)
        ));
    }
    lines.push(format!(
        "Confirmado: {}",
        if lead.confirmed { "Sí" } else { "No" }
    ));
    lines.join("\n")
}
